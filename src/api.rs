//! Function table for the external delivery library.
//!
//! Every entry follows the same shape: it returns a status code right
//! away and reports completion later through a [`DeliveryCallback`].
//! `create_node` is the exception on the return side: it hands back the
//! opaque node handle (null on rejection).

use std::ffi::{c_char, c_int, c_void};

use delivery_bridge::DeliveryCallback;

pub type CreateNodeFn =
    unsafe extern "C" fn(*const c_char, Option<DeliveryCallback>, *mut c_void) -> *mut c_void;
pub type NodeFn = unsafe extern "C" fn(*mut c_void, Option<DeliveryCallback>, *mut c_void) -> c_int;
pub type NodeArgFn =
    unsafe extern "C" fn(*mut c_void, Option<DeliveryCallback>, *mut c_void, *const c_char) -> c_int;
pub type SetEventCallbackFn = unsafe extern "C" fn(*mut c_void, Option<DeliveryCallback>, *mut c_void);

/// Entry points into liblogosdelivery.
#[derive(Clone, Copy)]
pub struct DeliveryApi {
    pub create_node: CreateNodeFn,
    pub destroy: NodeFn,
    pub start_node: NodeFn,
    pub stop_node: NodeFn,
    /// Takes the JSON send envelope as its argument.
    pub send: NodeArgFn,
    /// Takes the content topic as its argument.
    pub subscribe: NodeArgFn,
    pub unsubscribe: NodeArgFn,
    pub set_event_callback: SetEventCallbackFn,
}

impl std::fmt::Debug for DeliveryApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeliveryApi")
    }
}

#[cfg(feature = "liblogosdelivery")]
mod linked {
    use super::*;

    #[link(name = "logosdelivery")]
    unsafe extern "C" {
        pub fn logosdelivery_create_node(
            config_json: *const c_char,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
        ) -> *mut c_void;
        pub fn logosdelivery_destroy(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
        ) -> c_int;
        pub fn logosdelivery_start_node(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
        ) -> c_int;
        pub fn logosdelivery_stop_node(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
        ) -> c_int;
        pub fn logosdelivery_send(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
            message_json: *const c_char,
        ) -> c_int;
        pub fn logosdelivery_subscribe(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
            content_topic: *const c_char,
        ) -> c_int;
        pub fn logosdelivery_unsubscribe(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
            content_topic: *const c_char,
        ) -> c_int;
        pub fn logosdelivery_set_event_callback(
            ctx: *mut c_void,
            callback: Option<DeliveryCallback>,
            user_data: *mut c_void,
        );
    }
}

#[cfg(feature = "liblogosdelivery")]
impl DeliveryApi {
    /// The table backed by the linked shared library.
    pub fn linked() -> Self {
        Self {
            create_node: linked::logosdelivery_create_node,
            destroy: linked::logosdelivery_destroy,
            start_node: linked::logosdelivery_start_node,
            stop_node: linked::logosdelivery_stop_node,
            send: linked::logosdelivery_send,
            subscribe: linked::logosdelivery_subscribe,
            unsubscribe: linked::logosdelivery_unsubscribe,
            set_event_callback: linked::logosdelivery_set_event_callback,
        }
    }
}
