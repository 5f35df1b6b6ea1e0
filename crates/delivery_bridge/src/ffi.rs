//! C-side vocabulary shared by every callback-completed call.

use std::ffi::{c_char, c_int, c_void};

/// Completion signature used by the delivery library:
/// `(caller_ret, msg, len, user_data)`.
pub type DeliveryCallback = unsafe extern "C" fn(c_int, *const c_char, usize, *mut c_void);

pub const RET_OK: c_int = 0;
pub const RET_ERR: c_int = 1;
pub const RET_MISSING_CALLBACK: c_int = 2;

/// Copies a callback buffer into an owned string.
///
/// Returns `None` for a null pointer or an empty buffer. Invalid UTF-8 is
/// replaced rather than rejected.
///
/// # Safety
/// `msg` must be null or point to at least `len` readable bytes for the
/// duration of the call.
pub unsafe fn copy_message(msg: *const c_char, len: usize) -> Option<String> {
    if msg.is_null() || len == 0 {
        return None;
    }
    let bytes = unsafe { std::slice::from_raw_parts(msg.cast::<u8>(), len) };
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// Partially applies an external start function so only
/// `(callback, user_data)` remain.
///
/// `bind_call!(f, ctx, a, b)` yields a closure
/// `move |cb, ud| unsafe { f(ctx, Some(cb), ud, a, b) }`.
///
/// The closure is consumed as soon as the start call returns, while the
/// library may still read its arguments until it calls back. Bind raw
/// pointers taken beforehand and keep their owners in the caller's frame
/// until the bridge call returns:
///
/// ```ignore
/// let topic_ptr = topic.as_ptr();
/// call_void("subscribe", timeout, bind_call!(api.subscribe, ctx, topic_ptr));
/// drop(topic);
/// ```
#[macro_export]
macro_rules! bind_call {
    ($func:expr, $ctx:expr $(, $arg:expr)* $(,)?) => {{
        let func = $func;
        let ctx = $ctx;
        move |callback: $crate::ffi::DeliveryCallback,
              user_data: *mut ::std::ffi::c_void|
              -> ::std::ffi::c_int {
            // SAFETY: the caller of `bind_call!` vouches for `ctx` and the
            // bound arguments; `callback`/`user_data` come from the bridge.
            unsafe { func(ctx, ::std::option::Option::Some(callback), user_data $(, $arg)*) }
        }
    }};
}
