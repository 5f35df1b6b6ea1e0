//! Blocking bridge over callback-completed C calls.
//!
//! * [`call_result`] – the success/error vocabulary every call returns
//! * [`registry`] – in-flight calls keyed by token, single winner per token
//! * [`bridge`] – `call_void` / `call_value`, the bounded-wait protocol
//! * [`ffi`] – callback signature, return codes and [`bind_call!`]

pub mod bridge;
pub mod call_result;
pub mod ffi;
pub mod registry;

pub use bridge::{BridgeError, call_value, call_void, completion_callback};
pub use call_result::{CallResult, Payload};
pub use ffi::{DeliveryCallback, RET_ERR, RET_MISSING_CALLBACK, RET_OK};
pub use registry::{CallOutcome, CallToken, PendingCall, Registry};
