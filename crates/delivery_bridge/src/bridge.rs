//! Turns "start now, complete later via callback" C calls into blocking
//! calls with a bounded wait.
//!
//! ```ignore
//! let invoke = bind_call!(api.start_node, handle);
//! let started = call_void("start", Duration::from_secs(30), invoke);
//! ```

use std::{
    ffi::{c_char, c_int, c_void},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, debug_span, warn};

use crate::{
    call_result::CallResult,
    ffi::{DeliveryCallback, RET_OK, copy_message},
    registry::{CallOutcome, CallToken, PendingCall, Registry},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("{0} failed to initiate")]
    Initiate(String),
    #[error("{0} callback timeout")]
    Timeout(String),
    /// Remote side reported a failure but left the message empty.
    #[error("{0} failed")]
    Failed(String),
    /// Remote side reported a failure, message surfaced verbatim.
    #[error("{message}")]
    Remote { operation: String, message: String },
    #[error("{0} returned an unreadable payload")]
    Payload(String),
}

/// Completion callback handed to the external library.
///
/// `user_data` carries the [`CallToken`]. Unknown tokens (late arrival after
/// a timeout, or a duplicate delivery) are ignored.
///
/// # Safety
/// `msg` must be null or valid for `len` bytes during the call.
pub unsafe extern "C" fn completion_callback(
    caller_ret: c_int,
    msg: *const c_char,
    len: usize,
    user_data: *mut c_void,
) {
    let token = CallToken::from_user_data(user_data);
    let message = unsafe { copy_message(msg, len) };
    let outcome = CallOutcome { return_code: caller_ret, message };
    if !Registry::global().complete(token, outcome) {
        debug!(%token, caller_ret, "completion for unknown call ignored");
    }
}

/// Runs an operation that completes without a payload.
pub fn call_void<F>(operation: &str, timeout: Duration, invoke: F) -> CallResult<()>
where
    F: FnOnce(DeliveryCallback, *mut c_void) -> c_int,
{
    match run(operation, timeout, invoke) {
        Ok(_) => CallResult::ok(()),
        Err(e) => CallResult::err(e.to_string()),
    }
}

/// Runs an operation whose completion message is the result.
///
/// An absent message on success yields `T::default()`.
pub fn call_value<T, F>(operation: &str, timeout: Duration, invoke: F) -> CallResult<T>
where
    T: FromStr + Default,
    F: FnOnce(DeliveryCallback, *mut c_void) -> c_int,
{
    let message = match run(operation, timeout, invoke) {
        Ok(message) => message,
        Err(e) => return CallResult::err(e.to_string()),
    };
    match message {
        None => CallResult::ok(T::default()),
        Some(text) => match text.parse::<T>() {
            Ok(value) => CallResult::ok(value),
            Err(_) => {
                warn!(operation, "completion payload did not parse");
                CallResult::err(BridgeError::Payload(operation.to_string()).to_string())
            }
        },
    }
}

fn run<F>(operation: &str, timeout: Duration, invoke: F) -> Result<Option<String>, BridgeError>
where
    F: FnOnce(DeliveryCallback, *mut c_void) -> c_int,
{
    let registry = Registry::global();
    let call = PendingCall::new(CallToken::next());
    let token = call.token();
    let _span = debug_span!("bridge_call", operation, %token).entered();

    registry.register(call.clone());

    let started = invoke(completion_callback, token.as_user_data());
    if started != RET_OK {
        // A rejected start never calls back, so the entry goes now.
        registry.cancel(token);
        warn!(started, "{} rejected at start", operation);
        return Err(BridgeError::Initiate(operation.to_string()));
    }

    let outcome = match call.wait(timeout) {
        Some(outcome) => outcome,
        None if registry.cancel(token) => {
            warn!(?timeout, "{} timed out waiting for callback", operation);
            return Err(BridgeError::Timeout(operation.to_string()));
        }
        // The callback removed the entry first; its outcome is already in place.
        None => call.take().ok_or_else(|| BridgeError::Timeout(operation.to_string()))?,
    };

    if outcome.return_code != RET_OK {
        debug!(code = outcome.return_code, "{} reported failure", operation);
        return Err(match outcome.message {
            Some(message) => BridgeError::Remote { operation: operation.to_string(), message },
            None => BridgeError::Failed(operation.to_string()),
        });
    }

    debug!("{} completed", operation);
    Ok(outcome.message)
}
