//! Owns the single external node handle and its lifecycle.
//!
//! `Uninitialized -> Created -> Started -> Stopped -> Destroyed`
//!
//! Every blocking library call goes through the bridge; the state lock is
//! only held for bookkeeping, never across a wait.

use std::{
    ffi::{CString, c_void},
    ptr::{self, NonNull},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use delivery_bridge::{CallResult, RET_ERR, RET_OK, bind_call, call_value, call_void};
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    api::DeliveryApi,
    events::{EventDispatcher, event_callback},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Uninitialized,
    Created,
    Started,
    Stopped,
    Destroyed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("already initialized")]
    AlreadyInitialized,
    #[error("Context not initialized")]
    NotInitialized,
    #[error("{0} argument contains an interior NUL byte")]
    InteriorNul(&'static str),
    #[error("could not encode send envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

impl<T> From<SessionError> for CallResult<T> {
    fn from(e: SessionError) -> Self {
        CallResult::err(e.to_string())
    }
}

/// Body handed to the library's send entry point.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEnvelope<'a> {
    pub content_topic: &'a str,
    /// Base64 (standard alphabet) of the raw message bytes.
    pub payload: String,
    pub ephemeral: bool,
}

impl<'a> SendEnvelope<'a> {
    pub fn new(content_topic: &'a str, payload: &[u8]) -> Self {
        Self {
            content_topic,
            payload: STANDARD.encode(payload),
            ephemeral: false,
        }
    }
}

/// Opaque handle plus the dispatcher pointer lent to the library.
struct LiveNode {
    handle: NonNull<c_void>,
    events: *const EventDispatcher,
}

// The library handle is an opaque token safe to pass between threads; the
// library serializes access internally. `events` is an owned Arc pointer.
unsafe impl Send for LiveNode {}

struct Inner {
    state: SessionState,
    node: Option<LiveNode>,
}

pub struct Session {
    api: DeliveryApi,
    timeout: Duration,
    dispatcher: Arc<EventDispatcher>,
    /// One `create_node`/`destroy` at a time.
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
}

impl Session {
    pub fn new(api: DeliveryApi, timeout: Duration) -> Self {
        Self {
            api,
            timeout,
            dispatcher: Arc::new(EventDispatcher::new()),
            lifecycle: Mutex::new(()),
            inner: Mutex::new(Inner { state: SessionState::Uninitialized, node: None }),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner).state
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.inner).node.is_some()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates the node from a NodeConfig JSON document.
    ///
    /// Fails with "already initialized" while a handle is live; the live
    /// handle is left untouched.
    pub fn create_node(&self, config_json: &str) -> CallResult<()> {
        let _lifecycle = lock(&self.lifecycle);
        if self.is_initialized() {
            warn!("createNode called while a node is live");
            return SessionError::AlreadyInitialized.into();
        }
        let Ok(config) = CString::new(config_json) else {
            return SessionError::InteriorNul("config").into();
        };

        let api = self.api;
        let mut created: *mut c_void = ptr::null_mut();
        let result = call_void("createNode", self.timeout, |callback, user_data| {
            created = unsafe { (api.create_node)(config.as_ptr(), Some(callback), user_data) };
            if created.is_null() { RET_ERR } else { RET_OK }
        });

        let Some(handle) = NonNull::new(created) else {
            warn!("Failed to create delivery context: {}", result.error());
            return result;
        };
        if result.is_err() {
            // Handed out but never confirmed.
            warn!("Delivery context creation failed: {}", result.error());
            self.release(handle, None);
            return result;
        }

        let events = Arc::into_raw(self.dispatcher.clone());
        unsafe { (api.set_event_callback)(handle.as_ptr(), Some(event_callback), events as *mut c_void) };

        let mut inner = lock(&self.inner);
        inner.node = Some(LiveNode { handle, events });
        inner.state = SessionState::Created;
        info!("Delivery context created successfully");
        CallResult::ok(())
    }

    pub fn start(&self) -> CallResult<()> {
        let handle = match self.live_handle("start") {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        let result = call_void("start", self.timeout, bind_call!(self.api.start_node, handle));
        if result.is_ok() {
            self.transition(SessionState::Started);
        }
        result
    }

    pub fn stop(&self) -> CallResult<()> {
        let handle = match self.live_handle("stop") {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        let result = call_void("stop", self.timeout, bind_call!(self.api.stop_node, handle));
        if result.is_ok() {
            self.transition(SessionState::Stopped);
        }
        result
    }

    /// Hands a message to the library.
    ///
    /// `Ok` carries the request id and only means the message was accepted;
    /// the delivery outcome arrives later as an event with the same id.
    pub fn send(&self, content_topic: &str, payload: &[u8]) -> CallResult<String> {
        let handle = match self.live_handle("send") {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        let message = match serde_json::to_string(&SendEnvelope::new(content_topic, payload)) {
            Ok(json) => json,
            Err(e) => return SessionError::from(e).into(),
        };
        let Ok(message) = CString::new(message) else {
            return SessionError::InteriorNul("message").into();
        };
        debug!(content_topic, "sending message");
        // `message` stays in this frame until the call has completed or timed out.
        let message_ptr = message.as_ptr();
        call_value("send", self.timeout, bind_call!(self.api.send, handle, message_ptr))
    }

    pub fn subscribe(&self, content_topic: &str) -> CallResult<()> {
        self.topic_call("subscribe", content_topic)
    }

    pub fn unsubscribe(&self, content_topic: &str) -> CallResult<()> {
        self.topic_call("unsubscribe", content_topic)
    }

    fn topic_call(&self, operation: &'static str, content_topic: &str) -> CallResult<()> {
        let handle = match self.live_handle(operation) {
            Ok(handle) => handle,
            Err(e) => return e.into(),
        };
        let Ok(topic) = CString::new(content_topic) else {
            return SessionError::InteriorNul("content topic").into();
        };
        let func = if operation == "subscribe" { self.api.subscribe } else { self.api.unsubscribe };
        let topic_ptr = topic.as_ptr();
        call_void(operation, self.timeout, bind_call!(func, handle, topic_ptr))
    }

    /// Tears the live node down. Calling it again, or with no node, does nothing.
    pub fn destroy(&self) {
        let _lifecycle = lock(&self.lifecycle);
        let node = {
            let mut inner = lock(&self.inner);
            let node = inner.node.take();
            if node.is_some() {
                inner.state = SessionState::Destroyed;
            }
            node
        };
        if let Some(node) = node {
            self.release(node.handle, Some(node.events));
            info!("Delivery context destroyed");
        }
    }

    fn release(&self, handle: NonNull<c_void>, events: Option<*const EventDispatcher>) {
        let result = call_void("destroy", self.timeout, bind_call!(self.api.destroy, handle.as_ptr()));
        match (result.is_ok(), events) {
            (true, Some(events)) => {
                // The library no longer holds the pointer once destroy completed.
                unsafe { drop(Arc::from_raw(events)) };
            }
            (false, Some(_)) => {
                // The library may still call back into the dispatcher; keep it alive.
                error!("destroy did not complete ({}); leaking event dispatcher", result.error());
            }
            (false, None) => warn!("destroy did not complete: {}", result.error()),
            (true, None) => {}
        }
    }

    /// Any live handle will do; the library judges whether the call fits
    /// the node's current state.
    fn live_handle(&self, operation: &str) -> Result<*mut c_void, SessionError> {
        match &lock(&self.inner).node {
            Some(node) => Ok(node.handle.as_ptr()),
            None => {
                warn!("Cannot {} - context not initialized. Call createNode first.", operation);
                Err(SessionError::NotInitialized)
            }
        }
    }

    fn transition(&self, to: SessionState) {
        let mut inner = lock(&self.inner);
        if inner.node.is_some() {
            debug!(from = %inner.state, %to, "session transition");
            inner.state = to;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
