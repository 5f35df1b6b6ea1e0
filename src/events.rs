//! Pushed notifications from the delivery library.
//!
//! The library calls [`event_callback`] on its own worker thread with a
//! JSON envelope such as
//! `{"eventType":"message_sent","requestId":"r1","messageHash":"h1"}`.
//! The envelope is classified into a [`DomainEvent`] and handed to the one
//! registered [`EventListener`] as `(event name, ordered fields)`.
//!
//! The library is assumed to serialize its own callback thread. If it
//! ever fans out over several workers, listeners see concurrent calls and
//! must be thread-safe themselves (the `Send + Sync` bound already asks
//! for that).

use std::{
    ffi::{c_char, c_int, c_void},
    panic::{self, AssertUnwindSafe},
    str::FromStr,
    sync::{Arc, RwLock},
};

use chrono::{Local, SecondsFormat};
use delivery_bridge::{RET_OK, ffi::copy_message};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::{debug, error, warn};

/// `eventType` discriminator values emitted by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RawEventType {
    MessageSent,
    MessageError,
    MessagePropagated,
    ConnectionStatusChange,
}

/// Classified notification. `Display` gives the host-facing event name.
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr, Display)]
pub enum DomainEvent {
    #[strum(serialize = "messageSent")]
    DeliveryConfirmed {
        request_id: String,
        message_hash: String,
        timestamp: String,
    },
    #[strum(serialize = "messageError")]
    DeliveryFailed {
        request_id: String,
        message_hash: String,
        error: String,
        timestamp: String,
    },
    #[strum(serialize = "messagePropagated")]
    DeliveryPropagated {
        request_id: String,
        message_hash: String,
        timestamp: String,
    },
    #[strum(serialize = "connectionStateChanged")]
    ConnectivityChanged {
        connection_status: String,
        timestamp: String,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &str {
        self.as_ref()
    }

    /// Payload in host order; the capture timestamp is always last.
    pub fn fields(&self) -> Vec<String> {
        match self {
            DomainEvent::DeliveryConfirmed { request_id, message_hash, timestamp }
            | DomainEvent::DeliveryPropagated { request_id, message_hash, timestamp } => {
                vec![request_id.clone(), message_hash.clone(), timestamp.clone()]
            }
            DomainEvent::DeliveryFailed { request_id, message_hash, error, timestamp } => {
                vec![request_id.clone(), message_hash.clone(), error.clone(), timestamp.clone()]
            }
            DomainEvent::ConnectivityChanged { connection_status, timestamp } => {
                vec![connection_status.clone(), timestamp.clone()]
            }
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            DomainEvent::DeliveryConfirmed { timestamp, .. }
            | DomainEvent::DeliveryFailed { timestamp, .. }
            | DomainEvent::DeliveryPropagated { timestamp, .. }
            | DomainEvent::ConnectivityChanged { timestamp, .. } => timestamp,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("notification is not valid JSON: {0}")]
    Parse(String),
    #[error("notification is not a JSON object")]
    NotObject,
    #[error("notification has no string 'eventType'")]
    MissingEventType,
    #[error("unknown eventType '{0}'")]
    UnknownEventType(String),
}

/// Local capture time, ISO-8601 with offset.
pub fn capture_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Maps one raw envelope onto the closed set of domain events.
pub fn classify(raw: &str, timestamp: String) -> Result<DomainEvent, ClassifyError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ClassifyError::Parse(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(ClassifyError::NotObject);
    };
    let event_type = map
        .get("eventType")
        .and_then(Value::as_str)
        .ok_or(ClassifyError::MissingEventType)?;
    let kind = RawEventType::from_str(event_type)
        .map_err(|_| ClassifyError::UnknownEventType(event_type.to_string()))?;

    let event = match kind {
        RawEventType::MessageSent => DomainEvent::DeliveryConfirmed {
            request_id: text_field(&map, "requestId"),
            message_hash: text_field(&map, "messageHash"),
            timestamp,
        },
        RawEventType::MessageError => DomainEvent::DeliveryFailed {
            request_id: text_field(&map, "requestId"),
            message_hash: text_field(&map, "messageHash"),
            error: text_field(&map, "error"),
            timestamp,
        },
        RawEventType::MessagePropagated => DomainEvent::DeliveryPropagated {
            request_id: text_field(&map, "requestId"),
            message_hash: text_field(&map, "messageHash"),
            timestamp,
        },
        RawEventType::ConnectionStatusChange => DomainEvent::ConnectivityChanged {
            connection_status: text_field(&map, "connectionStatus"),
            timestamp,
        },
    };
    Ok(event)
}

// Missing keys read as empty; non-string values keep their JSON text.
fn text_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Receives every classified event.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event_name: &str, fields: &[String]);
}

impl<F> EventListener for F
where
    F: Fn(&str, &[String]) + Send + Sync,
{
    fn on_event(&self, event_name: &str, fields: &[String]) {
        self(event_name, fields)
    }
}

/// Forwards classified events to a single listener.
#[derive(Default)]
pub struct EventDispatcher {
    listener: RwLock<Option<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `listener`, replacing any previous one.
    pub fn set_listener(&self, listener: Arc<dyn EventListener>) {
        *self.listener.write().unwrap_or_else(|p| p.into_inner()) = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.listener.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.read().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Classifies `raw` and forwards it. Returns whether a listener received it.
    pub fn dispatch_raw(&self, raw: &str) -> bool {
        match classify(raw, capture_timestamp()) {
            Ok(event) => self.dispatch(&event),
            Err(ClassifyError::UnknownEventType(kind)) => {
                warn!("Dropping notification with unknown eventType '{}'", kind);
                false
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed notification");
                false
            }
        }
    }

    pub fn dispatch(&self, event: &DomainEvent) -> bool {
        let listener = self.listener.read().unwrap_or_else(|p| p.into_inner()).clone();
        let Some(listener) = listener else {
            warn!("No event listener registered, dropping {}", event.name());
            return false;
        };
        debug!(event = event.name(), "forwarding delivery event");
        listener.on_event(event.name(), &event.fields());
        true
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("has_listener", &self.has_listener())
            .finish()
    }
}

/// Notification callback registered with the library.
///
/// `user_data` is a pointer obtained from `Arc::<EventDispatcher>::into_raw`
/// that stays alive until the node handle is destroyed.
///
/// # Safety
/// `msg` must be null or valid for `len` bytes; `user_data` must be null or
/// point to a live `EventDispatcher`.
pub unsafe extern "C" fn event_callback(
    caller_ret: c_int,
    msg: *const c_char,
    len: usize,
    user_data: *mut c_void,
) {
    if user_data.is_null() {
        warn!("event_callback: missing dispatcher");
        return;
    }
    let dispatcher = unsafe { &*user_data.cast::<EventDispatcher>() };
    if caller_ret != RET_OK {
        warn!(caller_ret, "event_callback reported a non-ok code");
    }
    let Some(raw) = (unsafe { copy_message(msg, len) }) else {
        debug!("event_callback: empty notification");
        return;
    };

    // A panicking listener must not unwind into the C library.
    if panic::catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch_raw(&raw))).is_err() {
        error!("event listener panicked while handling a notification");
    }
}
