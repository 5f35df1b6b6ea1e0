//! In-process stand-in for liblogosdelivery.
//!
//! Behaviour is driven by the node config JSON:
//!
//! ```json
//! { "nodeId": "t1", "rejectCreate": false, "failStart": "port in use",
//!   "silentStop": true, "requestId": "req-1", "emitEvents": true }
//! ```
//!
//! Completions are fired from worker threads, like the real library does.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    ffi::{CStr, c_char, c_int, c_void},
    ptr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use delivery_bridge::{DeliveryCallback, RET_ERR, RET_MISSING_CALLBACK, RET_OK};
use delivery_module::api::DeliveryApi;
use once_cell::sync::Lazy;
use serde::Deserialize;

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Behavior {
    pub node_id: String,
    pub reject_create: bool,
    pub fail_start: Option<String>,
    pub silent_stop: bool,
    pub request_id: Option<String>,
    pub emit_events: bool,
}

/// What the fake saw for one `nodeId`.
#[derive(Debug, Default)]
pub struct FakeRecord {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    pub subscriptions: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeRecord {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn note(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

static RECORDS: Lazy<Mutex<HashMap<String, Arc<FakeRecord>>>> = Lazy::new(Default::default);

pub fn record(node_id: &str) -> Arc<FakeRecord> {
    RECORDS
        .lock()
        .unwrap()
        .entry(node_id.to_string())
        .or_default()
        .clone()
}

struct FakeNode {
    behavior: Behavior,
    record: Arc<FakeRecord>,
    /// (callback, user_data as usize)
    events: Mutex<Option<(DeliveryCallback, usize)>>,
}

pub fn fake_api() -> DeliveryApi {
    DeliveryApi {
        create_node: fake_create_node,
        destroy: fake_destroy,
        start_node: fake_start_node,
        stop_node: fake_stop_node,
        send: fake_send,
        subscribe: fake_subscribe,
        unsubscribe: fake_unsubscribe,
        set_event_callback: fake_set_event_callback,
    }
}

/// Fires `callback` from a worker thread.
fn fire(callback: DeliveryCallback, user_data: *mut c_void, code: c_int, msg: Option<String>) {
    let user_data = user_data as usize;
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(5));
        invoke(callback, user_data, code, msg.as_deref());
    });
}

fn invoke(callback: DeliveryCallback, user_data: usize, code: c_int, msg: Option<&str>) {
    let (ptr, len): (*const c_char, usize) = match msg {
        Some(m) => (m.as_ptr().cast(), m.len()),
        None => (ptr::null(), 0),
    };
    unsafe { callback(code, ptr, len, user_data as *mut c_void) };
}

unsafe fn node<'a>(ctx: *mut c_void) -> &'a FakeNode {
    unsafe { &*ctx.cast::<FakeNode>() }
}

unsafe fn text(arg: *const c_char) -> String {
    unsafe { CStr::from_ptr(arg) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn fake_create_node(
    config_json: *const c_char,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
) -> *mut c_void {
    let Some(callback) = callback else {
        return ptr::null_mut();
    };
    let behavior: Behavior = serde_json::from_str(&unsafe { text(config_json) }).unwrap_or_default();
    if behavior.reject_create {
        return ptr::null_mut();
    }
    let record = record(&behavior.node_id);
    record.created.fetch_add(1, Ordering::SeqCst);
    record.note("createNode");
    let node = Box::new(FakeNode { behavior, record, events: Mutex::new(None) });
    fire(callback, user_data, RET_OK, None);
    Box::into_raw(node).cast()
}

unsafe extern "C" fn fake_destroy(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
) -> c_int {
    let Some(callback) = callback else {
        return RET_MISSING_CALLBACK;
    };
    let node = unsafe { Box::from_raw(ctx.cast::<FakeNode>()) };
    node.record.destroyed.fetch_add(1, Ordering::SeqCst);
    node.record.note("destroy");
    fire(callback, user_data, RET_OK, None);
    RET_OK
}

unsafe extern "C" fn fake_start_node(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
) -> c_int {
    let Some(callback) = callback else {
        return RET_MISSING_CALLBACK;
    };
    let node = unsafe { node(ctx) };
    node.record.note("start");
    match &node.behavior.fail_start {
        Some(reason) => fire(callback, user_data, RET_ERR, Some(reason.clone())),
        None => fire(callback, user_data, RET_OK, None),
    }
    RET_OK
}

unsafe extern "C" fn fake_stop_node(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
) -> c_int {
    let Some(callback) = callback else {
        return RET_MISSING_CALLBACK;
    };
    let node = unsafe { node(ctx) };
    node.record.note("stop");
    if !node.behavior.silent_stop {
        fire(callback, user_data, RET_OK, None);
    }
    RET_OK
}

unsafe extern "C" fn fake_send(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
    message_json: *const c_char,
) -> c_int {
    let Some(callback) = callback else {
        return RET_MISSING_CALLBACK;
    };
    let node = unsafe { node(ctx) };
    node.record.note("send");

    // Like the real library, the envelope is read on the worker thread.
    let record = node.record.clone();
    let message = message_json as usize;
    let request_id = node.behavior.request_id.clone();
    let events = if node.behavior.emit_events { *node.events.lock().unwrap() } else { None };
    let user_data = user_data as usize;
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(5));
        record.sent.lock().unwrap().push(unsafe { text(message as *const c_char) });
        invoke(callback, user_data, RET_OK, request_id.as_deref());
        if let Some((on_event, events_data)) = events {
            let id = request_id.unwrap_or_default();
            invoke(on_event, events_data, RET_OK, Some("not json at all"));
            invoke(on_event, events_data, RET_OK, Some(r#"{"eventType":"peer_joined"}"#));
            let sent = format!(r#"{{"eventType":"message_sent","requestId":"{id}","messageHash":"0xabc"}}"#);
            invoke(on_event, events_data, RET_OK, Some(&sent));
        }
    });
    RET_OK
}

unsafe extern "C" fn fake_subscribe(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
    content_topic: *const c_char,
) -> c_int {
    let Some(callback) = callback else {
        return RET_MISSING_CALLBACK;
    };
    let node = unsafe { node(ctx) };
    node.record.note("subscribe");
    let record = node.record.clone();
    let topic = content_topic as usize;
    let user_data = user_data as usize;
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(5));
        let topic = unsafe { text(topic as *const c_char) };
        record.subscriptions.lock().unwrap().push(topic);
        invoke(callback, user_data, RET_OK, None);
    });
    RET_OK
}

unsafe extern "C" fn fake_unsubscribe(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
    content_topic: *const c_char,
) -> c_int {
    let Some(callback) = callback else {
        return RET_MISSING_CALLBACK;
    };
    let node = unsafe { node(ctx) };
    node.record.note("unsubscribe");
    let topic = unsafe { text(content_topic) };
    node.record.subscriptions.lock().unwrap().retain(|t| *t != topic);
    fire(callback, user_data, RET_OK, None);
    RET_OK
}

unsafe extern "C" fn fake_set_event_callback(
    ctx: *mut c_void,
    callback: Option<DeliveryCallback>,
    user_data: *mut c_void,
) {
    let node = unsafe { node(ctx) };
    *node.events.lock().unwrap() = callback.map(|cb| (cb, user_data as usize));
}

pub fn config(node_id: &str, extra: serde_json::Value) -> String {
    let mut doc = serde_json::json!({ "nodeId": node_id });
    if let (Some(doc), Some(extra)) = (doc.as_object_mut(), extra.as_object()) {
        doc.extend(extra.clone());
    }
    doc.to_string()
}
