//! In-memory implementations of the collaborator traits.
//!
//! [`MemoryHttpExchange`] and [`MemoryWebSocketChannel`] stand in for a host
//! runtime in tests: they record everything written to the response side and
//! expose `emit_*` methods to play the client side. Both honor the
//! single-fire, replay-to-late-registrants close contract of the bridge
//! traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use crate::bridge::{
    CloseCallback, ErrorCallback, HttpExchange, TextCallback, WebSocketChannel,
};
use crate::error::TransportError;

/// An in-memory WebSocket connection.
pub struct MemoryWebSocketChannel {
    uri: String,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
    text_callbacks: Mutex<Vec<TextCallback>>,
    error_callbacks: Mutex<Vec<ErrorCallback>>,
    close_callbacks: Mutex<Vec<CloseCallback>>,
}

impl MemoryWebSocketChannel {
    /// Create a channel for the given connect URI.
    pub fn new(uri: &str) -> Arc<Self> {
        Arc::new(Self {
            uri: uri.to_string(),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            text_callbacks: Mutex::new(Vec::new()),
            error_callbacks: Mutex::new(Vec::new()),
            close_callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Deliver a text frame from the client side.
    pub fn emit_text(&self, data: &str) {
        for callback in self.text_callbacks.lock().expect("lock poisoned").iter() {
            callback(data.to_string());
        }
    }

    /// Report an error from the client side.
    pub fn emit_error(&self, error: TransportError) {
        for callback in self.error_callbacks.lock().expect("lock poisoned").iter() {
            callback(error.clone());
        }
    }

    /// All frames sent to the client, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// The most recent frame sent to the client.
    #[must_use]
    pub fn last_sent(&self) -> Option<String> {
        self.sent.lock().expect("lock poisoned").last().cloned()
    }

    /// Whether the connection has been closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl WebSocketChannel for MemoryWebSocketChannel {
    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn send(&self, data: &str) {
        self.sent.lock().expect("lock poisoned").push(data.to_string());
    }

    fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            for callback in self.close_callbacks.lock().expect("lock poisoned").iter() {
                callback();
            }
        }
    }

    fn on_text(&self, callback: TextCallback) {
        self.text_callbacks
            .lock()
            .expect("lock poisoned")
            .push(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.error_callbacks
            .lock()
            .expect("lock poisoned")
            .push(callback);
    }

    fn on_close(&self, callback: CloseCallback) {
        if self.closed.load(Ordering::SeqCst) {
            callback();
            return;
        }
        self.close_callbacks
            .lock()
            .expect("lock poisoned")
            .push(callback);
    }
}

/// An in-memory HTTP request/response exchange.
pub struct MemoryHttpExchange {
    uri: String,
    method: String,
    request_headers: Mutex<HashMap<String, String>>,
    pending_body: Mutex<Option<String>>,
    status: AtomicU16,
    response_headers: Mutex<HashMap<String, String>>,
    body_out: Mutex<String>,
    ended: AtomicBool,
    close_fired: AtomicBool,
    body_callbacks: Mutex<Vec<TextCallback>>,
    error_callbacks: Mutex<Vec<ErrorCallback>>,
    close_callbacks: Mutex<Vec<CloseCallback>>,
}

impl MemoryHttpExchange {
    fn new(method: &str, uri: &str, body: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            uri: uri.to_string(),
            method: method.to_string(),
            request_headers: Mutex::new(HashMap::new()),
            pending_body: Mutex::new(body),
            status: AtomicU16::new(200),
            response_headers: Mutex::new(HashMap::new()),
            body_out: Mutex::new(String::new()),
            ended: AtomicBool::new(false),
            close_fired: AtomicBool::new(false),
            body_callbacks: Mutex::new(Vec::new()),
            error_callbacks: Mutex::new(Vec::new()),
            close_callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Create a GET exchange.
    pub fn get(uri: &str) -> Arc<Self> {
        Self::new("GET", uri, None)
    }

    /// Create a POST exchange carrying a urlencoded body.
    pub fn post(uri: &str, body: &str) -> Arc<Self> {
        Self::new("POST", uri, Some(body.to_string()))
    }

    /// Create an exchange with an arbitrary method.
    pub fn with_method(method: &str, uri: &str) -> Arc<Self> {
        Self::new(method, uri, None)
    }

    /// Set a request header (lowercase name), before handing the exchange to
    /// the engine.
    pub fn set_request_header(&self, name: &str, value: &str) {
        self.request_headers
            .lock()
            .expect("lock poisoned")
            .insert(name.to_string(), value.to_string());
    }

    /// Report an error from the connection.
    pub fn emit_error(&self, error: TransportError) {
        for callback in self.error_callbacks.lock().expect("lock poisoned").iter() {
            callback(error.clone());
        }
    }

    /// Simulate the client connection dropping before the response ended.
    pub fn drop_connection(&self) {
        self.fire_close();
    }

    fn fire_close(&self) {
        if self
            .close_fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            for callback in self.close_callbacks.lock().expect("lock poisoned").iter() {
                callback();
            }
        }
    }

    /// Everything written to the response body so far.
    #[must_use]
    pub fn response_body(&self) -> String {
        self.body_out.lock().expect("lock poisoned").clone()
    }

    /// The response status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.load(Ordering::SeqCst)
    }

    /// Look up a response header by lowercase name.
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<String> {
        self.response_headers
            .lock()
            .expect("lock poisoned")
            .get(name)
            .cloned()
    }

    /// Whether the response has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl HttpExchange for MemoryHttpExchange {
    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn method(&self) -> String {
        self.method.clone()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.request_headers
            .lock()
            .expect("lock poisoned")
            .get(name)
            .cloned()
    }

    fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    fn set_header(&self, name: &str, value: &str) {
        self.response_headers
            .lock()
            .expect("lock poisoned")
            .insert(name.to_string(), value.to_string());
    }

    fn write(&self, chunk: &str) {
        self.body_out.lock().expect("lock poisoned").push_str(chunk);
    }

    fn end(&self) {
        if self
            .ended
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.fire_close();
        }
    }

    fn read(&self) {
        let body = self.pending_body.lock().expect("lock poisoned").take();
        if let Some(body) = body {
            for callback in self.body_callbacks.lock().expect("lock poisoned").iter() {
                callback(body.clone());
            }
        }
    }

    fn on_body(&self, callback: TextCallback) {
        self.body_callbacks
            .lock()
            .expect("lock poisoned")
            .push(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.error_callbacks
            .lock()
            .expect("lock poisoned")
            .push(callback);
    }

    fn on_close(&self, callback: CloseCallback) {
        if self.close_fired.load(Ordering::SeqCst) {
            callback();
            return;
        }
        self.close_callbacks
            .lock()
            .expect("lock poisoned")
            .push(callback);
    }
}
