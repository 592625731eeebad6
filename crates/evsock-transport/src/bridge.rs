//! Collaborator traits implemented by host-runtime bridges.
//!
//! The engine consumes two contracts and nothing else about the host:
//!
//! - [`HttpExchange`]: one HTTP request/response pair with async body read,
//!   header/status setters, chunked write, and a single-fire close
//!   notification.
//! - [`WebSocketChannel`]: one accepted WebSocket connection with text,
//!   error and close callbacks.
//!
//! A bridge for a concrete runtime (axum, hyper, anything that can expose
//! these operations) implements the traits and hands `Arc`-wrapped objects
//! to the engine. The in-memory implementations in [`crate::memory`] drive
//! the whole engine in tests.

use crate::error::TransportError;

/// Callback receiving a text payload.
pub type TextCallback = Box<dyn Fn(String) + Send + Sync>;
/// Callback receiving a transport error.
pub type ErrorCallback = Box<dyn Fn(TransportError) + Send + Sync>;
/// Callback receiving a close notification.
pub type CloseCallback = Box<dyn Fn() + Send + Sync>;

/// One HTTP request/response exchange, as seen by the engine.
pub trait HttpExchange: Send + Sync {
    /// Request path plus query string, e.g. `/evsock?when=open&transport=stream`.
    fn uri(&self) -> String;

    /// Request method, uppercase.
    fn method(&self) -> String;

    /// Look up a request header by lowercase name.
    fn header(&self, name: &str) -> Option<String>;

    /// Set the response status code. Must be called before the first write.
    fn set_status(&self, status: u16);

    /// Set a response header. Must be called before the first write.
    fn set_header(&self, name: &str, value: &str);

    /// Write a chunk of the response body.
    fn write(&self, chunk: &str);

    /// End the response. Idempotent.
    fn end(&self);

    /// Write a final chunk and end the response.
    fn end_with(&self, body: &str) {
        self.write(body);
        self.end();
    }

    /// Start reading the request body; the registered body callback fires
    /// once the full body is available.
    fn read(&self);

    /// Register the body callback. Register before calling [`read`](Self::read).
    fn on_body(&self, callback: TextCallback);

    /// Register an error callback.
    fn on_error(&self, callback: ErrorCallback);

    /// Register a close callback.
    ///
    /// The bridge guarantees a single fire, whether the exchange ended
    /// normally (either side) or the client connection dropped. A callback
    /// registered after the fact is invoked immediately.
    fn on_close(&self, callback: CloseCallback);
}

/// One accepted WebSocket connection, as seen by the engine.
pub trait WebSocketChannel: Send + Sync {
    /// Connect-time request path plus query string.
    fn uri(&self) -> String;

    /// Send a text frame.
    fn send(&self, data: &str);

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Register a text-frame callback.
    fn on_text(&self, callback: TextCallback);

    /// Register an error callback.
    fn on_error(&self, callback: ErrorCallback);

    /// Register a close callback; single fire, replayed to late registrants.
    fn on_close(&self, callback: CloseCallback);
}
