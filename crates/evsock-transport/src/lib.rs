//! Transport abstractions for the evsock event socket.
//!
//! A [`Transport`] is the lowest abstraction of the engine: a bidirectional
//! text-message channel with an explicit lifecycle
//! ([`Open -> Closing -> Closed`](TransportState)) and uniform error/close
//! signaling, regardless of the underlying mechanism.
//!
//! # Available Transports
//!
//! | Transport | Mechanism |
//! |-----------|-----------|
//! | [`websocket::WebSocketTransport`] | one WebSocket connection |
//! | [`http::StreamTransport`] | one long-lived HTTP response, SSE-style framing |
//! | [`http::LongpollTransport`] | a sequence of short HTTP request/response pairs |
//!
//! HTTP transports are created and driven by the [`http::HttpDispatcher`],
//! which implements the `when=open|poll|abort` query protocol and routes
//! inbound POST messages by connection id.
//!
//! # Host-runtime boundary
//!
//! The engine never touches a concrete server runtime. Host bridges hand it
//! [`bridge::HttpExchange`] and [`bridge::WebSocketChannel`] trait objects;
//! everything else is the engine's own state. In-memory implementations of
//! both collaborator traits live in [`memory`] for tests.

#![deny(missing_docs)]

pub mod bridge;
pub mod error;
pub mod http;
pub mod memory;
pub mod query;
pub mod timer;
pub mod transport;
pub mod websocket;

pub use bridge::{HttpExchange, WebSocketChannel};
pub use error::TransportError;
pub use http::{HttpDispatcher, LongpollTransport, StreamTransport};
pub use timer::Timer;
pub use transport::{Transport, TransportBase, TransportState};
pub use websocket::WebSocketTransport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bridge::{HttpExchange, WebSocketChannel};
    pub use crate::error::TransportError;
    pub use crate::http::HttpDispatcher;
    pub use crate::transport::{Transport, TransportState};
    pub use crate::websocket::WebSocketTransport;
}
