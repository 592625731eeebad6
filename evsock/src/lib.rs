//! # evsock - Event Socket Server Engine
//!
//! A transport-agnostic engine for bidirectional event messaging between a
//! server and remote peers. Payloads are named events with JSON data; the
//! engine adds reply correlation, heartbeats and a connection registry on
//! top of interchangeable transports.
//!
//! ## Features
//!
//! - **Named events** with opaque JSON payloads and per-event handlers
//! - **Reply correlation**: a send can expect exactly one resolution or
//!   rejection from the peer
//! - **Interchangeable transports**: WebSocket, HTTP streaming (SSE
//!   framing) and HTTP long-polling with replay on reconnect
//! - **Heartbeat watchdog** that closes dead connections
//! - **Registry addressing**: all sockets, by id, or by tag
//!
//! ## Quick Start
//!
//! ```
//! use evsock::prelude::*;
//!
//! let server = Server::builder().build();
//! server.on_socket(|socket| {
//!     socket.on("echo", {
//!         let socket = socket.clone();
//!         move |data, _| socket.send("echo", data.clone())
//!     });
//!     socket.on("sum", |data, reply| {
//!         if let (Some(values), Some(reply)) = (data.as_array(), reply) {
//!             let total: i64 = values.iter().filter_map(|v| v.as_i64()).sum();
//!             reply.resolve(total.into());
//!         }
//!     });
//! });
//! // Hand `server.handle_http(...)` / `server.handle_websocket(...)` the
//! // exchanges and channels of your host runtime.
//! ```
//!
//! ## Crate Organization
//!
//! - [`evsock_core`] - Envelope framing and action lists (no async runtime)
//! - [`evsock_transport`] - Transports and the HTTP request dispatcher
//! - [`mod@evsock_server`] - Socket, reply and registry layer

#![deny(missing_docs)]

// Re-export all public items from core
pub use evsock_core::*;

// Re-export server types
pub use evsock_server::{Reply, Server, ServerBuilder, Socket, SocketError};

// Re-export transport types
pub use evsock_transport::{
    HttpDispatcher, HttpExchange, Transport, TransportError, TransportState, WebSocketChannel,
};

pub mod prelude;

/// Server module re-exports
pub mod server {
    //! Socket and registry layer types.
    pub use evsock_server::*;
}

/// Transport module re-exports
pub mod transport {
    //! Transport layer types.
    pub use evsock_transport::*;
}
