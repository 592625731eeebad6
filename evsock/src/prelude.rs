//! Prelude module for convenient imports.
//!
//! Import everything you need with a single use statement:
//!
//! ```rust
//! use evsock::prelude::*;
//!
//! let server = Server::builder().build();
//! server.on_socket(|socket| {
//!     socket.on("greeting", |data, _| println!("peer says {data}"));
//! });
//! ```
//!
//! ## Included Types
//!
//! ### Core Types
//! - [`Envelope`] and [`ReplyOutcome`] wire records
//! - [`ActionList`] lifecycle-event callbacks
//!
//! ### Server Types
//! - [`Server`] and [`ServerBuilder`]
//! - [`Socket`], [`Reply`] and [`SocketError`]
//!
//! ### Transport Types
//! - [`Transport`] trait and [`TransportState`]
//! - [`HttpExchange`] and [`WebSocketChannel`] host-bridge traits
//! - [`HttpDispatcher`]

// Core types
pub use evsock_core::{ActionId, ActionList, Envelope, ProtocolError, ReplyOutcome};

// Server types
pub use evsock_server::{Reply, Server, ServerBuilder, Socket, SocketError};

// Transport types
pub use evsock_transport::{
    HttpDispatcher, HttpExchange, Transport, TransportError, TransportState, WebSocketChannel,
};
