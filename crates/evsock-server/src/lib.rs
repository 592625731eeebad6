//! Server layer of the evsock event socket.
//!
//! A [`Server`] accepts transports from host bridges and wraps each in a
//! [`Socket`]: a bidirectional event channel with named events, reply
//! correlation and heartbeats. Live sockets are addressable by id, by tag,
//! or all at once.
//!
//! The transport mechanics (WebSocket, HTTP streaming, HTTP long-polling)
//! live in `evsock-transport`; this crate is only concerned with what flows
//! over them.

#![deny(missing_docs)]

pub mod error;
pub mod server;
pub mod socket;

pub use error::SocketError;
pub use server::{Server, ServerBuilder};
pub use socket::{Reply, Socket};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::SocketError;
    pub use crate::server::Server;
    pub use crate::socket::{Reply, Socket};
}
