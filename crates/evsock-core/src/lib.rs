//! Core protocol types for the evsock event socket.
//!
//! This crate holds the pieces of the protocol that are independent of any
//! transport or runtime:
//!
//! - [`envelope::Envelope`] - the `{id, type, data, reply}` record framing
//!   every message on the wire
//! - [`envelope::ReplyOutcome`] - the payload of the reserved `"reply"` event
//!   used for request/reply correlation
//! - [`actions::ActionList`] - an ordered list of callbacks with optional
//!   fire-once and replay-to-late-subscriber semantics, the building block
//!   for every lifecycle event in the engine
//! - [`error::ProtocolError`] - envelope encode/decode failures
//!
//! Nothing here performs I/O; transports and the socket layer live in
//! `evsock-transport` and `evsock-server`.

#![deny(missing_docs)]

pub mod actions;
pub mod envelope;
pub mod error;

pub use actions::{ActionId, ActionList, ActionOptions};
pub use envelope::{Envelope, ReplyOutcome};
pub use error::ProtocolError;
