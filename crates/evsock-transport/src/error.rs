//! Transport error types.

use thiserror::Error;

/// Errors raised by a transport.
///
/// Transport failures never propagate to the caller of `send`/`close`; they
/// are delivered through the transport's `error` action list. The type is
/// `Clone` so it can fan out to every registered handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// `send` was called on a transport that is no longer open.
    ///
    /// This is the documented behavior for writes after `close`: the write
    /// is dropped and this error event is raised instead.
    #[error("transport not opened")]
    NotOpen,

    /// I/O failure reported by the underlying mechanism.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Create an I/O error from any displayable source.
    pub fn io(message: impl std::fmt::Display) -> Self {
        Self::Io {
            message: message.to_string(),
        }
    }
}
