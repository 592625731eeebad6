//! Socket error types.

use thiserror::Error;

use evsock_transport::TransportError;

/// Errors raised on a socket and delivered through its error handlers.
///
/// Like transport errors these never propagate through return values; the
/// socket API is fire-and-forget and failures surface as events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// The underlying transport raised an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The client missed a heartbeat window; the connection is presumed
    /// dead and will be closed.
    #[error("heartbeat not received in time")]
    HeartbeatFailed,

    /// A payload could not be encoded or decoded.
    #[error("protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },
}

impl SocketError {
    pub(crate) fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }
}
