//! Protocol error types.

use thiserror::Error;

/// Errors in envelope encoding/decoding.
///
/// A malformed envelope is a protocol error scoped to the offending message:
/// it never affects connection-level state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The envelope could not be encoded.
    #[error("failed to encode envelope: {message}")]
    Encode {
        /// Error message.
        message: String,
    },

    /// The wire text was not a valid envelope.
    #[error("failed to decode envelope: {message}")]
    Decode {
        /// Error message.
        message: String,
    },
}
