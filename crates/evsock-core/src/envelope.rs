//! The event envelope framing every message.
//!
//! Each message exchanged between a socket and its peer is one JSON object:
//!
//! ```json
//! {"id": "3", "type": "echo", "data": "hi", "reply": false}
//! ```
//!
//! `id` is unique per sending socket and monotonically assigned; `type` is
//! the application-chosen event name; `data` is an opaque JSON value the
//! engine never interprets; `reply: true` means the sender expects a
//! [`"reply"`](Envelope::TYPE_REPLY) event referencing this id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The wire record framing every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per sending socket, monotonically assigned.
    pub id: String,
    /// The event name.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload, not interpreted by the engine.
    #[serde(default)]
    pub data: Value,
    /// Whether the sender expects a reply referencing [`id`](Self::id).
    #[serde(default)]
    pub reply: bool,
}

impl Envelope {
    /// Reserved event type carrying a [`ReplyOutcome`].
    pub const TYPE_REPLY: &'static str = "reply";
    /// Reserved event type for liveness probes.
    pub const TYPE_HEARTBEAT: &'static str = "heartbeat";

    /// Build an envelope.
    #[must_use]
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            data,
            reply: false,
        }
    }

    /// Mark this envelope as expecting a reply.
    #[must_use]
    pub const fn expecting_reply(mut self) -> Self {
        self.reply = true;
        self
    }

    /// Encode to the wire text form.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode {
            message: e.to_string(),
        })
    }

    /// Decode from the wire text form.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode {
            message: e.to_string(),
        })
    }
}

/// The payload of a `"reply"` event: the outcome of a reply-expecting send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyOutcome {
    /// The id of the original envelope this reply answers.
    pub id: String,
    /// The value the handler resolved or rejected with.
    #[serde(default)]
    pub data: Value,
    /// `true` when the handler rejected.
    #[serde(default)]
    pub exception: bool,
}

impl ReplyOutcome {
    /// A resolved outcome.
    #[must_use]
    pub fn resolved(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            exception: false,
        }
    }

    /// A rejected outcome.
    #[must_use]
    pub fn rejected(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            exception: true,
        }
    }
}
