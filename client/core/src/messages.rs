//! Session Messages
//!
//! Data model shared by every layer of the session client: transcript
//! entries, the frames exchanged over the duplex connection, and the payloads
//! of the request/response collaborators.
//!
//! # Wire Protocol
//!
//! The duplex connection carries JSON text frames:
//!
//! ```text
//! client -> peer   { "content": "<text>" }
//! peer -> client   { "type": "chunk", "content": "<fragment>" }
//! peer -> client   { "type": "end", "next_message_id": 7, "should_exit": false }
//! ```
//!
//! The outbound shape is the same for every user turn, including the resend
//! performed by regenerate.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

/// Identifier of a transcript entry
///
/// Assigned by the peer. The id space is sparse after deletes, so it is never
/// derived from the transcript length.
pub type MessageId = i64;

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human player
    User,
    /// The generation service
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single transcript entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Peer-assigned identifier (provisional until confirmed by a reload)
    pub id: MessageId,
    /// Author of the message
    pub role: Role,
    /// Message text
    pub content: String,
    /// Human-readable creation time; the peer's history omits it
    #[serde(default)]
    pub timestamp: String,
    /// Whether `id` was assigned locally and not yet confirmed by the peer
    #[serde(skip)]
    pub provisional: bool,
}

impl Message {
    /// Create a locally authored message with a provisional id
    pub fn provisional(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: local_timestamp(),
            provisional: true,
        }
    }

    /// Create a peer-confirmed message
    pub fn confirmed(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: String::new(),
            provisional: false,
        }
    }

    /// True for assistant-authored messages
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

// ============================================
// Duplex frames
// ============================================

/// The only frame the client sends to the peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// User turn text
    pub content: String,
}

impl OutboundFrame {
    /// Create a frame for a user turn
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Serialize to the JSON text payload
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Serialization` if encoding fails.
    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}

/// Frames sent by the peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// A fragment of assistant-authored content
    Chunk {
        /// Fragment text, appended verbatim
        content: String,
    },

    /// Marks the end of the current turn
    End {
        /// Identifier to use for the next user-authored message
        next_message_id: MessageId,
        /// Peer asks the client to end the session
        #[serde(default)]
        should_exit: bool,
    },
}

impl InboundFrame {
    /// Parse a JSON text payload
    ///
    /// # Errors
    ///
    /// Returns `TransportError::MalformedFrame` if the payload is not a
    /// recognised frame.
    pub fn decode(raw: &str) -> Result<Self, TransportError> {
        serde_json::from_str(raw).map_err(|e| TransportError::MalformedFrame(e.to_string()))
    }
}

// ============================================
// Request/response payloads
// ============================================

/// Status value the peer uses for a successful operation
pub const STATUS_SUCCESS: &str = "success";

/// Response of the transcript fetch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Full transcript in conversation order
    pub history: Vec<Message>,
    /// Identifier for the next user-authored message
    pub next_message_id: MessageId,
}

/// Body of the edit request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EditRequest {
    /// Target message
    pub id: MessageId,
    /// Replacement content
    pub content: String,
}

/// Generic `{ status }` response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `"success"` on success
    pub status: String,
}

impl StatusResponse {
    /// Whether the peer reported success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Response of the delete request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// `"success"` on success
    pub status: String,
    /// Identifier for the next user-authored message after the delete
    pub next_message_id: MessageId,
}

/// Non-chat game state: named text fields
pub type FieldMap = BTreeMap<String, String>;

/// Body of the field fetch response and of the field update request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldsPayload {
    /// Field name to value
    pub fields: FieldMap,
}

/// Server tuning values, opaque scalars keyed by name
pub type ServerConfigMap = BTreeMap<String, serde_json::Value>;

/// Body of the server config fetch response and update request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerConfigPayload {
    /// Setting name to value
    pub config: ServerConfigMap,
}

/// Current local time in the format used for client-authored messages
#[must_use]
pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
