//! Session Errors
//!
//! The error taxonomy surfaced to front ends. Transport failures are mostly
//! absorbed by the supervisor's reconnect loop and only show up here when an
//! operation needed the connection right now.

use thiserror::Error;

use crate::api::ApiError;
use crate::messages::MessageId;
use crate::transcript::TranscriptError;
use crate::transport::TransportError;

/// Errors returned by session operations
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation needs an open connection
    #[error("Not connected")]
    NotConnected,

    /// The target message does not exist
    #[error("Message {0} not found")]
    NotFound(MessageId),

    /// The connection failed or delivered something unreadable
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer did not confirm the operation
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// A generation is in progress
    #[error("A reply is still being generated")]
    Busy,

    /// The target message has a provisional id the peer has not confirmed
    #[error("Message {0} is not confirmed by the server yet")]
    Unconfirmed(MessageId),
}

impl SessionError {
    /// Map a collaborator error for an operation on `id`
    #[must_use]
    pub fn from_api(error: ApiError, id: MessageId) -> Self {
        match error {
            ApiError::NotFound => Self::NotFound(id),
            other => Self::OperationFailed(other.to_string()),
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(error: ApiError) -> Self {
        Self::OperationFailed(error.to_string())
    }
}

impl From<TranscriptError> for SessionError {
    fn from(error: TranscriptError) -> Self {
        match error {
            TranscriptError::NotFound(id) => Self::NotFound(id),
            TranscriptError::TurnOpen(_) => Self::Busy,
        }
    }
}

/// Result alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
