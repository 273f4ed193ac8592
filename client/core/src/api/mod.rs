//! Request/Response Collaborators
//!
//! Everything the session needs from the peer besides the duplex stream:
//! transcript fetch, edit, delete, the non-chat field set, save and server
//! tuning values. The session only depends on the [`GameMasterApi`] trait;
//! [`HttpApi`] is the REST implementation.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | fetch transcript | `GET /api/get_chat_history` |
//! | edit message | `POST /api/edit_message` |
//! | delete message | `DELETE /api/delete_message/{id}` |
//! | fetch fields | `GET /api/get_template_fields` |
//! | update fields | `POST /api/update_template_fields` |
//! | save | `POST /api/save_game` |
//! | fetch server config | `GET /api/get_config` |
//! | update server config | `POST /api/update_config` |

mod http;

pub use http::HttpApi;

use async_trait::async_trait;
use thiserror::Error;

use crate::messages::{FieldMap, HistoryResponse, MessageId, ServerConfigMap};

/// Errors from the request/response collaborators
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The target does not exist on the peer (HTTP 404)
    #[error("Not found")]
    NotFound,

    /// The peer answered with a non-success status
    #[error("Peer rejected the operation: {status}")]
    Rejected {
        /// Status value reported by the peer
        status: String,
    },

    /// The peer answered with an unexpected HTTP status
    #[error("HTTP {0}")]
    HttpStatus(u16),

    /// The request could not be completed
    #[error("Request failed: {0}")]
    Request(String),

    /// The response body was not what the endpoint promises
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// The peer's request/response surface
///
/// Every mutating call returns only after the peer confirmed the operation;
/// callers apply local state changes afterwards.
#[async_trait]
pub trait GameMasterApi: Send + Sync {
    /// Fetch the authoritative transcript and next id
    async fn fetch_history(&self) -> Result<HistoryResponse, ApiError>;

    /// Replace a message's content
    async fn edit_message(&self, id: MessageId, content: &str) -> Result<(), ApiError>;

    /// Delete a message, returning the peer's new next id
    async fn delete_message(&self, id: MessageId) -> Result<MessageId, ApiError>;

    /// Fetch the field set
    async fn fetch_fields(&self) -> Result<FieldMap, ApiError>;

    /// Update some fields (partial mapping)
    async fn update_fields(&self, fields: &FieldMap) -> Result<(), ApiError>;

    /// Ask the peer to snapshot the game
    async fn save_game(&self) -> Result<(), ApiError>;

    /// Fetch server tuning values
    async fn fetch_server_config(&self) -> Result<ServerConfigMap, ApiError>;

    /// Update server tuning values
    async fn update_server_config(&self, config: &ServerConfigMap) -> Result<(), ApiError>;
}
