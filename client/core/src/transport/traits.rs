//! Transport Traits
//!
//! Core definitions for the client side of the duplex connection.
//!
//! A [`Connector`] knows how to open one physical connection to the peer and
//! hands back a [`Link`]: a pair of channels pumped by the connector's own
//! I/O tasks. The supervisor owns at most one `Link` at a time and never lets
//! it escape, so a superseded connection cannot be written to after a
//! reconnect.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during transport operations
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection attempt to the peer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection attempt did not complete in time
    #[error("Connection attempt timed out after {0} ms")]
    Timeout(u64),

    /// Connection was closed by the peer or the network
    #[error("Connection closed")]
    ConnectionClosed,

    /// A send was attempted while not connected
    #[error("Not connected")]
    NotConnected,

    /// Failed to hand a payload to the connection
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to read from the connection
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Inbound payload was not a recognised frame
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Outbound payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Something that happened on an open link
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame arrived
    Frame(String),
    /// The peer closed the connection (optional close reason)
    Closed(Option<String>),
    /// The connection failed
    Error(TransportError),
}

/// One open connection, expressed as channels
///
/// Dropping the `Link` closes the connection: the connector's writer task
/// sees the outbound channel close and shuts the socket down.
#[derive(Debug)]
pub struct Link {
    /// Payloads to write to the peer, in order
    pub outbound: mpsc::Sender<String>,
    /// Events read from the peer, in arrival order
    pub inbound: mpsc::Receiver<LinkEvent>,
}

impl Link {
    /// Bundle the two halves of a link
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<LinkEvent>) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens connections to the peer
///
/// Implementations spawn whatever tasks they need to pump the socket and
/// return immediately once the peer has accepted the connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection
    async fn connect(&self) -> Result<Link, TransportError>;

    /// Human-readable endpoint, used in logs
    fn endpoint(&self) -> String;
}
