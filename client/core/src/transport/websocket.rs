//! WebSocket Connector
//!
//! Opens the duplex connection to the generation service over WebSocket
//! (`ws://` or `wss://`). Each connection is pumped by two tasks:
//!
//! - a reader that turns text frames into [`LinkEvent::Frame`] and reports
//!   close/error exactly once, then stops
//! - a writer that drains the outbound channel into the socket and sends a
//!   close frame when the channel is dropped
//!
//! Only text frames carry protocol data; binary frames are ignored and
//! ping/pong is handled by tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace};

use super::traits::{Connector, Link, LinkEvent, TransportError};

/// Per-direction channel capacity
const CHANNEL_CAPACITY: usize = 100;

/// Connector for a WebSocket endpoint
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for the given `ws://` / `wss://` URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {e}", self.url)))?;
        debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<LinkEvent>(CHANNEL_CAPACITY);

        // Reader: socket -> inbound events
        tokio::spawn(async move {
            let terminal = loop {
                match source.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        if in_tx.send(LinkEvent::Frame(text)).await.is_err() {
                            trace!("Link dropped; reader stopping");
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break LinkEvent::Closed(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(other)) => {
                        trace!(kind = ?other, "Ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        break LinkEvent::Error(TransportError::ReceiveFailed(e.to_string()));
                    }
                    None => break LinkEvent::Closed(None),
                }
            };
            let _ = in_tx.send(terminal).await;
        });

        // Writer: outbound channel -> socket
        tokio::spawn(async move {
            while let Some(payload) = out_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(payload)).await {
                    debug!(error = %e, "WebSocket write failed");
                    return;
                }
            }
            // Link dropped: close politely
            let _ = sink.close().await;
        });

        Ok(Link::new(out_tx, in_rx))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
