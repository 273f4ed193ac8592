//! In-Process Transport
//!
//! Channel-based connector with a scriptable peer. Used to drive the
//! supervisor and a whole session without a network, e.g. when embedding a
//! local peer or injecting synthetic transport events in tests.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut acceptor) = InProcessConnector::new_pair();
//! let supervisor = ConnectionSupervisor::spawn(connector, TransportConfig::default());
//! supervisor.handle().connect();
//!
//! let mut peer = acceptor.accept().await.unwrap();
//! let content = peer.recv_content().await;
//! peer.send_chunk("Once ").await?;
//! peer.send_end(5, false).await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::{InboundFrame, MessageId, OutboundFrame};

use super::traits::{Connector, Link, LinkEvent, TransportError};

/// Per-link channel capacity
const LINK_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicUsize,
    refusing: AtomicBool,
}

/// Connector whose connections terminate in a [`PeerAcceptor`]
#[derive(Debug)]
pub struct InProcessConnector {
    accept_tx: mpsc::UnboundedSender<PeerLink>,
    counters: Arc<Counters>,
}

impl InProcessConnector {
    /// Create a connector and the acceptor that receives its connections
    #[must_use]
    pub fn new_pair() -> (Self, PeerAcceptor) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let connector = Self {
            accept_tx,
            counters: Arc::clone(&counters),
        };
        let acceptor = PeerAcceptor {
            accept_rx,
            counters,
        };

        (connector, acceptor)
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);

        if self.counters.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "peer refused connection".to_string(),
            ));
        }

        let (out_tx, out_rx) = mpsc::channel(LINK_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(LINK_CAPACITY);

        let peer = PeerLink {
            from_client: out_rx,
            to_client: in_tx,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("peer is gone".to_string()))?;

        Ok(Link::new(out_tx, in_rx))
    }

    fn endpoint(&self) -> String {
        "in-process".to_string()
    }
}

/// Peer side of an [`InProcessConnector`]
#[derive(Debug)]
pub struct PeerAcceptor {
    accept_rx: mpsc::UnboundedReceiver<PeerLink>,
    counters: Arc<Counters>,
}

impl PeerAcceptor {
    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<PeerLink> {
        self.accept_rx.recv().await
    }

    /// Number of connection attempts made so far (including refused ones)
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.counters.attempts.load(Ordering::SeqCst)
    }

    /// Refuse (or stop refusing) new connection attempts
    pub fn set_refusing(&self, refusing: bool) {
        self.counters.refusing.store(refusing, Ordering::SeqCst);
    }
}

/// The peer end of one in-process connection
#[derive(Debug)]
pub struct PeerLink {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<LinkEvent>,
}

impl PeerLink {
    /// Next raw payload written by the client (`None` once it hung up)
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next user turn written by the client
    pub async fn recv_content(&mut self) -> Option<String> {
        let raw = self.recv().await?;
        serde_json::from_str::<OutboundFrame>(&raw)
            .ok()
            .map(|frame| frame.content)
    }

    /// Deliver a raw text frame
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the client end is gone.
    pub async fn send_raw(&self, text: &str) -> Result<(), TransportError> {
        self.to_client
            .send(LinkEvent::Frame(text.to_string()))
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Deliver a `chunk` frame
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the client end is gone.
    pub async fn send_chunk(&self, content: &str) -> Result<(), TransportError> {
        self.send_frame(&InboundFrame::Chunk {
            content: content.to_string(),
        })
        .await
    }

    /// Deliver an `end` frame
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the client end is gone.
    pub async fn send_end(
        &self,
        next_message_id: MessageId,
        should_exit: bool,
    ) -> Result<(), TransportError> {
        self.send_frame(&InboundFrame::End {
            next_message_id,
            should_exit,
        })
        .await
    }

    async fn send_frame(&self, frame: &InboundFrame) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(frame).map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.send_raw(&text).await
    }

    /// Close the connection from the peer side
    pub fn close(self, reason: Option<&str>) {
        let _ = self
            .to_client
            .try_send(LinkEvent::Closed(reason.map(str::to_string)));
    }

    /// Fail the connection with a transport error
    pub fn fail(self, error: TransportError) {
        let _ = self.to_client.try_send(LinkEvent::Error(error));
    }
}
