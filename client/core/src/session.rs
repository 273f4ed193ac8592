//! Chat Session
//!
//! One [`ChatSession`] per active conversation. It owns the connection
//! supervisor and the turn controller, turns supervisor output into
//! [`SessionEvent`]s for a front end, and tears everything down in
//! [`ChatSession::dispose`].
//!
//! # Event loop
//!
//! A front end drives the session from a single task:
//!
//! ```ignore
//! let mut session = ChatSession::new(connector, api, transport, true);
//! session.start().await;
//!
//! loop {
//!     tokio::select! {
//!         Some(line) = input.next() => { session.send(&line)?; }
//!         event = session.next_event() => match event {
//!             Some(SessionEvent::Fragment { text, .. }) => print!("{text}"),
//!             Some(SessionEvent::ExitRequested) | None => break,
//!             _ => {}
//!         },
//!     }
//! }
//! session.dispose().await;
//! ```
//!
//! Frames are applied inside `next_event`, so every transcript mutation
//! happens on the caller's task in arrival order.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::api::GameMasterApi;
use crate::controller::{RegenerateOutcome, SendOutcome, TurnController};
use crate::error::Result;
use crate::messages::{FieldMap, InboundFrame, MessageId, ServerConfigMap};
use crate::reconciler::ReconcileOutcome;
use crate::transcript::Transcript;
use crate::transport::{
    ConnectionHandle, ConnectionState, ConnectionSupervisor, Connector, SupervisorEvent,
    TransportConfig,
};

#[cfg(feature = "websocket")]
use crate::{
    api::{ApiError, HttpApi},
    config::ClientConfig,
    transport::WebSocketConnector,
};

/// Something a front end may want to render
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connectivity changed
    Connection(ConnectionState),
    /// The first fragment of a reply arrived
    TurnOpened {
        /// Provisional id of the reply
        id: MessageId,
    },
    /// A fragment was appended to a reply
    Fragment {
        /// Id of the reply being extended
        id: MessageId,
        /// The fragment, verbatim
        text: String,
    },
    /// The reply finished
    TurnCompleted {
        /// Id for the next user message
        next_message_id: MessageId,
    },
    /// The peer asked the client to end the session
    ExitRequested,
    /// The connection dropped while a reply was streaming
    TurnAbandoned,
    /// The transcript was reloaded from the peer
    Resynced,
}

/// An active conversation
pub struct ChatSession<A: GameMasterApi> {
    supervisor: ConnectionSupervisor,
    controller: TurnController<A>,
    pending: VecDeque<SessionEvent>,
}

impl<A: GameMasterApi> ChatSession<A> {
    /// Create a session; nothing is connected until [`start`](Self::start)
    pub fn new<C: Connector>(
        connector: C,
        api: A,
        transport: TransportConfig,
        resync_after_turn: bool,
    ) -> Self {
        let supervisor = ConnectionSupervisor::spawn(connector, transport);
        let controller = TurnController::new(api, supervisor.handle(), resync_after_turn);

        Self {
            supervisor,
            controller,
            pending: VecDeque::new(),
        }
    }

    /// Connect and load the transcript and field set
    ///
    /// Load failures are logged and leave the local state empty.
    pub async fn start(&mut self) {
        self.supervisor.handle().connect();

        if let Err(e) = self.controller.reload_transcript().await {
            warn!(error = %e, "Initial transcript load failed");
        }
        if let Err(e) = self.controller.load_fields().await {
            warn!(error = %e, "Initial field load failed");
        }
        info!(
            messages = self.controller.transcript().len(),
            next_id = self.controller.next_id(),
            "Session started"
        );
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the session has been disposed. Cancel safe:
    /// events produced before cancellation stay queued, and an interrupted
    /// resync is retried on the next turn end or reconnect.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.supervisor.next_event().await? {
                SupervisorEvent::State(state) => self.on_state(state).await,
                SupervisorEvent::Frame(raw) => self.on_frame(&raw).await,
            }
        }
    }

    async fn on_state(&mut self, state: ConnectionState) {
        self.pending.push_back(SessionEvent::Connection(state));

        if self.controller.handle_connection_change(state) {
            self.pending.push_back(SessionEvent::TurnAbandoned);
        }
        if state == ConnectionState::Connected {
            self.resync().await;
        }
    }

    async fn on_frame(&mut self, raw: &str) {
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
                return;
            }
        };

        let fragment = match &frame {
            InboundFrame::Chunk { content } => Some(content.clone()),
            InboundFrame::End { .. } => None,
        };

        match self.controller.handle_frame(frame) {
            Ok(ReconcileOutcome::TurnOpened { id }) => {
                self.pending.push_back(SessionEvent::TurnOpened { id });
                if let Some(text) = fragment {
                    self.pending.push_back(SessionEvent::Fragment { id, text });
                }
            }
            Ok(ReconcileOutcome::Extended { id }) => {
                if let Some(text) = fragment {
                    self.pending.push_back(SessionEvent::Fragment { id, text });
                }
            }
            Ok(ReconcileOutcome::TurnEnded {
                next_message_id,
                should_exit,
                ..
            }) => {
                self.pending
                    .push_back(SessionEvent::TurnCompleted { next_message_id });
                if should_exit {
                    info!("Peer requested session end");
                    self.pending.push_back(SessionEvent::ExitRequested);
                }
                // Queued first: a cancelled reload must not lose the turn's events
                self.resync().await;
            }
            Err(e) => warn!(error = %e, "Frame could not be applied"),
        }
    }

    async fn resync(&mut self) {
        match self.controller.resync_if_needed().await {
            Some(Ok(())) => self.pending.push_back(SessionEvent::Resynced),
            Some(Err(e)) => warn!(error = %e, "Transcript resync failed"),
            None => {}
        }
    }

    // ============================================
    // Operations
    // ============================================

    /// Send a user turn (see [`TurnController::send`])
    ///
    /// # Errors
    ///
    /// `Transport` if the connection refused the payload after acceptance.
    pub fn send(&mut self, input: &str) -> Result<SendOutcome> {
        self.controller.send(input)
    }

    /// Edit a message once the peer confirms
    ///
    /// # Errors
    ///
    /// See [`TurnController::edit`].
    pub async fn edit(&mut self, id: MessageId, content: &str) -> Result<()> {
        self.controller.edit(id, content).await
    }

    /// Delete a message and reload from the peer
    ///
    /// # Errors
    ///
    /// See [`TurnController::delete`].
    pub async fn delete(&mut self, id: MessageId) -> Result<()> {
        self.controller.delete(id).await
    }

    /// Replace the last exchange with a fresh reply
    ///
    /// # Errors
    ///
    /// See [`TurnController::regenerate`].
    pub async fn regenerate(&mut self) -> Result<RegenerateOutcome> {
        self.controller.regenerate().await
    }

    /// Reload the transcript from the peer
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the fetch failed.
    pub async fn reload_transcript(&mut self) -> Result<()> {
        self.controller.reload_transcript().await
    }

    /// Update one field of the field set
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the peer did not confirm.
    pub async fn update_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.controller.update_field(name, value).await
    }

    /// Ask the peer to snapshot the game
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the peer did not confirm.
    pub async fn save_game(&self) -> Result<()> {
        self.controller.save_game().await
    }

    /// Fetch server tuning values
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the fetch failed.
    pub async fn server_config(&self) -> Result<ServerConfigMap> {
        self.controller.server_config().await
    }

    /// Update server tuning values
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the peer did not confirm.
    pub async fn update_server_config(&self, config: &ServerConfigMap) -> Result<()> {
        self.controller.update_server_config(config).await
    }

    /// Ask for a connection now (no-op when connecting or connected)
    pub fn reconnect(&self) {
        self.supervisor.handle().connect();
    }

    /// Cancel any scheduled reconnect and close the connection
    ///
    /// After this, [`next_event`](Self::next_event) drains what is already
    /// queued and then returns `None`. Idempotent.
    pub async fn dispose(&mut self) {
        debug!("Disposing session");
        self.supervisor.shutdown().await;
    }

    // ============================================
    // Accessors
    // ============================================

    /// The transcript
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        self.controller.transcript()
    }

    /// Local copy of the field set
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        self.controller.fields()
    }

    /// Current connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// A handle to the connection (state and manual connect)
    #[must_use]
    pub fn connection(&self) -> ConnectionHandle {
        self.supervisor.handle()
    }

    /// Whether a reply is in progress
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.controller.is_generating()
    }

    /// A reply was requested but nothing has arrived yet
    #[must_use]
    pub fn awaiting_first_fragment(&self) -> bool {
        self.controller.awaiting_first_fragment()
    }

    /// Peer-authoritative id for the next user message
    #[must_use]
    pub fn next_id(&self) -> MessageId {
        self.controller.next_id()
    }
}

#[cfg(feature = "websocket")]
impl ChatSession<HttpApi> {
    /// Session against the live peer described by `config`
    ///
    /// # Errors
    ///
    /// `ApiError::Request` if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> std::result::Result<Self, ApiError> {
        let api = HttpApi::new(config.base_url.clone(), config.request_timeout)?;
        let connector = WebSocketConnector::new(config.transport.ws_url.clone());
        Ok(Self::new(
            connector,
            api,
            config.transport.clone(),
            config.resync_after_turn,
        ))
    }
}
