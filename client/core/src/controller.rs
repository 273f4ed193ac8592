//! Turn Controller
//!
//! Orchestrates the user operations that touch more than one component:
//! send, edit, delete and regenerate, plus the field set and save calls.
//!
//! # Confirmation discipline
//!
//! Local state changes only after the peer confirmed the operation. The one
//! optimistic step is the user message appended by `send`, which carries a
//! provisional id until the next transcript reload replaces it.
//!
//! # Serialisation
//!
//! Every operation takes `&mut self`, so two orchestrated operations can
//! never interleave on one controller. Delete and regenerate are refused
//! with [`SessionError::Busy`] while a reply is being generated.

use tracing::{debug, info, warn};

use crate::api::GameMasterApi;
use crate::error::{Result, SessionError};
use crate::messages::{
    FieldMap, InboundFrame, Message, MessageId, OutboundFrame, Role, ServerConfigMap,
};
use crate::reconciler::{ReconcileOutcome, StreamReconciler, TurnState};
use crate::transcript::{Transcript, TranscriptError};
use crate::transport::{ConnectionHandle, ConnectionState};

/// Why a send was silently ignored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Input was empty or whitespace
    Empty,
    /// A reply is still being generated
    Generating,
    /// The connection is not open
    NotConnected,
}

/// Result of [`TurnController::send`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The user message was appended and handed to the connection
    Sent {
        /// Provisional id of the appended user message
        id: MessageId,
    },
    /// Nothing happened
    Ignored(IgnoreReason),
}

/// Result of [`TurnController::regenerate`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegenerateOutcome {
    /// The last exchange was deleted and the user turn re-sent
    Resent {
        /// Provisional id of the re-appended user message
        id: MessageId,
    },
    /// The transcript does not end with a user/assistant exchange
    Skipped,
}

/// Coordinates the transcript, the generation flag and the send path
pub struct TurnController<A: GameMasterApi> {
    api: A,
    connection: ConnectionHandle,
    transcript: Transcript,
    turn: TurnState,
    reconciler: StreamReconciler,
    fields: FieldMap,
    resync_after_turn: bool,
    needs_resync: bool,
}

impl<A: GameMasterApi> TurnController<A> {
    /// Create a controller with an empty transcript
    pub fn new(api: A, connection: ConnectionHandle, resync_after_turn: bool) -> Self {
        Self {
            api,
            connection,
            transcript: Transcript::new(),
            turn: TurnState::default(),
            reconciler: StreamReconciler::new(),
            fields: FieldMap::new(),
            resync_after_turn,
            needs_resync: false,
        }
    }

    // ============================================
    // Send
    // ============================================

    /// Send a user turn
    ///
    /// Ignored when the input is blank, a reply is being generated, or the
    /// connection is not open. On acceptance the user message is appended
    /// with the current next id, the generation flag is set and the content
    /// is handed to the connection without waiting for delivery.
    ///
    /// # Errors
    ///
    /// `Transport` if the connection refused the payload after acceptance;
    /// the appended message is taken back and the flag cleared.
    pub fn send(&mut self, input: &str) -> Result<SendOutcome> {
        if input.trim().is_empty() {
            return Ok(SendOutcome::Ignored(IgnoreReason::Empty));
        }
        if self.is_generating() {
            debug!("Send ignored: reply in progress");
            return Ok(SendOutcome::Ignored(IgnoreReason::Generating));
        }
        if !self.connection.is_connected() {
            debug!(state = %self.connection.state(), "Send ignored: not connected");
            return Ok(SendOutcome::Ignored(IgnoreReason::NotConnected));
        }

        let id = self.dispatch(input)?;
        Ok(SendOutcome::Sent { id })
    }

    /// Append, raise the flag and hand the content to the connection
    fn dispatch(&mut self, content: &str) -> Result<MessageId> {
        let payload = OutboundFrame::new(content).encode()?;
        let id = self.turn.next_id;

        self.transcript
            .append(Message::provisional(id, Role::User, content))?;
        self.turn.generating = true;

        if let Err(e) = self.connection.send(payload) {
            warn!(id = id, error = %e, "Send failed after append; rolling back");
            self.transcript.retract(id);
            self.turn.generating = false;
            return Err(e.into());
        }

        info!(id = id, "User turn sent");
        Ok(id)
    }

    // ============================================
    // Edit / delete / regenerate
    // ============================================

    /// Replace a message's content once the peer confirms
    ///
    /// # Errors
    ///
    /// `Busy` for the open turn, `Unconfirmed` for a provisional id,
    /// `NotFound` if the peer does not know the id, `OperationFailed` if the
    /// peer did not confirm. The transcript is unchanged on error.
    pub async fn edit(&mut self, id: MessageId, content: &str) -> Result<()> {
        if self.transcript.open_turn_id() == Some(id) {
            return Err(SessionError::Busy);
        }
        self.require_confirmed(id)?;

        self.api
            .edit_message(id, content)
            .await
            .map_err(|e| SessionError::from_api(e, id))?;

        match self.transcript.edit(id, content) {
            Ok(()) => {
                info!(id = id, "Message edited");
                Ok(())
            }
            Err(TranscriptError::NotFound(_)) => {
                // Peer knows a message we do not
                debug!(id = id, "Edited message missing locally; reloading");
                self.reload_transcript().await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a message, then adopt the peer's next id and transcript
    ///
    /// # Errors
    ///
    /// `Busy` while generating, `Unconfirmed` for a provisional id,
    /// `NotFound` / `OperationFailed` if the peer refused. A failed reload
    /// after a confirmed delete is logged and retried on the next resync.
    pub async fn delete(&mut self, id: MessageId) -> Result<()> {
        if self.is_generating() {
            return Err(SessionError::Busy);
        }
        self.require_confirmed(id)?;

        self.confirm_delete(id).await?;
        info!(id = id, "Message deleted");

        if let Err(e) = self.reload_transcript().await {
            warn!(error = %e, "Reload after delete failed");
        }
        Ok(())
    }

    /// Replace the last user/assistant exchange with a fresh reply
    ///
    /// Deletes the trailing assistant message, then the user message before
    /// it, and only when both deletes are confirmed re-sends the preserved
    /// user content.
    ///
    /// # Errors
    ///
    /// `Busy` while generating, `NotConnected` when the resend could not go
    /// out, `Unconfirmed` for provisional ids, and the delete errors. If
    /// either delete fails nothing is re-sent. A failed reload between the
    /// deletes and the resend is logged and left to the next resync.
    pub async fn regenerate(&mut self) -> Result<RegenerateOutcome> {
        if self.is_generating() {
            return Err(SessionError::Busy);
        }

        let (user, reply) = match self.transcript.last_pair() {
            Some((user, reply)) if user.role == Role::User && reply.is_assistant() => {
                (user.clone(), reply.clone())
            }
            _ => {
                debug!(len = self.transcript.len(), "Nothing to regenerate");
                return Ok(RegenerateOutcome::Skipped);
            }
        };

        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.require_confirmed(reply.id)?;
        self.require_confirmed(user.id)?;

        self.confirm_delete(reply.id).await?;
        if let Err(e) = self.confirm_delete(user.id).await {
            warn!(id = user.id, error = %e, "Regenerate aborted after first delete");
            if let Err(reload) = self.reload_transcript().await {
                warn!(error = %reload, "Reload after aborted regenerate failed");
            }
            return Err(e);
        }

        // Both deletes are confirmed; the peer no longer holds this turn
        if let Err(e) = self.reload_transcript().await {
            warn!(error = %e, "Reload before resend failed; resending anyway");
        }

        let id = self.dispatch(&user.content)?;
        info!(id = id, "Regenerating reply");
        Ok(RegenerateOutcome::Resent { id })
    }

    async fn confirm_delete(&mut self, id: MessageId) -> Result<()> {
        let next_id = self
            .api
            .delete_message(id)
            .await
            .map_err(|e| SessionError::from_api(e, id))?;
        self.turn.next_id = next_id;
        Ok(())
    }

    fn require_confirmed(&self, id: MessageId) -> Result<()> {
        match self.transcript.get(id) {
            Some(msg) if msg.provisional => Err(SessionError::Unconfirmed(id)),
            _ => Ok(()),
        }
    }

    // ============================================
    // Transcript sync
    // ============================================

    /// Replace the transcript and next id with the peer's
    ///
    /// Deferred while a reply is streaming.
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the fetch failed; local state is unchanged.
    pub async fn reload_transcript(&mut self) -> Result<()> {
        if self.is_generating() {
            debug!("Reload deferred until the turn ends");
            self.needs_resync = true;
            return Ok(());
        }

        match self.api.fetch_history().await {
            Ok(history) => {
                self.transcript.replace(history.history);
                self.turn.next_id = history.next_message_id;
                self.needs_resync = false;
                Ok(())
            }
            Err(e) => {
                self.needs_resync = true;
                Err(e.into())
            }
        }
    }

    /// Reload if a resync is pending
    ///
    /// Returns `None` when nothing was pending.
    pub async fn resync_if_needed(&mut self) -> Option<Result<()>> {
        if !self.needs_resync || self.is_generating() {
            return None;
        }
        Some(self.reload_transcript().await)
    }

    /// Whether a reload is pending
    #[must_use]
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    // ============================================
    // Inbound
    // ============================================

    /// Apply one inbound frame
    ///
    /// # Errors
    ///
    /// Propagates transcript contract violations from the reconciler.
    pub fn handle_frame(&mut self, frame: InboundFrame) -> Result<ReconcileOutcome> {
        let outcome = self
            .reconciler
            .apply(frame, &mut self.transcript, &mut self.turn)?;

        if matches!(outcome, ReconcileOutcome::TurnEnded { .. }) && self.resync_after_turn {
            self.needs_resync = true;
        }
        Ok(outcome)
    }

    /// React to a connection state change
    ///
    /// Losing the connection while a reply is open abandons the turn: no
    /// `end` frame can arrive on a new connection. Returns whether a turn was
    /// abandoned.
    pub fn handle_connection_change(&mut self, state: ConnectionState) -> bool {
        if state != ConnectionState::Disconnected || !self.is_generating() {
            return false;
        }

        let closed = self.transcript.close_turn();
        self.turn.generating = false;
        self.reconciler.reset();
        self.needs_resync = true;
        warn!(open_turn = ?closed, "Connection lost mid-turn; turn abandoned");
        true
    }

    // ============================================
    // Field set, save, server config
    // ============================================

    /// Load the field set from the peer
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the fetch failed.
    pub async fn load_fields(&mut self) -> Result<()> {
        self.fields = self.api.fetch_fields().await?;
        debug!(count = self.fields.len(), "Fields loaded");
        Ok(())
    }

    /// Update one field once the peer confirms
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the peer did not confirm; the local copy is
    /// unchanged.
    pub async fn update_field(&mut self, name: &str, value: &str) -> Result<()> {
        let mut update = FieldMap::new();
        update.insert(name.to_string(), value.to_string());

        self.api.update_fields(&update).await?;
        self.fields.extend(update);
        info!(field = name, "Field updated");
        Ok(())
    }

    /// Ask the peer to snapshot the game
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the peer did not confirm.
    pub async fn save_game(&self) -> Result<()> {
        self.api.save_game().await?;
        info!("Game saved");
        Ok(())
    }

    /// Fetch server tuning values
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the fetch failed.
    pub async fn server_config(&self) -> Result<ServerConfigMap> {
        Ok(self.api.fetch_server_config().await?)
    }

    /// Update server tuning values
    ///
    /// # Errors
    ///
    /// `OperationFailed` if the peer did not confirm.
    pub async fn update_server_config(&self, config: &ServerConfigMap) -> Result<()> {
        self.api.update_server_config(config).await?;
        Ok(())
    }

    // ============================================
    // Accessors
    // ============================================

    /// The transcript
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Whether a reply is in progress
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.turn.generating || self.transcript.is_turn_open()
    }

    /// A reply was requested but its first fragment has not arrived
    #[must_use]
    pub fn awaiting_first_fragment(&self) -> bool {
        self.turn.generating && !self.transcript.last().is_some_and(Message::is_assistant)
    }

    /// Peer-authoritative id for the next user message
    #[must_use]
    pub fn next_id(&self) -> MessageId {
        self.turn.next_id
    }

    /// Local copy of the field set
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Current connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::messages::HistoryResponse;
    use crate::transport::{
        ConnectionSupervisor, InProcessConnector, PeerLink, TransportConfig,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeServer {
        history: Vec<Message>,
        next_id: MessageId,
        fields: FieldMap,
        reject_edits: bool,
        reject_deletes: HashSet<MessageId>,
        fail_history: bool,
        deletes: Vec<MessageId>,
        saves: u32,
    }

    impl FakeServer {
        fn record_turn(&mut self, user: &str, reply: &str) {
            let id = self.next_id;
            self.history.push(Message::confirmed(id, Role::User, user));
            self.history.push(Message::confirmed(id + 1, Role::Assistant, reply));
            self.next_id += 2;
        }
    }

    #[derive(Clone, Default)]
    struct FakeApi(Arc<Mutex<FakeServer>>);

    impl FakeApi {
        fn server(&self) -> std::sync::MutexGuard<'_, FakeServer> {
            self.0.lock().unwrap()
        }
    }

    #[async_trait]
    impl GameMasterApi for FakeApi {
        async fn fetch_history(&self) -> std::result::Result<HistoryResponse, ApiError> {
            let server = self.server();
            if server.fail_history {
                return Err(ApiError::HttpStatus(503));
            }
            Ok(HistoryResponse {
                history: server.history.clone(),
                next_message_id: server.next_id,
            })
        }

        async fn edit_message(&self, id: MessageId, content: &str) -> std::result::Result<(), ApiError> {
            let mut server = self.server();
            if server.reject_edits {
                return Err(ApiError::Rejected {
                    status: "error".to_string(),
                });
            }
            let msg = server
                .history
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(ApiError::NotFound)?;
            msg.content = content.to_string();
            Ok(())
        }

        async fn delete_message(&self, id: MessageId) -> std::result::Result<MessageId, ApiError> {
            let mut server = self.server();
            if server.reject_deletes.contains(&id) {
                return Err(ApiError::HttpStatus(500));
            }
            let pos = server
                .history
                .iter()
                .position(|m| m.id == id)
                .ok_or(ApiError::NotFound)?;
            server.history.remove(pos);
            server.deletes.push(id);
            Ok(server.next_id)
        }

        async fn fetch_fields(&self) -> std::result::Result<FieldMap, ApiError> {
            Ok(self.server().fields.clone())
        }

        async fn update_fields(&self, fields: &FieldMap) -> std::result::Result<(), ApiError> {
            self.server().fields.extend(fields.clone());
            Ok(())
        }

        async fn save_game(&self) -> std::result::Result<(), ApiError> {
            self.server().saves += 1;
            Ok(())
        }

        async fn fetch_server_config(&self) -> std::result::Result<ServerConfigMap, ApiError> {
            Ok(ServerConfigMap::new())
        }

        async fn update_server_config(
            &self,
            _config: &ServerConfigMap,
        ) -> std::result::Result<(), ApiError> {
            Ok(())
        }
    }

    struct Harness {
        api: FakeApi,
        controller: TurnController<FakeApi>,
        supervisor: ConnectionSupervisor,
        peer: Option<PeerLink>,
    }

    async fn harness(connected: bool) -> Harness {
        let (connector, mut acceptor) = InProcessConnector::new_pair();
        let mut supervisor = ConnectionSupervisor::spawn(connector, TransportConfig::default());
        let mut peer = None;

        if connected {
            supervisor.handle().connect();
            while supervisor.state() != ConnectionState::Connected {
                supervisor.next_event().await;
            }
            peer = acceptor.accept().await;
        }

        let api = FakeApi::default();
        api.server().record_turn("Where am I?", "A dim tavern.");
        let mut controller = TurnController::new(api.clone(), supervisor.handle(), true);
        controller.reload_transcript().await.unwrap();

        Harness {
            api,
            controller,
            supervisor,
            peer,
        }
    }

    fn chunk(text: &str) -> InboundFrame {
        InboundFrame::Chunk {
            content: text.to_string(),
        }
    }

    fn end(next_message_id: MessageId) -> InboundFrame {
        InboundFrame::End {
            next_message_id,
            should_exit: false,
        }
    }

    #[tokio::test]
    async fn test_send_appends_and_writes_frame() {
        let mut h = harness(true).await;

        let outcome = h.controller.send("Order an ale").unwrap();
        assert_eq!(outcome, SendOutcome::Sent { id: 2 });
        assert!(h.controller.is_generating());
        assert!(h.controller.awaiting_first_fragment());

        let last = h.controller.transcript().last().unwrap();
        assert_eq!((last.id, last.role), (2, Role::User));
        assert!(last.provisional);

        let peer = h.peer.as_mut().unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some(r#"{"content":"Order an ale"}"#));
    }

    #[tokio::test]
    async fn test_send_gating_leaves_transcript_unchanged() {
        let mut h = harness(true).await;

        assert_eq!(
            h.controller.send("   \n").unwrap(),
            SendOutcome::Ignored(IgnoreReason::Empty)
        );
        h.controller.send("first").unwrap();
        let len = h.controller.transcript().len();
        assert_eq!(
            h.controller.send("second").unwrap(),
            SendOutcome::Ignored(IgnoreReason::Generating)
        );
        assert_eq!(h.controller.transcript().len(), len);

        let mut offline = harness(false).await;
        assert_eq!(
            offline.controller.send("hello").unwrap(),
            SendOutcome::Ignored(IgnoreReason::NotConnected)
        );
        assert_eq!(offline.controller.transcript().len(), 2);
        offline.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_then_resync_confirms_ids() {
        let mut h = harness(true).await;
        h.controller.send("Order an ale").unwrap();

        h.controller.handle_frame(chunk("The barkeep ")).unwrap();
        assert!(!h.controller.awaiting_first_fragment());
        h.controller.handle_frame(chunk("nods.")).unwrap();

        h.api.server().record_turn("Order an ale", "The barkeep nods.");
        let outcome = h.controller.handle_frame(end(4)).unwrap();
        assert!(matches!(outcome, ReconcileOutcome::TurnEnded { next_message_id: 4, .. }));
        assert!(!h.controller.is_generating());
        assert_eq!(h.controller.next_id(), 4);

        assert!(h.controller.needs_resync());
        assert_eq!(h.controller.resync_if_needed().await, Some(Ok(())));
        assert!(h.controller.resync_if_needed().await.is_none());

        let transcript = h.controller.transcript();
        assert_eq!(transcript.len(), 4);
        assert!(transcript.messages().iter().all(|m| !m.provisional));
        assert_eq!(transcript.last().unwrap().content, "The barkeep nods.");
    }

    #[tokio::test]
    async fn test_edit_applies_after_confirmation() {
        let mut h = harness(true).await;

        h.controller.edit(0, "Who am I?").await.unwrap();
        assert_eq!(h.controller.transcript().get(0).unwrap().content, "Who am I?");
        assert_eq!(h.api.server().history[0].content, "Who am I?");
    }

    #[tokio::test]
    async fn test_edit_failure_leaves_content() {
        let mut h = harness(true).await;
        h.api.server().reject_edits = true;

        let result = h.controller.edit(1, "A bright tavern.").await;
        assert!(matches!(result, Err(SessionError::OperationFailed(_))));
        assert_eq!(h.controller.transcript().get(1).unwrap().content, "A dim tavern.");
    }

    #[tokio::test]
    async fn test_edit_unknown_id_is_not_found() {
        let mut h = harness(true).await;
        assert_eq!(
            h.controller.edit(42, "x").await,
            Err(SessionError::NotFound(42))
        );
    }

    #[tokio::test]
    async fn test_edit_refused_for_open_turn_and_provisional() {
        let mut h = harness(true).await;
        h.controller.send("Order an ale").unwrap();
        assert_eq!(
            h.controller.edit(2, "x").await,
            Err(SessionError::Unconfirmed(2))
        );

        h.controller.handle_frame(chunk("The barkeep")).unwrap();
        assert_eq!(h.controller.edit(3, "x").await, Err(SessionError::Busy));
    }

    #[tokio::test]
    async fn test_delete_reloads_from_peer() {
        let mut h = harness(true).await;

        h.controller.delete(1).await.unwrap();
        assert_eq!(h.api.server().deletes, vec![1]);
        let ids: Vec<_> = h.controller.transcript().messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0]);
        assert_eq!(h.controller.next_id(), 2);
    }

    #[tokio::test]
    async fn test_delete_failure_leaves_transcript() {
        let mut h = harness(true).await;
        h.api.server().reject_deletes.insert(1);

        let result = h.controller.delete(1).await;
        assert!(matches!(result, Err(SessionError::OperationFailed(_))));

        let ids: Vec<_> = h.controller.transcript().messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(h.controller.transcript().get(1).unwrap().content, "A dim tavern.");
        assert_eq!(h.controller.next_id(), 2);
        assert!(h.api.server().deletes.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found() {
        let mut h = harness(true).await;
        assert_eq!(h.controller.delete(42).await, Err(SessionError::NotFound(42)));
        assert_eq!(h.controller.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_refused_while_generating() {
        let mut h = harness(true).await;
        h.controller.send("hello").unwrap();

        assert_eq!(h.controller.delete(0).await, Err(SessionError::Busy));
        assert!(h.api.server().deletes.is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_resends_preserved_content() {
        let mut h = harness(true).await;

        let outcome = h.controller.regenerate().await.unwrap();
        assert_eq!(outcome, RegenerateOutcome::Resent { id: 2 });
        assert_eq!(h.api.server().deletes, vec![1, 0]);
        assert!(h.controller.is_generating());

        let transcript = h.controller.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.last().unwrap().content, "Where am I?");

        let peer = h.peer.as_mut().unwrap();
        assert_eq!(peer.recv_content().await.as_deref(), Some("Where am I?"));
    }

    #[tokio::test]
    async fn test_regenerate_aborts_when_second_delete_fails() {
        let mut h = harness(true).await;
        h.api.server().reject_deletes.insert(0);

        let result = h.controller.regenerate().await;
        assert!(matches!(result, Err(SessionError::OperationFailed(_))));
        assert!(!h.controller.is_generating());

        // Only the assistant reply went away, nothing was re-sent
        let ids: Vec<_> = h.controller.transcript().messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0]);
        let peer = h.peer.as_mut().unwrap();
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), peer.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_regenerate_resends_when_reload_fails() {
        let mut h = harness(true).await;
        h.api.server().fail_history = true;

        let outcome = h.controller.regenerate().await.unwrap();
        assert_eq!(outcome, RegenerateOutcome::Resent { id: 2 });
        assert_eq!(h.api.server().deletes, vec![1, 0]);
        assert!(h.controller.is_generating());
        assert!(h.controller.needs_resync());

        let peer = h.peer.as_mut().unwrap();
        assert_eq!(peer.recv_content().await.as_deref(), Some("Where am I?"));
    }

    #[tokio::test]
    async fn test_regenerate_needs_an_exchange() {
        let mut h = harness(true).await;
        h.controller.delete(1).await.unwrap();

        assert_eq!(
            h.controller.regenerate().await,
            Ok(RegenerateOutcome::Skipped)
        );
        assert_eq!(h.api.server().deletes, vec![1]);
    }

    #[tokio::test]
    async fn test_regenerate_requires_connection() {
        let mut h = harness(false).await;
        assert_eq!(
            h.controller.regenerate().await,
            Err(SessionError::NotConnected)
        );
        assert!(h.api.server().deletes.is_empty());
        h.supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_lost_connection_abandons_turn() {
        let mut h = harness(true).await;
        h.controller.send("hello").unwrap();
        h.controller.handle_frame(chunk("Hel")).unwrap();

        assert!(!h.controller.handle_connection_change(ConnectionState::Connecting));
        assert!(h.controller.handle_connection_change(ConnectionState::Disconnected));
        assert!(!h.controller.is_generating());
        assert!(h.controller.needs_resync());

        // Not generating any more: a second disconnect is a no-op
        assert!(!h.controller.handle_connection_change(ConnectionState::Disconnected));
    }

    #[tokio::test]
    async fn test_field_update_after_confirmation() {
        let mut h = harness(true).await;
        h.api
            .server()
            .fields
            .insert("location".to_string(), "Tavern".to_string());

        h.controller.load_fields().await.unwrap();
        assert_eq!(h.controller.fields().get("location").map(String::as_str), Some("Tavern"));

        h.controller.update_field("quest", "Find the ring").await.unwrap();
        assert_eq!(h.controller.fields().len(), 2);
        assert_eq!(
            h.api.server().fields.get("quest").map(String::as_str),
            Some("Find the ring")
        );

        h.controller.save_game().await.unwrap();
        assert_eq!(h.api.server().saves, 1);
    }
}
