//! Connection Supervisor
//!
//! Owns the lifecycle of the single logical duplex connection to the peer.
//!
//! # State Machine
//!
//! ```text
//!                 connect                 peer accepts
//! Disconnected ───────────▶ Connecting ───────────────▶ Connected
//!      ▲                        │                           │
//!      │      attempt failed    │     peer closed / error   │
//!      ├────────────────────────┘                           │
//!      └────────────────────────────────────────────────────┘
//!      │
//!      └── reconnect delay elapsed ──▶ Connecting
//! ```
//!
//! Errors are triggers, not a state. Every transition into `Disconnected`
//! other than teardown schedules a reconnection attempt after a fixed delay.
//!
//! # Ownership
//!
//! The supervisor runs as a background task that is the only owner of the
//! active [`Link`]. Everything else talks to it through a
//! [`ConnectionHandle`] (commands in) or the supervisor's event stream
//! (state changes and frames out, in arrival order).

use std::fmt;
use std::future::pending;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::config::TransportConfig;
use super::traits::{Connector, Link, LinkEvent, TransportError};

/// Capacity of the supervisor -> session event channel
const EVENT_CAPACITY: usize = 256;

/// Connectivity of the session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection; a reconnect may be scheduled
    #[default]
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// The peer accepted the connection
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Output of the supervisor, delivered in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The connection state changed
    State(ConnectionState),
    /// A raw text frame arrived from the peer
    Frame(String),
}

#[derive(Debug)]
enum Command {
    Connect,
    Send(String),
    Shutdown,
}

/// Cheap, cloneable access to the supervisor's command path
///
/// Holds no reference to the underlying connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the connection is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Request a connection
    ///
    /// A no-op while connecting or connected. While disconnected, any pending
    /// scheduled reconnect is replaced by an immediate attempt.
    pub fn connect(&self) {
        if self.commands.send(Command::Connect).is_err() {
            debug!("Connect requested after supervisor shutdown");
        }
    }

    /// Hand a payload to the open connection
    ///
    /// Never queues for later: if the connection is not open the payload is
    /// dropped and `NotConnected` is returned. Does not wait for delivery.
    ///
    /// # Errors
    ///
    /// `NotConnected` when not connected, `SendFailed` if the supervisor has
    /// already shut down.
    pub fn send(&self, payload: impl Into<String>) -> Result<(), TransportError> {
        let state = self.state();
        if state != ConnectionState::Connected {
            warn!(state = %state, "Dropping outbound payload: not connected");
            return Err(TransportError::NotConnected);
        }

        self.commands
            .send(Command::Send(payload.into()))
            .map_err(|_| TransportError::SendFailed("supervisor stopped".to_string()))
    }
}

/// Supervises one logical connection
///
/// Dropping the supervisor aborts its task; prefer [`shutdown`](Self::shutdown)
/// for an orderly close.
pub struct ConnectionSupervisor {
    handle: ConnectionHandle,
    events: mpsc::Receiver<SupervisorEvent>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Spawn a supervisor in the `Disconnected` state
    ///
    /// No connection is attempted until [`ConnectionHandle::connect`] is
    /// called.
    pub fn spawn<C: Connector>(connector: C, config: TransportConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = SupervisorTask {
            connector,
            config,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            link: None,
            retry_at: None,
            failed_attempts: 0,
        };

        let endpoint = task.connector.endpoint();
        let handle = tokio::spawn(task.run());
        debug!(endpoint = %endpoint, "Connection supervisor started");

        Self {
            handle: ConnectionHandle {
                commands: command_tx,
                state: state_rx,
            },
            events: event_rx,
            task: Some(handle),
        }
    }

    /// A handle for issuing commands
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    /// Wait for the next state change or inbound frame
    ///
    /// Returns `None` once the supervisor has shut down.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.recv().await
    }

    /// Non-blocking variant of [`next_event`](Self::next_event)
    pub fn try_next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.try_recv().ok()
    }

    /// Tear down: cancel any scheduled reconnect and close the connection
    ///
    /// Returns once the supervisor task has exited. Idempotent.
    pub async fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        // Unblock the task if it is waiting on a full event channel
        self.events.close();
        let _ = self.handle.commands.send(Command::Shutdown);

        if let Err(e) = task.await {
            warn!(error = %e, "Connection supervisor task ended abnormally");
        }
        info!("Connection supervisor shut down");
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The actor that owns the link
struct SupervisorTask<C: Connector> {
    connector: C,
    config: TransportConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<SupervisorEvent>,
    state: watch::Sender<ConnectionState>,
    link: Option<Link>,
    retry_at: Option<Instant>,
    failed_attempts: u32,
}

enum Step {
    Command(Option<Command>),
    Link(LinkEvent),
    Retry,
}

impl<C: Connector> SupervisorTask<C> {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = next_link_event(&mut self.link) => Step::Link(event),
                () = retry_timer(self.retry_at) => Step::Retry,
            };

            let keep_running = match step {
                Step::Command(command) => self.handle_command(command).await,
                Step::Link(event) => self.handle_link_event(event).await,
                Step::Retry => {
                    self.retry_at = None;
                    info!(endpoint = %self.connector.endpoint(), "Attempting to reconnect");
                    self.establish().await
                }
            };

            if !keep_running {
                break;
            }
        }

        // Teardown: drop the link (closes the socket) and forget any retry
        self.retry_at = None;
        self.link = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn handle_command(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Connect) => {
                if self.current_state() == ConnectionState::Disconnected {
                    self.retry_at = None;
                    self.failed_attempts = 0;
                    self.establish().await
                } else {
                    debug!("Connection already open; connect ignored");
                    true
                }
            }
            Some(Command::Send(payload)) => {
                let Some(link) = self.link.as_ref() else {
                    warn!("Dropping outbound payload: connection lost before write");
                    return true;
                };
                if link.outbound.send(payload).await.is_err() {
                    warn!("Connection writer gone; treating as closed");
                    return self.on_link_lost().await;
                }
                true
            }
            Some(Command::Shutdown) | None => false,
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) -> bool {
        match event {
            LinkEvent::Frame(text) => {
                debug!(bytes = text.len(), "Inbound frame");
                self.emit(SupervisorEvent::Frame(text)).await
            }
            LinkEvent::Closed(reason) => {
                info!(reason = ?reason, "Connection closed by peer");
                self.on_link_lost().await
            }
            LinkEvent::Error(e) => {
                warn!(error = %e, "Connection error");
                self.on_link_lost().await
            }
        }
    }

    /// Open a connection, staying responsive to teardown while waiting
    async fn establish(&mut self) -> bool {
        if !self.set_state(ConnectionState::Connecting).await {
            return false;
        }

        let timeout_ms = self.config.connect_timeout_ms;
        let result = {
            let attempt =
                tokio::time::timeout(self.config.connect_timeout(), self.connector.connect());
            tokio::pin!(attempt);

            loop {
                tokio::select! {
                    result = &mut attempt => break result,
                    command = self.commands.recv() => match command {
                        Some(Command::Connect) => debug!("Connection attempt already in progress"),
                        Some(Command::Send(_)) => warn!("Dropping outbound payload: still connecting"),
                        Some(Command::Shutdown) | None => return false,
                    },
                }
            }
        };

        match result.unwrap_or(Err(TransportError::Timeout(timeout_ms))) {
            Ok(link) => {
                self.link = Some(link);
                self.failed_attempts = 0;
                info!(endpoint = %self.connector.endpoint(), "Connection established");
                self.set_state(ConnectionState::Connected).await
            }
            Err(e) => {
                warn!(error = %e, "Connection attempt failed");
                self.on_attempt_failed().await
            }
        }
    }

    async fn on_attempt_failed(&mut self) -> bool {
        self.failed_attempts += 1;
        if !self.set_state(ConnectionState::Disconnected).await {
            return false;
        }
        self.schedule_retry();
        true
    }

    async fn on_link_lost(&mut self) -> bool {
        self.link = None;
        if !self.set_state(ConnectionState::Disconnected).await {
            return false;
        }
        self.schedule_retry();
        true
    }

    fn schedule_retry(&mut self) {
        let max = self.config.max_reconnect_attempts;
        if max > 0 && self.failed_attempts >= max {
            warn!(
                attempts = self.failed_attempts,
                "Giving up on reconnection; call connect to try again"
            );
            self.retry_at = None;
            return;
        }

        let delay = self.config.reconnect_delay();
        debug!(delay_ms = self.config.reconnect_delay_ms, "Reconnect scheduled");
        self.retry_at = Some(Instant::now() + delay);
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn set_state(&mut self, state: ConnectionState) -> bool {
        self.state.send_replace(state);
        self.emit(SupervisorEvent::State(state)).await
    }

    /// Returns false once nobody is listening
    async fn emit(&self, event: SupervisorEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link {
        Some(link) => link.inbound.recv().await.unwrap_or(LinkEvent::Closed(None)),
        None => pending().await,
    }
}

async fn retry_timer(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
