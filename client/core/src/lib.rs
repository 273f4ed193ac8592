//! GM Session Core - Headless Real-Time Session Client
//!
//! Client side of a turn-based conversation with a remote game master: one
//! persistent duplex connection that recovers after failure, an incremental
//! reply stream folded into discrete turns, and a local transcript kept
//! consistent with the peer's ids across edit, delete and regenerate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Front end (gm-chat, ...)                  │
//! └───────────────┬──────────────────────────────▲───────────────┘
//!                 │ send / edit / delete / regen │ SessionEvent
//! ┌───────────────▼──────────────────────────────┴───────────────┐
//! │                         ChatSession                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                    TurnController                      │  │
//! │  │  ┌────────────┐  ┌─────────────────┐  ┌─────────────┐  │  │
//! │  │  │ Transcript │◀─│ StreamReconciler│  │GameMasterApi│──┼──┼──▶ REST
//! │  │  └────────────┘  └─────────────────┘  └─────────────┘  │  │
//! │  └─────────────────────────┬──────────────────────────────┘  │
//! │                            │ ConnectionHandle                │
//! │  ┌─────────────────────────▼──────────────────────────────┐  │
//! │  │        ConnectionSupervisor (owns the one Link)        │──┼──▶ WebSocket
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatSession`]: one conversation; owns everything below, `dispose` tears down
//! - [`TurnController`]: send, edit, delete, regenerate
//! - [`StreamReconciler`]: `chunk` / `end` frames into transcript turns
//! - [`Transcript`]: ordered conversation log
//! - [`ConnectionSupervisor`]: connect, detect failure, reconnect after a fixed delay
//!
//! # Quick Start
//!
//! ```ignore
//! use gm_session_core::{config, ChatSession, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     let mut session = ChatSession::from_config(&config)?;
//!     session.start().await;
//!
//!     session.send("I look around the tavern")?;
//!     while let Some(event) = session.next_event().await {
//!         match event {
//!             SessionEvent::Fragment { text, .. } => print!("{text}"),
//!             SessionEvent::TurnCompleted { .. } => break,
//!             _ => {}
//!         }
//!     }
//!
//!     session.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`messages`]: data model and wire frames
//! - [`transport`]: connectors and the connection supervisor
//! - [`transcript`]: the transcript store
//! - [`reconciler`]: the stream reconciler
//! - [`api`]: request/response collaborators
//! - [`controller`]: the turn controller
//! - [`session`]: the session object
//! - [`config`]: layered configuration
//! - [`error`]: error taxonomy
//!
//! # No UI Dependencies
//!
//! Rendering is left to the front end; this crate only emits
//! [`SessionEvent`]s.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod messages;
pub mod reconciler;
pub mod session;
pub mod transcript;
pub mod transport;

pub use api::{ApiError, GameMasterApi, HttpApi};
pub use config::{ClientConfig, ConfigError, ConfigOverrides, ConfigSource};
pub use controller::{IgnoreReason, RegenerateOutcome, SendOutcome, TurnController};
pub use error::SessionError;
pub use messages::{FieldMap, InboundFrame, Message, MessageId, OutboundFrame, Role};
pub use reconciler::{ReconcileOutcome, StreamReconciler, TurnState};
pub use session::{ChatSession, SessionEvent};
pub use transcript::{Transcript, TranscriptError};
pub use transport::{
    ConnectionHandle, ConnectionState, ConnectionSupervisor, Connector, InProcessConnector,
    TransportConfig, TransportError,
};

#[cfg(feature = "websocket")]
pub use transport::WebSocketConnector;
