//! Transport Layer
//!
//! Everything between the session and the peer's duplex endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  commands   ┌─────────────────────┐  Link   ┌──────┐
//! │ ConnectionHandle │ ──────────▶ │ ConnectionSupervisor│ ◀─────▶ │ Peer │
//! └──────────────────┘             │   (actor task)      │         └──────┘
//!          ▲                       └─────────────────────┘
//!          │ state (watch)                   │
//!          └─────────────────────────────────┤ SupervisorEvent (in order)
//!                                            ▼
//!                                       ChatSession
//! ```
//!
//! # Connectors
//!
//! - [`websocket`]: the live peer over `ws://` / `wss://` (feature `websocket`)
//! - [`in_process`]: scripted peer over channels
//!
//! A [`Connector`] only opens connections. Recovery, state and ordering are
//! the supervisor's job, so every connector gets identical reconnect
//! behaviour.

pub mod config;
pub mod in_process;
pub mod supervisor;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use config::TransportConfig;
pub use in_process::{InProcessConnector, PeerAcceptor, PeerLink};
pub use supervisor::{ConnectionHandle, ConnectionState, ConnectionSupervisor, SupervisorEvent};
pub use traits::{Connector, Link, LinkEvent, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
