//! Client Configuration
//!
//! Layered configuration for a session client, read from
//! `$XDG_CONFIG_HOME/gm-session/client.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`GM_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8000"
//! ws_url = "ws://localhost:8000/ws"
//! request_timeout_secs = 30
//!
//! [connection]
//! connect_timeout_ms = 5000
//! reconnect_delay_ms = 5000
//! max_reconnect_attempts = 0   # 0 = retry forever
//!
//! [session]
//! resync_after_turn = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::config::TransportConfig;

/// Default base URL of the REST endpoints
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default per-request timeout for the REST endpoints
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the configuration's highest-priority values came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Base URL of the REST endpoints
    pub base_url: Option<String>,

    /// WebSocket URL of the duplex endpoint
    pub ws_url: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// `[connection]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionToml {
    /// Connection attempt timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Delay before reconnecting in milliseconds
    pub reconnect_delay_ms: Option<u64>,

    /// Consecutive failures before giving up (0 = never)
    pub max_reconnect_attempts: Option<u32>,
}

/// `[session]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Reload the transcript after every completed turn
    pub resync_after_turn: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server endpoints
    pub server: ServerToml,

    /// Connection recovery
    pub connection: ConnectionToml,

    /// Session behaviour
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the REST endpoints
    pub base_url: String,

    /// Per-request timeout for the REST endpoints
    pub request_timeout: Duration,

    /// Duplex connection settings
    pub transport: TransportConfig,

    /// Reload the transcript after every completed turn
    pub resync_after_turn: bool,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transport: TransportConfig::default(),
            resync_after_turn: true,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check the values make sense together
    ///
    /// # Errors
    ///
    /// `ValidationError` naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.base_url must not be empty".to_string(),
            ));
        }

        let ws_url = self.transport.ws_url.trim();
        if ws_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.ws_url must not be empty".to_string(),
            ));
        }
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "server.ws_url must start with ws:// or wss:// (got {ws_url})"
            )));
        }

        if self.transport.reconnect_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connection.reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/gm-session/client.toml` or
/// `~/.config/gm-session/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gm-session").join("client.toml"))
}

/// Load configuration from the default file and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_config = read_toml(config_path)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

fn read_toml(path: &Path) -> Result<ClientToml, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.server.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ref url) = toml.server.ws_url {
        config.transport.ws_url.clone_from(url);
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(timeout) = toml.connection.connect_timeout_ms {
        config.transport.connect_timeout_ms = timeout;
    }
    if let Some(delay) = toml.connection.reconnect_delay_ms {
        config.transport.reconnect_delay_ms = delay;
    }
    if let Some(attempts) = toml.connection.max_reconnect_attempts {
        config.transport.max_reconnect_attempts = attempts;
    }

    if let Some(resync) = toml.session.resync_after_turn {
        config.resync_after_turn = resync;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ClientConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("GM_SERVER_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("GM_WS_URL") {
        config.transport.ws_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("GM_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("GM_CONNECT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.transport.connect_timeout_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env("GM_RECONNECT_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.transport.reconnect_delay_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env("GM_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
        config.transport.max_reconnect_attempts = n;
        config.source = ConfigSource::Env;
    }
    if let Some(resync) = env("GM_RESYNC_AFTER_TURN") {
        config.resync_after_turn = resync != "0" && resync.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// WebSocket URL override
    pub ws_url: Option<String>,

    /// Reconnect delay override (milliseconds)
    pub reconnect_delay_ms: Option<u64>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set WebSocket URL override
    #[must_use]
    pub fn with_ws_url(mut self, url: String) -> Self {
        self.ws_url = Some(url);
        self
    }

    /// Set reconnect delay override
    #[must_use]
    pub fn with_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = Some(ms);
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.base_url.is_some()
            || self.ws_url.is_some()
            || self.reconnect_delay_ms.is_some()
            || self.connect_timeout_ms.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(ref url) = self.ws_url {
            config.transport.ws_url.clone_from(url);
        }
        if let Some(ms) = self.reconnect_delay_ms {
            config.transport.reconnect_delay_ms = ms;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.transport.connect_timeout_ms = ms;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
