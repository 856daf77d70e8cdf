//! TOML-based configuration for the client library.
//!
//! The embedding application decides where the file lives (on a phone that
//! is usually the app's private data directory) and passes the path in.
//!
//! ```toml
//! service_type = "_dictation._tcp.local."
//! handshake_timeout_ms = 5000
//! ping_interval_secs = 10
//! ping_timeout_secs = 30
//! event_buffer = 64
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so an empty file, a
//! missing file, and a file written by an older version all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dictation_core::domain::host::SERVICE_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// mDNS service type browsed for and advertised by hosts.
pub const DEFAULT_SERVICE_TYPE: &str = SERVICE_TYPE;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Client tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// mDNS service type to browse for.
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Upper bound on connect + handshake, in milliseconds.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// How often a keepalive `ping` is sent while connected.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Silence after which the session is considered lost.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    /// Capacity of the session event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_ping_interval_secs() -> u64 {
    10
}
fn default_ping_timeout_secs() -> u64 {
    30
}
fn default_event_buffer() -> usize {
    64
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            ping_interval_secs: default_ping_interval_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ClientConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs.max(1))
    }
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
