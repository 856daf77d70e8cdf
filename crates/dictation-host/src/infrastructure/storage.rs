//! Persistent host identity.
//!
//! The host's device id is an input to key derivation, so it must survive
//! restarts: a phone that paired yesterday derives today's key from the same
//! id.  The identity lives in `host.toml` under the platform config
//! directory:
//!
//! | Platform | Path                                                    |
//! |----------|---------------------------------------------------------|
//! | Windows  | `%APPDATA%\DictationHost\host.toml`                     |
//! | Linux    | `$XDG_CONFIG_HOME/dictation-host/host.toml` (or `~/.config`) |
//! | macOS    | `~/Library/Application Support/DictationHost/host.toml` |

use std::path::{Path, PathBuf};

use dictation_core::DeviceIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors from identity file operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot determine the platform config directory")]
    NoPlatformConfigDir,
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize host identity: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct HostFile {
    identity: DeviceIdentity,
}

/// Default location of `host.toml`.
///
/// # Errors
///
/// [`StorageError::NoPlatformConfigDir`] when no base directory is known.
pub fn default_identity_path() -> Result<PathBuf, StorageError> {
    platform_config_dir()
        .map(|dir| dir.join("host.toml"))
        .ok_or(StorageError::NoPlatformConfigDir)
}

/// Loads the identity at `path`, creating and saving a new one named
/// `default_name` if the file does not exist yet.
///
/// # Errors
///
/// I/O failures other than "not found", and malformed files.
pub fn load_or_create_identity(path: &Path, default_name: &str) -> Result<DeviceIdentity, StorageError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let file: HostFile = toml::from_str(&content).map_err(|source| StorageError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            Ok(file.identity)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let identity = DeviceIdentity::generate(default_name);
            save_identity(path, &identity)?;
            info!("created host identity {} at {path:?}", identity.device_id);
            Ok(identity)
        }
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `identity` to `path`, creating parent directories.
///
/// # Errors
///
/// [`StorageError::Io`] or [`StorageError::Serialize`].
pub fn save_identity(path: &Path, identity: &DeviceIdentity) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(&HostFile {
        identity: identity.clone(),
    })?;
    std::fs::write(path, text).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("DictationHost"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("dictation-host"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("DictationHost"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
