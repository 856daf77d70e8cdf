//! Advertises the host on the local network over multicast DNS.
//!
//! Phones browse for [`SERVICE_TYPE`]; each registration carries the
//! WebSocket path in a `path` TXT property so a host can serve on a
//! non-default path without clients guessing, and the protocol version in a
//! `version` property so clients can skip hosts they cannot talk to.

use std::collections::HashMap;

use dictation_core::domain::host::{PATH_TXT_KEY, SERVICE_TYPE, VERSION_TXT_KEY};
use dictation_core::protocol::messages::PROTOCOL_VERSION;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while registering the advertisement.
#[derive(Debug, Error)]
pub enum AdvertiseError {
    #[error("failed to start mDNS daemon: {0}")]
    Daemon(String),
    #[error("invalid service record for {instance}: {reason}")]
    Record { instance: String, reason: String },
    #[error("failed to register {instance}: {reason}")]
    Register { instance: String, reason: String },
}

/// A live mDNS registration.  Dropping it unregisters the service.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsAdvertiser {
    /// Registers `instance_name` under the dictation service type.
    ///
    /// # Errors
    ///
    /// See [`AdvertiseError`].
    pub fn register(instance_name: &str, port: u16, path: &str) -> Result<Self, AdvertiseError> {
        Self::register_as(SERVICE_TYPE, instance_name, port, path)
    }

    /// Registers under an explicit service type.
    ///
    /// # Errors
    ///
    /// See [`AdvertiseError`].
    pub fn register_as(
        service_type: &str,
        instance_name: &str,
        port: u16,
        path: &str,
    ) -> Result<Self, AdvertiseError> {
        let daemon = ServiceDaemon::new().map_err(|e| AdvertiseError::Daemon(e.to_string()))?;

        let host_name = format!("{}.local.", mdns_host_label(instance_name));
        let properties = txt_properties(path);
        let info = ServiceInfo::new(service_type, instance_name, &host_name, "", port, properties)
            .map_err(|e| AdvertiseError::Record {
                instance: instance_name.to_string(),
                reason: e.to_string(),
            })?
            .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        daemon.register(info).map_err(|e| AdvertiseError::Register {
            instance: instance_name.to_string(),
            reason: e.to_string(),
        })?;

        info!("advertising {fullname} on port {port} (path {path})");
        Ok(Self { daemon, fullname })
    }

    /// Full instance name, e.g. `Office-Mac._dictation._tcp.local.`.
    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("failed to unregister {}: {e}", self.fullname);
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon shutdown: {e}");
        }
    }
}

/// TXT properties published with every registration.
fn txt_properties(path: &str) -> HashMap<String, String> {
    HashMap::from([
        (PATH_TXT_KEY.to_string(), path.to_string()),
        (VERSION_TXT_KEY.to_string(), PROTOCOL_VERSION.to_string()),
    ])
}

/// Turns a display name into a DNS host label: ASCII alphanumerics and `-`
/// only, never empty.
fn mdns_host_label(display_name: &str) -> String {
    let label: String = display_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string();
    if label.is_empty() {
        "dictation-host".to_string()
    } else {
        label
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
