//! Multicast DNS browse backend built on `mdns-sd`.

use dictation_core::domain::host::{PATH_TXT_KEY, VERSION_TXT_KEY};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::directory::{BrowseEvent, ResolvedService};
use super::{BrowseBackend, DiscoveryError};

/// Buffer between the daemon's receiver and the directory task.
const EVENT_BUFFER: usize = 64;

/// Browses through an `mdns-sd` daemon running on its own thread.
pub struct MdnsBackend {
    daemon: ServiceDaemon,
}

impl MdnsBackend {
    /// Starts the mDNS daemon.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Daemon`] if the daemon's sockets cannot be opened.
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        Ok(Self { daemon })
    }
}

impl BrowseBackend for MdnsBackend {
    fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<BrowseEvent>, DiscoveryError> {
        let receiver = self.daemon.browse(service_type).map_err(|e| DiscoveryError::Browse {
            service_type: service_type.to_string(),
            reason: e.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let service_type = service_type.to_string();
        tokio::spawn(async move {
            loop {
                let event = match receiver.recv_async().await {
                    Ok(event) => event,
                    Err(e) => {
                        let _ = tx.send(BrowseEvent::Failed(e.to_string())).await;
                        break;
                    }
                };
                let translated = match event {
                    ServiceEvent::ServiceResolved(info) => {
                        BrowseEvent::Resolved(resolved_service(&info, &service_type))
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => BrowseEvent::Removed { instance: fullname },
                    ServiceEvent::SearchStopped(_) => break,
                    other => {
                        debug!("mDNS: {other:?}");
                        continue;
                    }
                };
                if tx.send(translated).await.is_err() {
                    break;
                }
            }
            debug!("mDNS browse for {service_type} ended");
        });
        Ok(rx)
    }

    fn stop_browse(&self, service_type: &str) {
        if let Err(e) = self.daemon.stop_browse(service_type) {
            warn!("failed to stop mDNS browse for {service_type}: {e}");
        }
    }
}

impl Drop for MdnsBackend {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon shutdown: {e}");
        }
    }
}

fn resolved_service(info: &ServiceInfo, service_type: &str) -> ResolvedService {
    let fullname = info.get_fullname();
    ResolvedService {
        instance: fullname.to_string(),
        display_name: instance_label(fullname, service_type),
        addresses: info.get_addresses().iter().copied().collect(),
        port: info.get_port(),
        path: info.get_property_val_str(PATH_TXT_KEY).map(str::to_string),
        version: info.get_property_val_str(VERSION_TXT_KEY).map(str::to_string),
    }
}

/// `Office-Mac._dictation._tcp.local.` → `Office-Mac`.
fn instance_label(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
        .to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_label_strips_service_type() {
        assert_eq!(
            instance_label("Office-Mac._dictation._tcp.local.", "_dictation._tcp.local."),
            "Office-Mac"
        );
    }

    #[test]
    fn test_instance_label_keeps_dots_inside_the_name() {
        assert_eq!(
            instance_label("Jo's M1.lan._dictation._tcp.local.", "_dictation._tcp.local."),
            "Jo's M1.lan"
        );
    }

    #[test]
    fn test_instance_label_falls_back_to_full_name() {
        assert_eq!(instance_label("weird-record", "_dictation._tcp.local."), "weird-record");
    }
}
