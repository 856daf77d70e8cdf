//! The candidate set built from browse events.
//!
//! Browse events name *service instances*; the UI wants *hosts*.  The two
//! differ when one machine is advertised twice (a stale record that has not
//! expired yet, or two network interfaces answering with the same address),
//! so [`HostDirectory`] keeps instances internally and collapses them by
//! endpoint when it produces the host list.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};

use dictation_core::domain::host::DEFAULT_PATH;
use dictation_core::protocol::messages::PROTOCOL_VERSION;
use dictation_core::DiscoveredHost;
use tracing::debug;

/// A resolved advertisement, as reported by a browse backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Full instance name, unique per advertisement
    /// (e.g. `Office-Mac._dictation._tcp.local.`).
    pub instance: String,
    /// Human-readable instance label (e.g. `Office-Mac`).
    pub display_name: String,
    /// Every address the instance resolved to.
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    /// WebSocket path from the `path` TXT property, if advertised.
    pub path: Option<String>,
    /// Protocol version from the `version` TXT property, if advertised.
    pub version: Option<String>,
}

impl ResolvedService {
    /// Picks the one endpoint the client will connect to.
    ///
    /// IPv4 is preferred (link-local IPv6 needs a scope id the URL cannot
    /// carry); ties go to the lowest address so the choice is stable across
    /// repeated resolutions.
    pub fn preferred_endpoint(&self) -> Option<SocketAddr> {
        let v4 = self.addresses.iter().filter(|ip| ip.is_ipv4()).min();
        let any = self.addresses.iter().min();
        v4.or(any).map(|ip| SocketAddr::new(*ip, self.port))
    }

    /// `false` when the host advertises a protocol version other than ours.
    /// A record without a `version` property is assumed compatible.
    pub fn speaks_our_protocol(&self) -> bool {
        match &self.version {
            None => true,
            Some(v) => v.trim().parse::<u8>() == Ok(PROTOCOL_VERSION),
        }
    }

    fn to_host(&self) -> Option<DiscoveredHost> {
        if !self.speaks_our_protocol() {
            debug!("skipping {}: protocol version {:?}", self.instance, self.version);
            return None;
        }
        let endpoint = self.preferred_endpoint()?;
        let path = self.path.clone().unwrap_or_else(|| DEFAULT_PATH.to_string());
        Some(DiscoveredHost::new(self.display_name.clone(), endpoint, path))
    }
}

/// Browse output, one event at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    /// An instance appeared or its record changed.
    Resolved(ResolvedService),
    /// An instance went away.
    Removed { instance: String },
    /// The browse itself failed; no further events follow.
    Failed(String),
}

/// In-memory set of discovered hosts keyed by advertisement.
#[derive(Debug, Default)]
pub struct HostDirectory {
    instances: HashMap<String, DiscoveredHost>,
}

impl HostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one browse event.  Returns `true` if the host list changed.
    pub fn apply(&mut self, event: &BrowseEvent) -> bool {
        let before = self.hosts();
        match event {
            BrowseEvent::Resolved(service) => match service.to_host() {
                Some(host) => {
                    self.instances.insert(service.instance.clone(), host);
                }
                None => {
                    self.instances.remove(&service.instance);
                }
            },
            BrowseEvent::Removed { instance } => {
                self.instances.remove(instance);
            }
            BrowseEvent::Failed(_) => self.instances.clear(),
        }
        !same_hosts(&before, &self.hosts())
    }

    /// Current hosts, one per endpoint, sorted by display name then id.
    pub fn hosts(&self) -> Vec<DiscoveredHost> {
        let mut seen = HashSet::new();
        let mut hosts: Vec<DiscoveredHost> = self
            .instances
            .values()
            .filter(|host| seen.insert(host.id.clone()))
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        hosts
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }
}

/// Host lists compare by id only through `PartialEq`; a rename or a path
/// change still has to be published.
fn same_hosts(a: &[DiscoveredHost], b: &[DiscoveredHost]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.id == y.id && x.display_name == y.display_name && x.path == y.path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
