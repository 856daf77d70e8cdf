//! Hosts found on the local network by the service directory.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Fixed WebSocket path the host serves the protocol on.
pub const DEFAULT_PATH: &str = "/dictation";

/// mDNS service type hosts advertise and clients browse for.
pub const SERVICE_TYPE: &str = "_dictation._tcp.local.";

/// TXT property under which a host advertises its WebSocket path.
pub const PATH_TXT_KEY: &str = "path";

/// TXT property under which a host advertises its protocol version.
pub const VERSION_TXT_KEY: &str = "version";

/// A companion host advertising the dictation service on the local segment.
///
/// Identity is the network endpoint, not the display name: two machines that
/// both call themselves `"Office-Mac"` are two distinct hosts, while the same
/// endpoint advertised twice collapses into one entry.  `PartialEq` and
/// `Hash` therefore only look at [`id`](Self::id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredHost {
    /// Endpoint-derived identifier (`ip:port`).
    pub id: String,
    /// Advertised instance name, shown to the user in the picker.
    pub display_name: String,
    /// Resolved address of the host's WebSocket listener.
    pub endpoint: SocketAddr,
    /// WebSocket path advertised by the host.
    pub path: String,
}

impl DiscoveredHost {
    /// Creates a host entry whose `id` is derived from `endpoint`.
    pub fn new(display_name: impl Into<String>, endpoint: SocketAddr, path: impl Into<String>) -> Self {
        Self {
            id: endpoint.to_string(),
            display_name: display_name.into(),
            endpoint,
            path: path.into(),
        }
    }

    /// Returns the `ws://` URL the client connects to.
    ///
    /// ```rust
    /// use dictation_core::DiscoveredHost;
    ///
    /// let host = DiscoveredHost::new("Office-Mac", "192.168.1.20:7040".parse().unwrap(), "/dictation");
    /// assert_eq!(host.websocket_url(), "ws://192.168.1.20:7040/dictation");
    /// ```
    pub fn websocket_url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("ws://{}/{}", self.endpoint, path)
    }
}

impl PartialEq for DiscoveredHost {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DiscoveredHost {}

impl Hash for DiscoveredHost {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
