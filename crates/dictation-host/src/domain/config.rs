//! Host configuration.
//!
//! [`HostConfig`] is a plain struct: the binary fills it from CLI arguments
//! (see `main.rs`), tests build it directly.  Nothing in here reads the
//! environment.

use std::net::SocketAddr;
use std::time::Duration;

use dictation_core::domain::host::DEFAULT_PATH;

/// All runtime settings of the host server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Address the WebSocket listener binds to.  Port 0 picks a free port.
    pub bind_addr: SocketAddr,

    /// WebSocket path; upgrade requests for any other path get HTTP 404.
    pub path: String,

    /// Name advertised over mDNS and sent in the host's `hello`.
    pub display_name: String,

    /// How often the host pings an authenticated phone.
    pub ping_interval: Duration,

    /// Upper bound on the whole pairing handshake of one connection.
    pub handshake_timeout: Duration,

    /// Capacity of the [`HostEvent`](crate::HostEvent) channel.
    pub event_buffer: usize,
}

impl Default for HostConfig {
    /// | Field             | Default          |
    /// |-------------------|------------------|
    /// | bind_addr         | `0.0.0.0:7040`   |
    /// | path              | `/dictation`     |
    /// | display_name      | `Dictation Host` |
    /// | ping_interval     | 10 seconds       |
    /// | handshake_timeout | 5 seconds        |
    /// | event_buffer      | 256              |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7040)),
            path: DEFAULT_PATH.to_string(),
            display_name: "Dictation Host".to_string(),
            ping_interval: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            event_buffer: 256,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_serves_fixed_path_on_all_interfaces() {
        let cfg = HostConfig::default();
        assert_eq!(cfg.path, "/dictation");
        assert!(cfg.bind_addr.ip().is_unspecified());
        assert_eq!(cfg.bind_addr.port(), 7040);
    }

    #[test]
    fn test_default_handshake_timeout_is_five_seconds() {
        assert_eq!(HostConfig::default().handshake_timeout, Duration::from_secs(5));
    }
}
