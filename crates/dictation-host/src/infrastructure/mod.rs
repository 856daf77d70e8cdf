//! Infrastructure layer of the host: everything that touches the network or
//! the file system.

/// mDNS service registration.
pub mod advertiser;

/// Persistent host identity (`host.toml`).
pub mod storage;

/// WebSocket accept loop and per-connection tasks.
pub mod ws_server;
