//! dictation-host library entry point.
//!
//! # What does dictation-host do? (for beginners)
//!
//! The *host* is the desktop companion a phone streams its transcripts to.
//! It shows a short pairing code, advertises itself on the local network,
//! and accepts WebSocket connections from phones that know the code.
//!
//! ```text
//! Phone (dictation-client)                     dictation-host
//! ────────────────────────                     ──────────────
//! mDNS browse  ───────────────────────────────► MdnsAdvertiser
//! ws://host:port/dictation ───────────────────► HostServer (accept loop)
//!   hello / authenticate (cleartext)               PairingAuthority + host handshake
//!   sealed envelopes  ◄──────────────────────────► HostSession (sequence tracking)
//!                                                  │
//!                                                  ▼
//!                                         mpsc::Receiver<HostEvent>
//! ```
//!
//! The binary (`main.rs`) wires these together and logs every [`HostEvent`];
//! a desktop UI would consume the same events instead.
//!
//! [`HostEvent`]: application::events::HostEvent

/// Domain layer: runtime configuration.
pub mod domain;

/// Application layer: pairing authority, host-side handshake, and the
/// per-connection session logic.
pub mod application;

/// Infrastructure layer: WebSocket server, mDNS advertiser, identity file.
pub mod infrastructure;

pub use application::events::HostEvent;
pub use application::pairing::{PairingAuthority, PairingError};
pub use domain::config::HostConfig;
pub use infrastructure::ws_server::HostServer;
