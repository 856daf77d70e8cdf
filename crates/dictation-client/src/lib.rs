//! dictation-client library entry point.
//!
//! # What does dictation-client do? (for beginners)
//!
//! The *client* is the phone.  Its speech recogniser produces plain
//! transcript strings; this crate gets them to a companion host on the same
//! local network, privately and in order.
//!
//! The library:
//!
//! 1. Browses the local network over multicast DNS for hosts advertising the
//!    dictation service ([`infrastructure::discovery::ServiceDirectory`]).
//! 2. Opens a WebSocket to the host the user picked and runs the pairing
//!    handshake: both sides derive the same session key from the pairing
//!    code without ever sending it.
//! 3. Seals every later message in an authenticated-encrypted envelope and
//!    streams transcript chunks through the
//!    [`application::session_manager::SessionManager`].
//! 4. Keeps the link alive with pings and tears everything down (keys
//!    included) on disconnect or on any integrity failure.
//!
//! The UI, the speech pipeline, and persistence of the device identity live
//! outside this crate.

/// Application layer: the session state machine, the client handshake, and
/// the transport traits it is written against.
pub mod application;

/// Infrastructure layer: mDNS browsing, WebSocket and in-memory links, and
/// the configuration file.
pub mod infrastructure;

pub use application::session_manager::{ConnectionState, Delivery, SessionError, SessionEvent, SessionManager};
pub use infrastructure::storage::config::ClientConfig;
