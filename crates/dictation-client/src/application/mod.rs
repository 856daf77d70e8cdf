//! Application layer for the client library.
//!
//! Nothing here opens a socket.  The session manager and the handshake are
//! written against the [`link`] traits; infrastructure supplies a WebSocket
//! implementation for production and an in-memory one for tests.
//!
//! # Sub-modules
//!
//! - **`link`** – `FrameSink`, `FrameSource`, and `Connector`: the seam
//!   between the protocol logic and whatever carries text frames.
//!
//! - **`handshake`** – The client side of the hardened pairing handshake:
//!   `hello` exchange, key derivation, and mutual key confirmation.
//!
//! - **`session_manager`** – The single-session state machine that drives
//!   connect → authenticate → stream → teardown.

pub mod handshake;
pub mod link;
pub mod session_manager;
