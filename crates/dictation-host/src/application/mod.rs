//! Application layer of the host.
//!
//! Everything here is transport-agnostic: the WebSocket server feeds decoded
//! messages in and writes the replies these modules produce.

/// Events reported to the host UI.
pub mod events;

/// Host side of the pairing handshake.
pub mod handshake;

/// Pairing code ownership and per-peer lockout.
pub mod pairing;

/// Post-handshake message handling for one connection.
pub mod session;
