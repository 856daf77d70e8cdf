//! Domain entities for the dictation pairing protocol.
//!
//! This module contains plain data types with no infrastructure dependencies.
//!
//! # Lifetimes of the domain types (for beginners)
//!
//! - A [`identity::DeviceIdentity`] is created once per installation and
//!   outlives every session.  Persisting it is the job of the embedding
//!   application (a secure local store on the phone, a TOML file on the host).
//!
//! - A [`host::DiscoveredHost`] is ephemeral: it is rebuilt every time the
//!   local-network browse produces new results and is never persisted.
//!
//! - A [`pairing::PairingCode`] and a [`identity::SessionToken`] live for one
//!   pairing attempt at most.  Both wipe their memory when dropped.

/// Stable device identity and the per-session token issued by the host.
pub mod identity;

/// Hosts found on the local network.
pub mod host;

/// The short numeric code the user reads off the host's screen.
pub mod pairing;
