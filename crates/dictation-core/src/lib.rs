//! # dictation-core
//!
//! Shared library for the dictation pairing protocol containing the wire
//! message types, the JSON frame codec, pairing-code key derivation, and the
//! authenticated-encryption transport.
//!
//! This crate is used by both the mobile client library and the companion
//! host.  It has zero dependencies on network sockets, async runtimes, or UI
//! frameworks, so every rule it enforces can be tested in isolation.
//!
//! # Architecture overview (for beginners)
//!
//! A phone running the dictation app streams transcript text to a companion
//! host on the same local network.  The network is assumed hostile (shared
//! office Wi-Fi), so the two devices first agree on a secret key from a short
//! pairing code the user reads off the host's screen, and then wrap every
//! message in an encrypted, tamper-evident envelope.
//!
//! This crate (`dictation-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Plain data types: device identities, discovered hosts,
//!   pairing codes, and session tokens.
//!
//! - **`protocol`** – The closed set of messages the two sides exchange, how
//!   they are turned into JSON frames, and the application-level sequence
//!   numbers carried by transcript chunks.
//!
//! - **`crypto`** – How a pairing code becomes a 256-bit session key, and how
//!   that key seals and opens message envelopes with per-direction nonce
//!   counters and replay protection.

pub mod crypto;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `dictation_core::SessionKey` instead of the full module path.
pub use crypto::aead::{decrypt, encrypt, NonceCounter, Opener, ReplayGuard, Sealer, SessionCipher, TransportError};
pub use crypto::key_derivation::{derive_session_key, Direction, KeyDerivationError, Role, SessionKey};
pub use domain::host::DiscoveredHost;
pub use domain::identity::{DeviceIdentity, SessionToken};
pub use domain::pairing::{PairingCode, PairingCodeError};
pub use protocol::codec::{decode_frame, decode_message, encode_frame, encode_message, CodecError, WireFrame};
pub use protocol::messages::{EncryptedEnvelope, TransportMessage};
