//! Cryptography: pairing-code key derivation and the AEAD transport.
//!
//! # Flow (for beginners)
//!
//! ```text
//! pairing code + client id + host id
//!        │  SHA-256, then HKDF-SHA256 with a fixed salt
//!        ▼
//!   SessionKey (32 bytes, identical on both peers)
//!        │  HKDF expand, one label per direction
//!        ├──────────────► client→host key ── NonceCounter (client) / ReplayGuard (host)
//!        └──────────────► host→client key ── NonceCounter (host)   / ReplayGuard (client)
//! ```
//!
//! Each direction gets its own key so that the two counters, which both
//! start at 0, can never produce the same (key, nonce) pair.

pub mod aead;
pub mod key_derivation;
