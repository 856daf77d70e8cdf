//! Session key derivation from a pairing code.
//!
//! # How two devices agree on a key without sending it (for beginners)
//!
//! Both peers know three things after the cleartext `hello` exchange: the
//! pairing code (typed by the user on the phone, shown on the host screen),
//! the client's device id, and the host's device id.  Each side feeds them,
//! in the same order, through the same one-way functions:
//!
//! ```text
//! ikm         = SHA-256("482913" ":" clientId ":" hostId)
//! session key = HKDF-SHA256(ikm, salt = SESSION_SALT, info = "", 32 bytes)
//! ```
//!
//! Same inputs, same output, so both ends end up with identical keys and the
//! code itself never crosses the network.  Each peer calls its own id the
//! *local* id; the [`Role`] argument puts the client's id first either way.
//!
//! From the session key, one key per traffic direction is expanded with
//! HKDF (`"client->host"` / `"host->client"`).  Both direction counters start
//! at 0, so without this split the first client frame and the first host
//! frame would be sealed under the same (key, nonce) pair.

use std::fmt;

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::pairing::PairingCode;

/// Size in bytes of every key produced by this module.
pub const KEY_LEN: usize = 32;

/// Fixed application salt for the session-key HKDF.
pub const SESSION_SALT: &[u8] = b"dictation-pairing-v1";

const CLIENT_TO_HOST_LABEL: &[u8] = b"client->host";
const HOST_TO_CLIENT_LABEL: &[u8] = b"host->client";

/// HKDF refused to produce the requested output length.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("HKDF-SHA256 cannot expand to {len} bytes")]
pub struct KeyDerivationError {
    len: usize,
}

/// Which end of the connection is deriving the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The mobile device that initiates the connection.
    Client,
    /// The companion host that accepts it.
    Host,
}

/// Direction of travel for one stream of sealed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToHost,
    HostToClient,
}

impl Direction {
    /// The direction this role sends in.
    pub fn outbound(role: Role) -> Self {
        match role {
            Role::Client => Direction::ClientToHost,
            Role::Host => Direction::HostToClient,
        }
    }

    /// The direction this role receives in.
    pub fn inbound(role: Role) -> Self {
        match role {
            Role::Client => Direction::HostToClient,
            Role::Host => Direction::ClientToHost,
        }
    }

    fn label(self) -> &'static [u8] {
        match self {
            Direction::ClientToHost => CLIENT_TO_HOST_LABEL,
            Direction::HostToClient => HOST_TO_CLIENT_LABEL,
        }
    }
}

/// 256-bit key material.  Wiped on drop; `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrows the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Expands the key used to seal frames travelling in `direction`.
    ///
    /// # Errors
    ///
    /// [`KeyDerivationError`] if HKDF rejects the output length.
    pub fn directional(&self, direction: Direction) -> Result<SessionKey, KeyDerivationError> {
        expand(&self.0, None, direction.label())
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Derives the shared session key.
///
/// `local_id` is this device's id and `remote_id` the peer's, as exchanged in
/// `hello`.  Both peers get the same key as long as each passes its own
/// [`Role`].
///
/// # Errors
///
/// [`KeyDerivationError`] if HKDF rejects the output length.
///
/// # Examples
///
/// ```rust
/// use dictation_core::{derive_session_key, PairingCode, Role};
///
/// let code = PairingCode::new("482913").unwrap();
/// let on_phone = derive_session_key(&code, "A1", "B2", Role::Client).unwrap();
/// let on_host = derive_session_key(&code, "B2", "A1", Role::Host).unwrap();
/// assert_eq!(on_phone, on_host);
/// ```
pub fn derive_session_key(
    code: &PairingCode,
    local_id: &str,
    remote_id: &str,
    role: Role,
) -> Result<SessionKey, KeyDerivationError> {
    let (client_id, host_id) = match role {
        Role::Client => (local_id, remote_id),
        Role::Host => (remote_id, local_id),
    };

    let mut hasher = Sha256::new();
    hasher.update(code.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(client_id.as_bytes());
    hasher.update(b":");
    hasher.update(host_id.as_bytes());
    let mut ikm: [u8; 32] = hasher.finalize().into();

    let key = expand(&ikm, Some(SESSION_SALT), &[]);
    ikm.zeroize();
    key
}

fn expand(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> Result<SessionKey, KeyDerivationError> {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; KEY_LEN];
    hkdf.expand(info, &mut okm).map_err(|_| KeyDerivationError { len: KEY_LEN })?;
    Ok(SessionKey(okm))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
