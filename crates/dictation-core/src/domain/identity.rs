//! Device identity and session tokens.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The stable identity of one installation of the app (phone or host).
///
/// `device_id` is opaque and never changes for the lifetime of the install;
/// it is one of the inputs to session-key derivation, so both peers must see
/// exactly the same string.  `device_name` is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Opaque stable identifier (a UUID v4 string when generated here).
    pub device_id: String,
    /// Human-readable label shown to the other side.
    pub device_name: String,
}

impl DeviceIdentity {
    /// Builds an identity from an already-persisted id and name.
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
        }
    }

    /// Generates a fresh identity with a random UUID v4 id.
    ///
    /// Call this once at install time and persist the result; generating a
    /// new identity on every launch would make every previous pairing
    /// meaningless.
    pub fn generate(device_name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), device_name)
    }
}

/// Opaque token issued by the host after a successful handshake.
///
/// Held in memory only and wiped when dropped.  `Debug` never prints the
/// value so that tokens cannot leak into logs.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a token string received from the host.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Issues a new random token (host side).
    pub fn issue() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the token value for placing on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
