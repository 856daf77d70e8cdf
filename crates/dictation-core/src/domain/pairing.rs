//! Pairing codes.
//!
//! The host shows a short numeric code on its screen; the user types it into
//! the phone.  The code is the only shared secret the two devices start with.
//! It is never put on the wire and never stored: it exists just long enough
//! to be fed into [`crate::crypto::key_derivation::derive_session_key`].

use std::fmt;
use std::str::FromStr;

use rand::{rngs::OsRng, Rng};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum number of digits accepted in a pairing code.
pub const MIN_CODE_DIGITS: usize = 6;

/// Maximum number of digits accepted in a pairing code.
pub const MAX_CODE_DIGITS: usize = 12;

/// Why a user-entered string is not a valid pairing code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PairingCodeError {
    /// Fewer than [`MIN_CODE_DIGITS`] or more than [`MAX_CODE_DIGITS`] digits.
    #[error("pairing code must be {MIN_CODE_DIGITS}-{MAX_CODE_DIGITS} digits, got {0}")]
    InvalidLength(usize),
    /// The code contains something other than ASCII digits.
    #[error("pairing code must contain only digits")]
    NonDigit,
}

/// A validated numeric pairing code.  Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PairingCode(String);

impl PairingCode {
    /// Validates `code` and wraps it.
    ///
    /// Surrounding whitespace is trimmed because codes are typed by hand.
    ///
    /// # Errors
    ///
    /// Returns [`PairingCodeError`] if the code is too short, too long, or
    /// contains non-digit characters.
    pub fn new(code: &str) -> Result<Self, PairingCodeError> {
        let trimmed = code.trim();
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(PairingCodeError::NonDigit);
        }
        let len = trimmed.len();
        if !(MIN_CODE_DIGITS..=MAX_CODE_DIGITS).contains(&len) {
            return Err(PairingCodeError::InvalidLength(len));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generates a random code with `digits` digits using the OS RNG.
    ///
    /// `digits` is clamped to the accepted range.
    pub fn generate(digits: usize) -> Self {
        let digits = digits.clamp(MIN_CODE_DIGITS, MAX_CODE_DIGITS);
        let mut rng = OsRng;
        let code: String = (0..digits)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self(code)
    }

    /// Returns the digits for display on the host screen or for key derivation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PairingCode {
    type Err = PairingCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PairingCode(<redacted>)")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
