//! Authenticated-encrypted transport envelopes (ChaCha20-Poly1305).
//!
//! # Sealing a frame (for beginners)
//!
//! ```text
//! TransportMessage ──encode_message──► plaintext JSON bytes
//!                                        │
//!      NonceCounter.reserve() = n ──────►│ ChaCha20-Poly1305
//!      nonce = 0000_0000 ‖ n (BE)        │   key  = direction key
//!      aad   = "dictation-envelope-v1" ‖ n (BE)
//!                                        ▼
//!                    EncryptedEnvelope { nonce: n, ciphertext, tag }
//! ```
//!
//! The nonce is sent in the clear (the receiver needs it) but is also mixed
//! into the associated data, so a frame whose `nonce` field was edited fails
//! authentication just like a frame whose ciphertext was edited.
//!
//! Opening runs the same steps in reverse, guarded by a [`ReplayGuard`]:
//! a nonce below the guard's floor is a replay, one more than
//! [`REORDER_WINDOW`] above it is rejected as out of window.  Every error in
//! [`TransportError`] is meant to end the session.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use thiserror::Error;

use crate::crypto::key_derivation::{Direction, KeyDerivationError, Role, SessionKey};
use crate::protocol::codec::{decode_message, encode_message, CodecError};
use crate::protocol::messages::{EncryptedEnvelope, TransportMessage, TAG_SIZE};

/// ChaCha20-Poly1305 nonce width in bytes.
pub const NONCE_LEN: usize = 12;

/// How far ahead of the expected nonce a received frame may be.
pub const REORDER_WINDOW: u64 = 16;

const AAD_LABEL: &[u8] = b"dictation-envelope-v1";

/// Errors raised while sealing or opening envelopes.
///
/// The `Display` text is for logs only; peers and users are told no more
/// than "connection lost".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The tag did not verify: wrong key, or the frame was modified.
    #[error("envelope failed authentication")]
    AuthenticationFailed,

    /// The nonce was already consumed in this direction.
    #[error("replayed nonce {nonce} (expected at least {expected})")]
    Replay { nonce: u64, expected: u64 },

    /// The nonce jumped further ahead than [`REORDER_WINDOW`] allows.
    #[error("nonce {nonce} outside reorder window (expected {expected})")]
    OutOfWindow { nonce: u64, expected: u64 },

    /// The 64-bit counter for this direction is used up; re-pair.
    #[error("nonce counter exhausted")]
    CounterExhausted,

    /// The envelope's fields have the wrong shape.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The plaintext was not a valid message, or could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A direction key could not be expanded.
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
}

// ── Counters ──────────────────────────────────────────────────────────────────

/// Send-side nonce counter for one direction.
///
/// Starts at 0 and hands out each value exactly once.  It never wraps: after
/// `u64::MAX` has been used, [`reserve`](Self::reserve) fails with
/// [`TransportError::CounterExhausted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceCounter {
    next: Option<u64>,
}

impl NonceCounter {
    /// Creates a counter whose first nonce is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a counter whose first nonce is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: Some(first) }
    }

    /// The nonce the next [`reserve`](Self::reserve) will return, if any.
    pub fn peek(&self) -> Option<u64> {
        self.next
    }

    /// Takes the next nonce and advances the counter.
    pub fn reserve(&mut self) -> Result<u64, TransportError> {
        let current = self.next.ok_or(TransportError::CounterExhausted)?;
        self.next = current.checked_add(1);
        Ok(current)
    }
}

impl Default for NonceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive-side nonce floor for one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayGuard {
    expected: Option<u64>,
}

impl ReplayGuard {
    /// Creates a guard expecting nonce 0.
    pub fn new() -> Self {
        Self { expected: Some(0) }
    }

    /// The lowest nonce still acceptable, or `None` once `u64::MAX` was seen.
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// Checks `nonce` against the floor and window without consuming it.
    pub fn check(&self, nonce: u64) -> Result<(), TransportError> {
        let Some(expected) = self.expected else {
            return Err(TransportError::CounterExhausted);
        };
        if nonce < expected {
            return Err(TransportError::Replay { nonce, expected });
        }
        if nonce - expected > REORDER_WINDOW {
            return Err(TransportError::OutOfWindow { nonce, expected });
        }
        Ok(())
    }

    /// Consumes `nonce`; every nonce at or below it is now a replay.
    fn accept(&mut self, nonce: u64) {
        self.expected = nonce.checked_add(1);
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

// ── Seal / open ───────────────────────────────────────────────────────────────

fn nonce_bytes(counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

fn associated_data(counter: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_LABEL.len() + 8);
    aad.extend_from_slice(AAD_LABEL);
    aad.extend_from_slice(&counter.to_be_bytes());
    aad
}

/// Serializes `msg` and seals it under `key` with the next nonce from
/// `counter`.
///
/// The counter only advances once serialization has succeeded, so a message
/// that cannot be encoded does not burn a nonce.
///
/// # Errors
///
/// [`TransportError::Codec`] if the message cannot be serialized and
/// [`TransportError::CounterExhausted`] if the counter is used up.
pub fn encrypt(
    msg: &TransportMessage,
    key: &SessionKey,
    counter: &mut NonceCounter,
) -> Result<EncryptedEnvelope, TransportError> {
    let mut buffer = encode_message(msg)?;
    let nonce = counter.reserve()?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes(nonce)), &associated_data(nonce), &mut buffer)
        .map_err(|_| TransportError::MalformedEnvelope("plaintext too long to seal".to_string()))?;

    Ok(EncryptedEnvelope {
        nonce,
        ciphertext: buffer,
        tag: tag.to_vec(),
    })
}

/// Opens `envelope` under `key`, enforcing the nonce floor in `guard`.
///
/// The guard only moves forward after the tag has verified, so a forged
/// frame cannot push the floor ahead and lock out genuine traffic.
///
/// # Errors
///
/// Fails closed on a replayed or out-of-window nonce, a wrong-length tag, a
/// tag mismatch, or plaintext that is not a valid message.
pub fn decrypt(
    envelope: &EncryptedEnvelope,
    key: &SessionKey,
    guard: &mut ReplayGuard,
) -> Result<TransportMessage, TransportError> {
    guard.check(envelope.nonce)?;

    if envelope.tag.len() != TAG_SIZE {
        return Err(TransportError::MalformedEnvelope(format!(
            "tag is {} bytes, expected {TAG_SIZE}",
            envelope.tag.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let mut buffer = envelope.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&nonce_bytes(envelope.nonce)),
            &associated_data(envelope.nonce),
            &mut buffer,
            Tag::from_slice(&envelope.tag),
        )
        .map_err(|_| TransportError::AuthenticationFailed)?;

    guard.accept(envelope.nonce);
    Ok(decode_message(&buffer)?)
}

// ── Per-direction halves ──────────────────────────────────────────────────────

/// Outbound half: the send-direction key and its counter.
#[derive(Debug)]
pub struct Sealer {
    key: SessionKey,
    counter: NonceCounter,
}

impl Sealer {
    /// Seals `msg` with the next outbound nonce.
    pub fn seal(&mut self, msg: &TransportMessage) -> Result<EncryptedEnvelope, TransportError> {
        encrypt(msg, &self.key, &mut self.counter)
    }

    /// The nonce the next sealed frame will carry.
    pub fn next_nonce(&self) -> Option<u64> {
        self.counter.peek()
    }
}

/// Inbound half: the receive-direction key and its replay guard.
#[derive(Debug)]
pub struct Opener {
    key: SessionKey,
    guard: ReplayGuard,
}

impl Opener {
    /// Opens an inbound envelope.
    pub fn open(&mut self, envelope: &EncryptedEnvelope) -> Result<TransportMessage, TransportError> {
        decrypt(envelope, &self.key, &mut self.guard)
    }

    /// The lowest inbound nonce still acceptable.
    pub fn expected_nonce(&self) -> Option<u64> {
        self.guard.expected()
    }
}

/// Both directions of one authenticated session, as seen from one peer.
///
/// Built from the shared [`SessionKey`] and the local [`Role`]: the client's
/// sealer and the host's opener use the client→host key, and vice versa.
#[derive(Debug)]
pub struct SessionCipher {
    sealer: Sealer,
    opener: Opener,
}

impl SessionCipher {
    /// Expands the direction keys for `role` with fresh counters.
    ///
    /// # Errors
    ///
    /// [`TransportError::KeyDerivation`] if a direction key cannot be
    /// expanded.
    pub fn new(key: &SessionKey, role: Role) -> Result<Self, TransportError> {
        Ok(Self {
            sealer: Sealer {
                key: key.directional(Direction::outbound(role))?,
                counter: NonceCounter::new(),
            },
            opener: Opener {
                key: key.directional(Direction::inbound(role))?,
                guard: ReplayGuard::new(),
            },
        })
    }

    /// Seals an outbound message.
    pub fn seal(&mut self, msg: &TransportMessage) -> Result<EncryptedEnvelope, TransportError> {
        self.sealer.seal(msg)
    }

    /// Opens an inbound envelope.
    pub fn open(&mut self, envelope: &EncryptedEnvelope) -> Result<TransportMessage, TransportError> {
        self.opener.open(envelope)
    }

    /// Splits into independently owned halves for a writer and a reader task.
    pub fn split(self) -> (Sealer, Opener) {
        (self.sealer, self.opener)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
