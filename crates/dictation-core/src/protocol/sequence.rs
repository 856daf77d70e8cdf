//! Application-level sequence numbers for transcript chunks.
//!
//! # Two counters, two jobs (for beginners)
//!
//! Every sealed frame already carries a *transport nonce* (see
//! [`crate::crypto::aead`]).  That counter exists for cryptographic reasons:
//! a nonce must never repeat under one key.  It counts every frame,
//! including pings and acks, and it never resets during a session.
//!
//! The *application sequence number* in this module has a different job:
//! it numbers the transcript chunks inside one transcription session
//! (between `sessionStart` and `sessionEnd`), starting at 1.  The host uses
//! it to spot a chunk that went missing between the speech recogniser and
//! the network layer, a failure the transport nonce cannot see.
//!
//! Keeping the two separate means a change in retry or keepalive policy can
//! never accidentally affect nonce uniqueness.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sender-side counter for `transcriptChunk` sequence numbers.
///
/// The counter starts at 0; the first call to [`next`](Self::next) returns 1.
/// [`reset`](Self::reset) is called on every `sessionStart`.
///
/// # Examples
///
/// ```rust
/// use dictation_core::protocol::sequence::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// counter.reset();
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Advances the counter and returns the new value.
    ///
    /// `Ordering::Relaxed` is enough: the value orders chunks, it does not
    /// publish any other memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the last value handed out (0 if none since the last reset).
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Resets the counter to 0 for a new transcription session.
    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of checking one received sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly the number that was expected.
    InOrder,
    /// One or more chunks were skipped.  `received` becomes the new baseline.
    Gap { expected: u64, received: u64 },
    /// A number at or below the last one seen (duplicate or reordered).
    Stale { last: u64, received: u64 },
}

/// Receiver-side gap detector (host).
///
/// Gaps are reported, never repaired: re-sending a partial transcript could
/// duplicate text on the host, so recovery is left to the user.
#[derive(Debug, Default, Clone)]
pub struct SequenceTracker {
    last: u64,
}

impl SequenceTracker {
    /// Creates a tracker expecting sequence number 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new transcription session; the next expected number is 1.
    pub fn reset(&mut self) {
        self.last = 0;
    }

    /// The next sequence number the tracker expects.
    pub fn expected(&self) -> u64 {
        self.last.wrapping_add(1)
    }

    /// Classifies `received` and advances the baseline when it moved forward.
    pub fn observe(&mut self, received: u64) -> SequenceCheck {
        let expected = self.expected();
        if received == expected {
            self.last = received;
            SequenceCheck::InOrder
        } else if received > expected {
            self.last = received;
            SequenceCheck::Gap { expected, received }
        } else {
            SequenceCheck::Stale {
                last: self.last,
                received,
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
