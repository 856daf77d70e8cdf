//! PairingAuthority: owns the pairing code and throttles guessing.
//!
//! The host generates one numeric code at startup and shows it to the user.
//! A phone proves knowledge of the code during the handshake; the authority
//! only keeps score.  Every failed proof counts against the peer's IP
//! address, and the third failure locks that address out for a minute.  A
//! locked-out peer is refused before its proof is even opened.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use dictation_core::domain::pairing::MIN_CODE_DIGITS;
use dictation_core::{PairingCode, SessionToken};
use thiserror::Error;
use tracing::{info, warn};

/// Failed proofs allowed per IP before lockout.
pub const MAX_ATTEMPTS: u8 = 3;

/// How long a peer stays locked out.
pub const LOCKOUT_DURATION: Duration = Duration::from_secs(60);

/// Why a pairing attempt was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("invalid pairing code; {attempts_remaining} attempt(s) remaining")]
    WrongCode { attempts_remaining: u8 },
    #[error("too many failed attempts; try again in {seconds_remaining}s")]
    LockedOut { seconds_remaining: u64 },
}

#[derive(Debug, Default)]
struct FailureEntry {
    failed_attempts: u8,
    locked_until: Option<Instant>,
}

/// The pairing code and the per-IP failure ledger.
#[derive(Debug)]
pub struct PairingAuthority {
    code: PairingCode,
    failures: HashMap<IpAddr, FailureEntry>,
}

impl PairingAuthority {
    /// Creates an authority with a fresh random 6-digit code.
    pub fn new() -> Self {
        Self::with_code(PairingCode::generate(MIN_CODE_DIGITS))
    }

    /// Creates an authority for a known code.
    pub fn with_code(code: PairingCode) -> Self {
        Self {
            code,
            failures: HashMap::new(),
        }
    }

    /// The code to show to the user.
    pub fn code(&self) -> &PairingCode {
        &self.code
    }

    /// Checks whether `peer` may attempt pairing now.
    ///
    /// # Errors
    ///
    /// [`PairingError::LockedOut`] while the peer's lockout is running.
    pub fn check(&mut self, peer: IpAddr) -> Result<(), PairingError> {
        self.check_at(peer, Instant::now())
    }

    /// Records a failed proof from `peer` and returns the error to report.
    pub fn record_failure(&mut self, peer: IpAddr) -> PairingError {
        self.record_failure_at(peer, Instant::now())
    }

    /// Clears `peer`'s failure count after a successful proof.
    pub fn record_success(&mut self, peer: IpAddr) {
        self.failures.remove(&peer);
    }

    /// Issues a token for a freshly authenticated session.
    pub fn issue_token(&self) -> SessionToken {
        SessionToken::issue()
    }

    fn check_at(&mut self, peer: IpAddr, now: Instant) -> Result<(), PairingError> {
        let Some(locked_until) = self.failures.get(&peer).map(|entry| entry.locked_until) else {
            return Ok(());
        };
        match locked_until {
            Some(until) if now < until => Err(PairingError::LockedOut {
                seconds_remaining: (until - now).as_secs().max(1),
            }),
            Some(_) => {
                info!("lockout for {peer} expired");
                self.failures.remove(&peer);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_failure_at(&mut self, peer: IpAddr, now: Instant) -> PairingError {
        let entry = self.failures.entry(peer).or_default();
        entry.failed_attempts = entry.failed_attempts.saturating_add(1);
        let remaining = MAX_ATTEMPTS.saturating_sub(entry.failed_attempts);
        if remaining == 0 {
            entry.locked_until = Some(now + LOCKOUT_DURATION);
            warn!("{peer} locked out for {}s after {MAX_ATTEMPTS} failed attempts", LOCKOUT_DURATION.as_secs());
        }
        PairingError::WrongCode {
            attempts_remaining: remaining,
        }
    }
}

impl Default for PairingAuthority {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> PairingAuthority {
        PairingAuthority::with_code(PairingCode::new("482913").unwrap())
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_authority_generates_six_digit_code() {
        let auth = PairingAuthority::new();
        assert_eq!(auth.code().as_str().len(), 6);
        assert!(auth.code().as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_unknown_peer_may_attempt() {
        assert!(authority().check(ip("10.0.0.1")).is_ok());
    }

    #[test]
    fn test_failures_count_down_remaining_attempts() {
        // Arrange
        let mut auth = authority();
        let peer = ip("10.0.0.2");

        // Act
        let first = auth.record_failure(peer);
        let second = auth.record_failure(peer);

        // Assert
        assert_eq!(first, PairingError::WrongCode { attempts_remaining: 2 });
        assert_eq!(second, PairingError::WrongCode { attempts_remaining: 1 });
        assert!(auth.check(peer).is_ok());
    }

    #[test]
    fn test_third_failure_locks_peer_out() {
        // Arrange
        let mut auth = authority();
        let peer = ip("10.0.0.3");

        // Act
        auth.record_failure(peer);
        auth.record_failure(peer);
        let third = auth.record_failure(peer);

        // Assert
        assert_eq!(third, PairingError::WrongCode { attempts_remaining: 0 });
        assert!(matches!(auth.check(peer), Err(PairingError::LockedOut { .. })));
    }

    #[test]
    fn test_lockout_is_per_ip() {
        let mut auth = authority();
        for _ in 0..MAX_ATTEMPTS {
            auth.record_failure(ip("10.0.0.4"));
        }
        assert!(auth.check(ip("10.0.0.5")).is_ok());
    }

    #[test]
    fn test_lockout_expires_after_duration() {
        // Arrange
        let mut auth = authority();
        let peer = ip("10.0.0.6");
        let start = Instant::now();
        for _ in 0..MAX_ATTEMPTS {
            auth.record_failure_at(peer, start);
        }

        // Act
        let during = auth.check_at(peer, start + Duration::from_secs(30));
        let after = auth.check_at(peer, start + LOCKOUT_DURATION + Duration::from_secs(1));

        // Assert
        assert_eq!(during, Err(PairingError::LockedOut { seconds_remaining: 30 }));
        assert!(after.is_ok());
        assert_eq!(
            auth.record_failure_at(peer, start + LOCKOUT_DURATION + Duration::from_secs(2)),
            PairingError::WrongCode { attempts_remaining: 2 }
        );
    }

    #[test]
    fn test_success_clears_failures() {
        let mut auth = authority();
        let peer = ip("10.0.0.7");
        auth.record_failure(peer);
        auth.record_failure(peer);

        auth.record_success(peer);

        assert_eq!(auth.record_failure(peer), PairingError::WrongCode { attempts_remaining: 2 });
    }

    #[test]
    fn test_issued_tokens_are_unique() {
        let auth = authority();
        assert_ne!(auth.issue_token(), auth.issue_token());
    }
}
