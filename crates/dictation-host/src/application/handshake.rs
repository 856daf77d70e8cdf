//! Host side of the pairing handshake.
//!
//! The functions here are pure: the server reads the client's `hello` and
//! `authenticate` off the socket, calls [`answer_authenticate`], and writes
//! whatever reply comes back.  Keeping the socket out makes every refusal
//! path testable without a network.
//!
//! # Verifying the client (for beginners)
//!
//! The host never sees the client's copy of the pairing code.  It derives
//! the session key from its *own* code and both device ids, then tries to
//! open the client's proof.  If the client typed the same code, the proof
//! opens and contains the client's `hello`; otherwise the AEAD tag fails and
//! the attempt counts against the client's IP address.

use std::net::IpAddr;

use dictation_core::protocol::messages::{AuthResultMessage, AuthenticateMessage, HelloMessage};
use dictation_core::{
    derive_session_key, DeviceIdentity, Role, SessionCipher, SessionToken, TransportError, TransportMessage,
};
use tracing::{debug, error, info, warn};

use crate::application::pairing::{PairingAuthority, PairingError};

/// Refusal text for a proof that did not verify.
pub const INVALID_CODE: &str = "invalid pairing code";

/// The host's `hello`, answered to every client `hello`.
pub fn host_hello(identity: &DeviceIdentity) -> HelloMessage {
    HelloMessage {
        device_name: identity.device_name.clone(),
        device_id: identity.device_id.clone(),
    }
}

/// What the server should do after evaluating an `authenticate`.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The client proved the code.  Send `reply`, then switch to sealed
    /// frames using `cipher`.
    Accepted {
        token: SessionToken,
        cipher: SessionCipher,
        client: DeviceIdentity,
        reply: AuthResultMessage,
    },
    /// The client failed.  Send `reply` and close the connection.
    Refused { reply: AuthResultMessage, reason: PairingError },
}

/// Evaluates a client's key-confirmation proof.
///
/// A locked-out peer is refused without opening the proof, so a locked
/// address learns nothing from further guesses.
pub fn answer_authenticate(
    authority: &mut PairingAuthority,
    identity: &DeviceIdentity,
    peer: IpAddr,
    client_hello: &HelloMessage,
    auth: &AuthenticateMessage,
) -> HandshakeOutcome {
    if let Err(reason) = authority.check(peer) {
        warn!("refusing {peer}: {reason}");
        return refused(reason);
    }

    let mut cipher = match host_cipher(authority, identity, client_hello) {
        Ok(cipher) => cipher,
        Err(e) => {
            error!("deriving session keys for {peer} failed: {e}");
            return refused(PairingError::WrongCode { attempts_remaining: 0 });
        }
    };

    // The proof must be the first envelope of the client→host direction.
    let verified = auth.proof.nonce == 0
        && matches!(cipher.open(&auth.proof), Ok(TransportMessage::Hello(ref proven)) if proven == client_hello);

    if !verified {
        let reason = authority.record_failure(peer);
        warn!("{peer} ({}) failed pairing: {reason}", client_hello.device_name);
        return refused(reason);
    }

    let proof = match cipher.seal(&TransportMessage::Hello(host_hello(identity))) {
        Ok(proof) => proof,
        Err(e) => {
            // Only reachable if encoding a hello fails, which it does not.
            debug!("sealing host proof failed: {e}");
            return refused(PairingError::WrongCode { attempts_remaining: 0 });
        }
    };

    authority.record_success(peer);
    let token = authority.issue_token();
    info!("{peer} paired as {} ({})", client_hello.device_name, client_hello.device_id);

    HandshakeOutcome::Accepted {
        reply: AuthResultMessage {
            success: true,
            session_token: Some(token.as_str().to_string()),
            error_message: None,
            proof: Some(proof),
        },
        token,
        cipher,
        client: DeviceIdentity::new(client_hello.device_id.clone(), client_hello.device_name.clone()),
    }
}

fn host_cipher(
    authority: &PairingAuthority,
    identity: &DeviceIdentity,
    client_hello: &HelloMessage,
) -> Result<SessionCipher, TransportError> {
    let key = derive_session_key(authority.code(), &identity.device_id, &client_hello.device_id, Role::Host)?;
    SessionCipher::new(&key, Role::Host)
}

fn refused(reason: PairingError) -> HandshakeOutcome {
    let message = match reason {
        PairingError::WrongCode { .. } => INVALID_CODE.to_string(),
        PairingError::LockedOut { .. } => reason.to_string(),
    };
    HandshakeOutcome::Refused {
        reply: AuthResultMessage {
            success: false,
            session_token: None,
            error_message: Some(message),
            proof: None,
        },
        reason,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
