//! Client side of the pairing handshake.
//!
//! # Message flow (for beginners)
//!
//! ```text
//! Phone (client)                                   Host
//! ──────────────                                   ────
//! hello { deviceName, deviceId }          ──►
//!                                         ◄──      hello { deviceName, deviceId }
//! derive key(code, clientId, hostId)               derive key(code, clientId, hostId)
//! authenticate { proof = seal_c2h(hello) } ──►
//!                                                  open proof; compare with client hello
//!                                         ◄──      authResult { success, sessionToken,
//!                                                               proof = seal_h2c(host hello) }
//! open host proof; compare with host hello
//! ```
//!
//! The pairing code never leaves the phone.  A host that was given the
//! wrong code derives a different key and cannot open the client's proof;
//! a client talking to an impostor cannot open the host's proof.  Both
//! proofs are sealed at nonce 0 of their direction, so session traffic
//! continues from nonce 1.

use dictation_core::protocol::messages::{AuthenticateMessage, HelloMessage};
use dictation_core::{
    decode_frame, derive_session_key, encode_frame, CodecError, DeviceIdentity, PairingCode, Role, SessionCipher,
    SessionToken, TransportError, TransportMessage, WireFrame,
};
use thiserror::Error;
use tracing::debug;

use crate::application::link::{FrameSink, FrameSource, LinkError};

/// Why a handshake attempt failed.  Every variant ends the attempt; a retry
/// needs a fresh connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The host did not complete the handshake within the configured time.
    #[error("host did not respond in time")]
    Timeout,

    /// The host rejected the pairing code (or has locked this device out).
    #[error("pairing rejected: {0}")]
    Rejected(String),

    /// The host's key-confirmation proof did not verify.
    #[error("host failed to prove it holds the session key")]
    HostProofInvalid,

    /// The host accepted but did not issue a session token.
    #[error("host accepted without issuing a session token")]
    MissingToken,

    /// The host sent something other than the expected handshake message.
    #[error("unexpected {0} during handshake")]
    UnexpectedMessage(&'static str),

    /// The link failed or closed mid-handshake.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A handshake frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Deriving the session keys or sealing the proof failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandshakeError {
    /// `true` when the host explicitly refused this device, as opposed to
    /// the attempt failing for network or protocol reasons.
    pub fn is_rejection(&self) -> bool {
        matches!(self, HandshakeError::Rejected(_) | HandshakeError::HostProofInvalid)
    }
}

/// Result of a completed handshake.
#[derive(Debug)]
pub struct Established {
    /// Token the host issued for this session.
    pub token: SessionToken,
    /// Directional keys and counters, already past the nonce-0 proofs.
    pub cipher: SessionCipher,
    /// The host's identity as announced in its `hello`.
    pub host: DeviceIdentity,
}

/// Runs the client side of the handshake over an already-open link.
///
/// The caller bounds the whole exchange with a timeout and closes the link
/// on failure.
///
/// # Errors
///
/// See [`HandshakeError`].
pub async fn client_handshake(
    sink: &mut dyn FrameSink,
    source: &mut dyn FrameSource,
    identity: &DeviceIdentity,
    code: &PairingCode,
) -> Result<Established, HandshakeError> {
    let own_hello = HelloMessage {
        device_name: identity.device_name.clone(),
        device_id: identity.device_id.clone(),
    };
    send_plain(sink, TransportMessage::Hello(own_hello.clone())).await?;

    let host_hello = match recv_plain(source).await? {
        TransportMessage::Hello(hello) => hello,
        TransportMessage::Error(e) => return Err(HandshakeError::Rejected(e.message)),
        other => return Err(HandshakeError::UnexpectedMessage(other.type_name())),
    };
    debug!("host {} answered hello", host_hello.device_name);

    let key = derive_session_key(code, &identity.device_id, &host_hello.device_id, Role::Client)
        .map_err(TransportError::from)?;
    let mut cipher = SessionCipher::new(&key, Role::Client)?;
    drop(key);

    let proof = cipher.seal(&TransportMessage::Hello(own_hello))?;
    send_plain(sink, TransportMessage::Authenticate(AuthenticateMessage { proof })).await?;

    let result = match recv_plain(source).await? {
        TransportMessage::AuthResult(result) => result,
        TransportMessage::Error(e) => return Err(HandshakeError::Rejected(e.message)),
        other => return Err(HandshakeError::UnexpectedMessage(other.type_name())),
    };

    if !result.success {
        let reason = result
            .error_message
            .unwrap_or_else(|| "authentication failed".to_string());
        return Err(HandshakeError::Rejected(reason));
    }

    let host_proof = result.proof.ok_or(HandshakeError::HostProofInvalid)?;
    match cipher.open(&host_proof) {
        Ok(TransportMessage::Hello(proven)) if proven == host_hello => {}
        _ => return Err(HandshakeError::HostProofInvalid),
    }

    let token = result
        .session_token
        .map(SessionToken::new)
        .ok_or(HandshakeError::MissingToken)?;

    Ok(Established {
        token,
        cipher,
        host: DeviceIdentity::new(host_hello.device_id, host_hello.device_name),
    })
}

async fn send_plain(sink: &mut dyn FrameSink, msg: TransportMessage) -> Result<(), HandshakeError> {
    debug!("handshake → {}", msg.type_name());
    let text = encode_frame(&WireFrame::Plain(msg))?;
    sink.send(text).await?;
    Ok(())
}

async fn recv_plain(source: &mut dyn FrameSource) -> Result<TransportMessage, HandshakeError> {
    let text = source.recv().await?.ok_or(LinkError::Closed)?;
    match decode_frame(&text)? {
        WireFrame::Plain(msg) => {
            debug!("handshake ← {}", msg.type_name());
            Ok(msg)
        }
        WireFrame::Sealed(_) => Err(HandshakeError::UnexpectedMessage("envelope")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
