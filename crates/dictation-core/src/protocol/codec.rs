//! JSON frame codec for dictation protocol messages.
//!
//! Wire format: one JSON object per WebSocket text frame.
//!
//! ```text
//! handshake frame : {"type": "...", ...}                       → WireFrame::Plain
//! session frame   : {"nonce": N, "ciphertext": "..", "tag": ".."} → WireFrame::Sealed
//! ```
//!
//! The two shapes are told apart by the presence of the `"type"` key.  The
//! codec does not decide which shape is *allowed* at a given moment; that is
//! the job of the handshake and session state machines.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{EncryptedEnvelope, TransportMessage};

/// Largest frame either side accepts, in bytes of JSON text.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The frame exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The frame is not valid JSON or does not match either frame shape.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(String),
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    /// A cleartext handshake message.
    Plain(TransportMessage),
    /// An encrypted session message.
    Sealed(EncryptedEnvelope),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Serializes a message to the plaintext bytes that get sealed into an
/// envelope.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if serialization fails.
pub fn encode_message(msg: &TransportMessage) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(msg).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Parses the plaintext bytes recovered from an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a valid message.
pub fn decode_message(bytes: &[u8]) -> Result<TransportMessage, CodecError> {
    if bytes.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: bytes.len(),
            max: MAX_FRAME_LEN,
        });
    }
    serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Encodes a frame to the JSON text sent on the wire.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use dictation_core::protocol::codec::{decode_frame, encode_frame, WireFrame};
/// use dictation_core::protocol::messages::TransportMessage;
///
/// let text = encode_frame(&WireFrame::Plain(TransportMessage::Ping)).unwrap();
/// assert_eq!(decode_frame(&text).unwrap(), WireFrame::Plain(TransportMessage::Ping));
/// ```
pub fn encode_frame(frame: &WireFrame) -> Result<String, CodecError> {
    let result = match frame {
        WireFrame::Plain(msg) => serde_json::to_string(msg),
        WireFrame::Sealed(env) => serde_json::to_string(env),
    };
    result.map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Decodes one JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooLarge`] for oversized input and
/// [`CodecError::Malformed`] for anything that is not a message or envelope.
pub fn decode_frame(text: &str) -> Result<WireFrame, CodecError> {
    if text.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge {
            len: text.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let value: Value = serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| CodecError::Malformed("frame is not a JSON object".to_string()))?;

    if object.contains_key("type") {
        serde_json::from_value(value)
            .map(WireFrame::Plain)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    } else {
        serde_json::from_value(value)
            .map(WireFrame::Sealed)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
