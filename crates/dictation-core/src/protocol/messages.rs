//! All dictation protocol message types.
//!
//! Every frame on the wire is one JSON object.  Before authentication the
//! object is a [`TransportMessage`] identified by its `"type"` field; after
//! authentication it is an [`EncryptedEnvelope`] whose plaintext is a
//! serialized `TransportMessage`.
//!
//! ```json
//! {"type":"hello","deviceName":"Pixel 8","deviceId":"6c1f..."}
//! {"nonce":3,"ciphertext":"q83v...","tag":"3sV0..."}
//! ```

use serde::{Deserialize, Serialize};

/// Current protocol version, advertised in the `version` mDNS TXT property.
/// Clients skip hosts that advertise any other version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Poly1305 authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

// ── Message type codes ────────────────────────────────────────────────────────

/// Discriminant of every [`TransportMessage`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Handshake (always cleartext)
    Hello,
    Authenticate,
    AuthResult,
    // Session (always sealed once authenticated)
    SessionStart,
    TranscriptChunk,
    SessionEnd,
    Ping,
    Pong,
    Ack,
    Error,
}

impl MessageType {
    /// Returns `true` for the three message types exchanged in cleartext
    /// during the handshake.
    pub fn is_handshake(self) -> bool {
        matches!(
            self,
            MessageType::Hello | MessageType::Authenticate | MessageType::AuthResult
        )
    }

    /// The wire name of this type (the JSON `"type"` value).
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Hello => "hello",
            MessageType::Authenticate => "authenticate",
            MessageType::AuthResult => "authResult",
            MessageType::SessionStart => "sessionStart",
            MessageType::TranscriptChunk => "transcriptChunk",
            MessageType::SessionEnd => "sessionEnd",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Ack => "ack",
            MessageType::Error => "error",
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// An authenticated-encrypted frame.
///
/// `nonce` and `tag` travel in the clear; the nonce is additionally bound to
/// the ciphertext as associated data, so changing either one makes the frame
/// fail authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Per-direction counter value this frame was sealed with.
    pub nonce: u64,
    /// Encrypted serialized [`TransportMessage`].
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// 16-byte Poly1305 tag.
    #[serde(with = "base64_bytes")]
    pub tag: Vec<u8>,
}

/// Serde adapter that writes byte vectors as standard base64 strings.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// `hello`: each side introduces itself.  Sent once per connection by the
/// client and answered once by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloMessage {
    /// Human-readable device label.
    pub device_name: String,
    /// Stable device identifier; an input to key derivation.
    pub device_id: String,
}

/// `authenticate`: client key confirmation.
///
/// `proof` is the client's own `hello`, sealed with the client→host key at
/// nonce 0.  A host that derived the same key can open it; the pairing code
/// itself never leaves the phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateMessage {
    pub proof: EncryptedEnvelope,
}

/// `authResult`: the host's verdict on an `authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResultMessage {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// On success, the host's `hello` sealed with the host→client key at
    /// nonce 0, so the client can confirm the host holds the same key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<EncryptedEnvelope>,
}

/// `sessionStart`: brackets the beginning of one transcription session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartMessage {
    pub session_id: String,
    /// Speech model the transcript is produced with.
    pub model: String,
}

/// `transcriptChunk`: a piece of recognised text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptChunkMessage {
    pub session_id: String,
    /// Application sequence number, starting at 1 per transcription session.
    pub sequence_number: u64,
    pub text: String,
    /// `true` when the recogniser will not revise this text any more.
    pub is_final: bool,
}

/// `sessionEnd`: brackets the end of one transcription session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndMessage {
    pub session_id: String,
    pub final_text: String,
    /// Session duration in seconds.
    pub duration: f64,
    pub word_count: u64,
}

/// `ack`: receipt acknowledgement.  Informational only; nothing is ever
/// retransmitted based on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
}

/// `error`: the peer is giving up on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Human-readable description (for logs and the UI; never crypto detail).
    pub message: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// The closed set of protocol messages, discriminated by the JSON `"type"`
/// field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportMessage {
    Hello(HelloMessage),
    Authenticate(AuthenticateMessage),
    AuthResult(AuthResultMessage),
    SessionStart(SessionStartMessage),
    TranscriptChunk(TranscriptChunkMessage),
    SessionEnd(SessionEndMessage),
    Ping,
    Pong,
    Ack(AckMessage),
    Error(ErrorMessage),
}

impl TransportMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            TransportMessage::Hello(_) => MessageType::Hello,
            TransportMessage::Authenticate(_) => MessageType::Authenticate,
            TransportMessage::AuthResult(_) => MessageType::AuthResult,
            TransportMessage::SessionStart(_) => MessageType::SessionStart,
            TransportMessage::TranscriptChunk(_) => MessageType::TranscriptChunk,
            TransportMessage::SessionEnd(_) => MessageType::SessionEnd,
            TransportMessage::Ping => MessageType::Ping,
            TransportMessage::Pong => MessageType::Pong,
            TransportMessage::Ack(_) => MessageType::Ack,
            TransportMessage::Error(_) => MessageType::Error,
        }
    }

    /// Short type name for log lines.
    ///
    /// Logging the name instead of the `Debug` form keeps transcript text
    /// and proofs out of the logs.
    pub fn type_name(&self) -> &'static str {
        self.message_type().as_str()
    }

    /// Convenience constructor for an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        TransportMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
