//! Events the host server reports to its embedding UI.

use std::net::SocketAddr;

use dictation_core::DeviceIdentity;

/// Something the user of the host may want to see.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A phone completed the handshake.
    PeerAuthenticated { peer: SocketAddr, device: DeviceIdentity },

    /// A transcription session began.
    SessionStarted {
        peer: SocketAddr,
        session_id: String,
        model: String,
    },

    /// A transcript chunk arrived.
    TranscriptReceived {
        peer: SocketAddr,
        session_id: String,
        sequence_number: u64,
        text: String,
        is_final: bool,
    },

    /// A chunk arrived out of sequence.  `received < expected` means a
    /// duplicate or reordered chunk; `received > expected` means chunks went
    /// missing.  Nothing is re-requested.
    SequenceGap {
        peer: SocketAddr,
        session_id: String,
        expected: u64,
        received: u64,
    },

    /// A chunk named a session other than the active one, or arrived before
    /// any `sessionStart`.  The text is still delivered, but it does not
    /// count against the active session's sequence.
    SessionMismatch {
        peer: SocketAddr,
        active: Option<String>,
        received: String,
    },

    /// A transcription session finished.
    SessionEnded {
        peer: SocketAddr,
        session_id: String,
        final_text: String,
        duration: f64,
        word_count: u64,
    },

    /// An authenticated phone went away.
    PeerDisconnected { peer: SocketAddr },
}
