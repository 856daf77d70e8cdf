//! Post-handshake message handling for one authenticated connection.
//!
//! [`HostSession`] turns each opened message into an optional reply, zero or
//! more [`HostEvent`]s, and a verdict on whether the connection should end.
//! It holds no socket; the server owns I/O.

use std::net::SocketAddr;

use dictation_core::protocol::messages::{AckMessage, TranscriptChunkMessage};
use dictation_core::protocol::{SequenceCheck, SequenceTracker};
use dictation_core::TransportMessage;
use tracing::{debug, info, warn};

use crate::application::events::HostEvent;

/// What to do after one message.
#[derive(Debug, Default, PartialEq)]
pub struct Handled {
    /// Message to seal and send back, if any.
    pub reply: Option<TransportMessage>,
    /// Events for the host UI, in order.
    pub events: Vec<HostEvent>,
    /// `true` when the connection should be closed.
    pub close: bool,
}

impl Handled {
    fn reply(msg: TransportMessage) -> Self {
        Self {
            reply: Some(msg),
            ..Self::default()
        }
    }

    fn events(events: Vec<HostEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    fn close() -> Self {
        Self {
            close: true,
            ..Self::default()
        }
    }
}

/// Per-connection transcript state.
#[derive(Debug)]
pub struct HostSession {
    peer: SocketAddr,
    tracker: SequenceTracker,
    current: Option<String>,
}

impl HostSession {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            tracker: SequenceTracker::new(),
            current: None,
        }
    }

    /// The transcription session in progress, if any.
    pub fn current_session(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Handles one message opened from a sealed frame.
    pub fn handle(&mut self, msg: TransportMessage) -> Handled {
        let peer = self.peer;
        if msg.message_type().is_handshake() {
            warn!("{peer}: {} after handshake; closing", msg.type_name());
            return Handled::close();
        }

        match msg {
            TransportMessage::Ping => Handled::reply(TransportMessage::Pong),
            TransportMessage::Pong | TransportMessage::Ack(_) => Handled::default(),

            TransportMessage::SessionStart(start) => {
                info!("{peer}: transcription session {} started ({})", start.session_id, start.model);
                self.tracker.reset();
                self.current = Some(start.session_id.clone());
                Handled::events(vec![HostEvent::SessionStarted {
                    peer,
                    session_id: start.session_id,
                    model: start.model,
                }])
            }

            TransportMessage::TranscriptChunk(chunk) => Handled::events(self.chunk(chunk)),

            TransportMessage::SessionEnd(end) => {
                info!(
                    "{peer}: transcription session {} ended ({} words, {:.1}s)",
                    end.session_id, end.word_count, end.duration
                );
                let last = self.tracker.expected().saturating_sub(1);
                self.current = None;
                Handled {
                    reply: Some(TransportMessage::Ack(AckMessage {
                        session_id: Some(end.session_id.clone()),
                        sequence_number: Some(last),
                    })),
                    events: vec![HostEvent::SessionEnded {
                        peer,
                        session_id: end.session_id,
                        final_text: end.final_text,
                        duration: end.duration,
                        word_count: end.word_count,
                    }],
                    close: false,
                }
            }

            TransportMessage::Error(e) => {
                info!("{peer} ended the session: {}", e.message);
                Handled::close()
            }

            TransportMessage::Hello(_) | TransportMessage::Authenticate(_) | TransportMessage::AuthResult(_) => {
                Handled::close()
            }
        }
    }

    fn chunk(&mut self, chunk: TranscriptChunkMessage) -> Vec<HostEvent> {
        let peer = self.peer;
        if self.current.as_deref() != Some(chunk.session_id.as_str()) {
            warn!(
                "{peer}: chunk {} for session {} while {:?} is active",
                chunk.sequence_number, chunk.session_id, self.current
            );
            return vec![
                HostEvent::SessionMismatch {
                    peer,
                    active: self.current.clone(),
                    received: chunk.session_id.clone(),
                },
                transcript(peer, chunk),
            ];
        }

        let mut events = Vec::new();
        let gap = |expected, received| HostEvent::SequenceGap {
            peer,
            session_id: chunk.session_id.clone(),
            expected,
            received,
        };

        match self.tracker.observe(chunk.sequence_number) {
            SequenceCheck::InOrder => {}
            SequenceCheck::Gap { expected, received } => {
                warn!("{peer}: transcript gap, expected {expected} got {received}");
                events.push(gap(expected, received));
            }
            SequenceCheck::Stale { last, received } => {
                warn!("{peer}: stale transcript chunk {received} (last {last}); dropped");
                return vec![gap(last + 1, received)];
            }
        }

        debug!("{peer}: chunk {} ({} chars)", chunk.sequence_number, chunk.text.len());
        events.push(transcript(peer, chunk));
        events
    }
}

fn transcript(peer: SocketAddr, chunk: TranscriptChunkMessage) -> HostEvent {
    HostEvent::TranscriptReceived {
        peer,
        session_id: chunk.session_id,
        sequence_number: chunk.sequence_number,
        text: chunk.text,
        is_final: chunk.is_final,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
