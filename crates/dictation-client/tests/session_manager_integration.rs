//! Integration tests for the Session Manager against a scripted host.
//!
//! # Purpose
//!
//! These tests drive [`SessionManager`] through its public API exactly as the
//! mobile UI would, with the network replaced by an in-memory
//! [`MemoryConnector`].  The host side is a small script built from
//! `dictation-core` primitives, so every frame the manager sends can be
//! opened and checked, and every frame it receives can be crafted, including
//! tampered and replayed ones.
//!
//! They verify:
//!
//! - The happy path: pairing reaches `Connected`, chunks carry sequence
//!   numbers starting at 1 per transcription session, and acks surface as
//!   events.
//! - Rejection: a wrong pairing code returns to `Disconnected`.
//! - Integrity: tampered, replayed, or unsealed frames end the session with a
//!   generic "connection lost".
//! - Liveness: inbound pings are answered, silence is detected by the
//!   keepalive, and a closed link is noticed.
//! - Teardown: `disconnect()` closes the link and drops all session
//!   material; the next `connect()` runs a fresh handshake.

use std::sync::Arc;
use std::time::Duration;

use dictation_client::application::handshake::HandshakeError;
use dictation_client::application::link::Link;
use dictation_client::infrastructure::transport::memory::MemoryConnector;
use dictation_client::{ClientConfig, ConnectionState, Delivery, SessionError, SessionEvent, SessionManager};
use dictation_core::protocol::messages::{AckMessage, AuthResultMessage, ErrorMessage, HelloMessage};
use dictation_core::{
    decode_frame, derive_session_key, encode_frame, DeviceIdentity, DiscoveredHost, EncryptedEnvelope, PairingCode,
    Role, SessionCipher, TransportMessage, WireFrame,
};
use tokio::sync::mpsc;

const CODE: &str = "482913";
const WAIT: Duration = Duration::from_secs(3);

// ── Scripted host ─────────────────────────────────────────────────────────────

/// Host end of a paired in-memory link.
struct ScriptedHost {
    link: Link,
    cipher: SessionCipher,
}

impl ScriptedHost {
    /// Runs the host side of the handshake with `code`.  Returns `None`
    /// after replying with a rejection.
    async fn accept(mut link: Link, code: &str) -> Option<Self> {
        let TransportMessage::Hello(client_hello) = recv_plain(&mut link).await else {
            panic!("expected hello");
        };
        let host_hello = HelloMessage {
            device_name: "Office-Mac".to_string(),
            device_id: "B2".to_string(),
        };
        send_plain(&mut link, TransportMessage::Hello(host_hello.clone())).await;

        let key = derive_session_key(&PairingCode::new(code).unwrap(), "B2", &client_hello.device_id, Role::Host).unwrap();
        let mut cipher = SessionCipher::new(&key, Role::Host).unwrap();

        let TransportMessage::Authenticate(auth) = recv_plain(&mut link).await else {
            panic!("expected authenticate");
        };
        match cipher.open(&auth.proof) {
            Ok(TransportMessage::Hello(proven)) if proven == client_hello => {
                let proof = cipher.seal(&TransportMessage::Hello(host_hello)).unwrap();
                let reply = AuthResultMessage {
                    success: true,
                    session_token: Some("tok-1".to_string()),
                    error_message: None,
                    proof: Some(proof),
                };
                send_plain(&mut link, TransportMessage::AuthResult(reply)).await;
                Some(Self { link, cipher })
            }
            _ => {
                let reply = AuthResultMessage {
                    success: false,
                    session_token: None,
                    error_message: Some("invalid pairing code".to_string()),
                    proof: None,
                };
                send_plain(&mut link, TransportMessage::AuthResult(reply)).await;
                None
            }
        }
    }

    async fn recv_envelope(&mut self) -> EncryptedEnvelope {
        let text = tokio::time::timeout(WAIT, self.link.source.recv())
            .await
            .expect("timed out waiting for client frame")
            .unwrap()
            .expect("client closed the link");
        match decode_frame(&text).unwrap() {
            WireFrame::Sealed(env) => env,
            WireFrame::Plain(msg) => panic!("client sent unsealed {}", msg.type_name()),
        }
    }

    async fn recv(&mut self) -> TransportMessage {
        let env = self.recv_envelope().await;
        self.cipher.open(&env).unwrap()
    }

    async fn send(&mut self, msg: &TransportMessage) {
        let env = self.cipher.seal(msg).unwrap();
        self.send_raw(encode_frame(&WireFrame::Sealed(env)).unwrap()).await;
    }

    async fn send_raw(&mut self, frame: String) {
        self.link.sink.send(frame).await.unwrap();
    }

    /// `true` once the client has closed its end.
    async fn sees_close(&mut self) -> bool {
        matches!(tokio::time::timeout(WAIT, self.link.source.recv()).await, Ok(Ok(None)))
    }
}

async fn recv_plain(link: &mut Link) -> TransportMessage {
    let text = link.source.recv().await.unwrap().expect("client closed the link");
    match decode_frame(&text).unwrap() {
        WireFrame::Plain(msg) => msg,
        WireFrame::Sealed(_) => panic!("unexpected envelope during handshake"),
    }
}

async fn send_plain(link: &mut Link, msg: TransportMessage) {
    link.sink.send(encode_frame(&WireFrame::Plain(msg)).unwrap()).await.unwrap();
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn office_mac() -> DiscoveredHost {
    DiscoveredHost::new("Office-Mac", "192.168.1.20:7040".parse().unwrap(), "/dictation")
}

struct Harness {
    manager: SessionManager,
    events: mpsc::Receiver<SessionEvent>,
    accepted: mpsc::UnboundedReceiver<Link>,
}

fn harness(config: ClientConfig) -> Harness {
    let (connector, accepted) = MemoryConnector::new();
    let (manager, events) = SessionManager::new(DeviceIdentity::new("A1", "Pixel"), config, Arc::new(connector));
    Harness {
        manager,
        events,
        accepted,
    }
}

impl Harness {
    /// Connects with `client_code` while the scripted host expects `host_code`.
    async fn pair(&mut self, client_code: &str, host_code: &str) -> (Result<(), SessionError>, Option<ScriptedHost>) {
        let link_rx = &mut self.accepted;
        let host_code = host_code.to_string();
        let host = async move {
            let link = link_rx.recv().await.unwrap();
            ScriptedHost::accept(link, &host_code).await
        };
        let target = office_mac();
        let client = self.manager.connect(&target, PairingCode::new(client_code).unwrap());
        tokio::join!(client, host)
    }

    async fn paired(&mut self) -> ScriptedHost {
        let (result, host) = self.pair(CODE, CODE).await;
        result.unwrap();
        host.unwrap()
    }

    /// Next event that is not a state change.
    async fn next_non_state_event(&mut self) -> SessionEvent {
        loop {
            let event = tokio::time::timeout(WAIT, self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            if !matches!(event, SessionEvent::StateChanged(_)) {
                return event;
            }
        }
    }

    async fn wait_for_state(&self, expected: ConnectionState) {
        let mut rx = self.manager.subscribe_state();
        tokio::time::timeout(Duration::from_secs(6), rx.wait_for(|s| *s == expected))
            .await
            .unwrap_or_else(|_| panic!("state never became {expected}"))
            .unwrap();
    }
}

// ── Happy path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pairing_walks_through_states_to_connected() {
    // Arrange
    let mut h = harness(ClientConfig::default());

    // Act
    let _host = h.paired().await;

    // Assert
    let mut states = Vec::new();
    while let Ok(SessionEvent::StateChanged(state)) = h.events.try_recv() {
        states.push(state);
    }
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Authenticating,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(h.manager.session_token().await.unwrap().as_str(), "tok-1");
    assert!(h.manager.has_session_key().await);
}

#[tokio::test]
async fn test_chunks_are_numbered_from_one_per_transcription_session() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    // Act
    h.manager.send_session_start("s1", "whisper-base").await.unwrap();
    h.manager.send_transcript_chunk("s1", "hello", false).await.unwrap();
    h.manager.send_transcript_chunk("s1", "hello world", true).await.unwrap();
    h.manager.send_session_start("s2", "whisper-base").await.unwrap();
    let delivery = h.manager.send_transcript_chunk("s2", "again", true).await.unwrap();

    // Assert
    assert_eq!(delivery, Delivery::Sent);
    let mut numbers = Vec::new();
    for _ in 0..5 {
        if let TransportMessage::TranscriptChunk(chunk) = host.recv().await {
            numbers.push((chunk.session_id, chunk.sequence_number));
        }
    }
    assert_eq!(
        numbers,
        vec![("s1".to_string(), 1), ("s1".to_string(), 2), ("s2".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_first_session_frame_uses_nonce_one() {
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    h.manager.send_session_start("s1", "whisper-base").await.unwrap();

    assert_eq!(host.recv_envelope().await.nonce, 1);
}

#[tokio::test]
async fn test_session_end_ack_surfaces_as_event() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;
    h.manager.send_session_end("s1", "hello world", 2.5, 2).await.unwrap();
    let TransportMessage::SessionEnd(end) = host.recv().await else {
        panic!("expected sessionEnd");
    };

    // Act
    let ack = AckMessage {
        session_id: Some(end.session_id),
        sequence_number: None,
    };
    host.send(&TransportMessage::Ack(ack.clone())).await;

    // Assert
    assert_eq!(h.next_non_state_event().await, SessionEvent::Acknowledged(ack));
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_non_finite_duration_is_refused_without_sending() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    // Act
    let nan = h.manager.send_session_end("s1", "hello", f64::NAN, 1).await;
    let inf = h.manager.send_session_end("s1", "hello", f64::INFINITY, 1).await;
    h.manager.send_session_end("s1", "hello", 1.0, 1).await.unwrap();

    // Assert
    assert!(matches!(nan, Err(SessionError::InvalidDuration(d)) if d.is_nan()));
    assert!(matches!(inf, Err(SessionError::InvalidDuration(_))));
    assert_eq!(h.manager.state(), ConnectionState::Connected);
    let env = host.recv_envelope().await;
    assert_eq!(env.nonce, 1);
    let TransportMessage::SessionEnd(end) = host.cipher.open(&env).unwrap() else {
        panic!("expected sessionEnd");
    };
    assert_eq!(end.duration, 1.0);
}

#[tokio::test]
async fn test_inbound_ping_is_answered_with_pong() {
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    host.send(&TransportMessage::Ping).await;

    assert_eq!(host.recv().await, TransportMessage::Pong);
}

// ── Rejection ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_wrong_code_returns_to_disconnected() {
    // Arrange
    let mut h = harness(ClientConfig::default());

    // Act
    let (result, host) = h.pair("000000", CODE).await;

    // Assert
    assert!(host.is_none());
    match result {
        Err(SessionError::Handshake(e @ HandshakeError::Rejected(_))) => assert!(e.is_rejection()),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert!(h.manager.session_token().await.is_none());
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let mut h = harness(ClientConfig::default());
    let _host = h.paired().await;

    let result = h.manager.connect(&office_mac(), PairingCode::new(CODE).unwrap()).await;

    assert!(matches!(result, Err(SessionError::AlreadyActive)));
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}

// ── Integrity failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tampered_envelope_ends_session_with_generic_error() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;
    let mut env = host.cipher.seal(&TransportMessage::Ping).unwrap();
    env.ciphertext[0] ^= 0x01;

    // Act
    host.send_raw(encode_frame(&WireFrame::Sealed(env)).unwrap()).await;

    // Assert
    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;
    assert!(!h.manager.has_session_key().await);
    assert!(host.sees_close().await);
}

#[tokio::test]
async fn test_replayed_envelope_ends_session() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;
    let env = host.cipher.seal(&TransportMessage::Ping).unwrap();
    let frame = encode_frame(&WireFrame::Sealed(env)).unwrap();

    // Act
    host.send_raw(frame.clone()).await;
    assert_eq!(host.recv().await, TransportMessage::Pong);
    host.send_raw(frame).await;

    // Assert
    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;
    assert!(host.sees_close().await);
}

#[tokio::test]
async fn test_unsealed_frame_after_authentication_ends_session() {
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    host.send_raw(encode_frame(&WireFrame::Plain(TransportMessage::Ping)).unwrap())
        .await;

    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;
}

#[tokio::test]
async fn test_garbage_frame_ends_session() {
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    host.send_raw("not json".to_string()).await;

    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;
}

#[tokio::test]
async fn test_remote_error_message_tears_down_with_its_text() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    // Act
    host.send(&TransportMessage::Error(ErrorMessage {
        message: "host shutting down".to_string(),
    }))
    .await;

    // Assert
    assert_eq!(
        h.next_non_state_event().await,
        SessionEvent::RemoteError("host shutting down".to_string())
    );
    h.wait_for_state(ConnectionState::Error("host shutting down".to_string())).await;
    assert!(h.manager.session_token().await.is_none());
}

// ── Liveness ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_host_closing_link_is_reported_as_connection_lost() {
    let mut h = harness(ClientConfig::default());
    let host = h.paired().await;

    drop(host);

    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;
}

#[tokio::test]
async fn test_keepalive_pings_then_gives_up_on_silent_host() {
    // Arrange
    let config = ClientConfig {
        ping_interval_secs: 1,
        ping_timeout_secs: 2,
        ..ClientConfig::default()
    };
    let mut h = harness(config);
    let mut host = h.paired().await;

    // Act – never answer
    let first = host.recv().await;

    // Assert
    assert_eq!(first, TransportMessage::Ping);
    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_closes_link_and_clears_session() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let mut host = h.paired().await;

    // Act
    h.manager.disconnect().await;
    h.manager.disconnect().await;

    // Assert
    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
    assert!(h.manager.session_token().await.is_none());
    assert!(!h.manager.has_session_key().await);
    assert!(host.sees_close().await);
    assert_eq!(
        h.manager.send_transcript_chunk("s1", "late", true).await.unwrap(),
        Delivery::Skipped
    );
}

#[tokio::test]
async fn test_disconnect_from_error_state_returns_to_disconnected() {
    let mut h = harness(ClientConfig::default());
    let host = h.paired().await;
    drop(host);
    h.wait_for_state(ConnectionState::Error("connection lost".to_string())).await;

    h.manager.disconnect().await;

    assert_eq!(h.manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_runs_a_fresh_handshake() {
    // Arrange
    let mut h = harness(ClientConfig::default());
    let _old = h.paired().await;
    h.manager.disconnect().await;

    // Act
    let mut host = h.paired().await;
    h.manager.send_session_start("s2", "whisper-base").await.unwrap();

    // Assert – counters restart with the new keys
    let env = host.recv_envelope().await;
    assert_eq!(env.nonce, 1);
    assert!(matches!(host.cipher.open(&env).unwrap(), TransportMessage::SessionStart(_)));
}

#[tokio::test]
async fn test_two_managers_hold_independent_sessions() {
    // Arrange
    let mut a = harness(ClientConfig::default());
    let mut b = harness(ClientConfig::default());
    let _host_a = a.paired().await;
    let _host_b = b.paired().await;

    // Act
    a.manager.disconnect().await;

    // Assert
    assert_eq!(a.manager.state(), ConnectionState::Disconnected);
    assert_eq!(b.manager.state(), ConnectionState::Connected);
    assert!(b.manager.has_session_key().await);
}
