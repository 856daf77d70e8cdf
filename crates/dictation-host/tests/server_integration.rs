//! Drives a real `HostServer` on a loopback port with a hand-rolled
//! WebSocket client speaking the pairing protocol frame by frame.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use dictation_core::protocol::messages::{
    AuthResultMessage, AuthenticateMessage, HelloMessage, SessionEndMessage, SessionStartMessage,
    TranscriptChunkMessage,
};
use dictation_core::protocol::codec::MAX_FRAME_LEN;
use dictation_core::{
    decode_frame, derive_session_key, encode_frame, DeviceIdentity, PairingCode, Role, SessionCipher,
    TransportMessage, WireFrame,
};
use dictation_host::{HostConfig, HostEvent, HostServer, PairingAuthority};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CODE: &str = "482913";
const WAIT: Duration = Duration::from_secs(3);

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestHost {
    addr: SocketAddr,
    events: mpsc::Receiver<HostEvent>,
    running: Arc<AtomicBool>,
}

impl Drop for TestHost {
    fn drop(&mut self) {
        self.running.store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

async fn start_host(ping_interval: Duration) -> TestHost {
    let config = HostConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        display_name: "Office-Mac".to_string(),
        ping_interval,
        handshake_timeout: Duration::from_secs(2),
        ..HostConfig::default()
    };
    let authority = PairingAuthority::with_code(PairingCode::new(CODE).unwrap());
    let (server, events) = HostServer::bind(config, DeviceIdentity::new("B2", "Office-Mac"), Arc::new(Mutex::new(authority)))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(server.run(Arc::clone(&running)));
    TestHost { addr, events, running }
}

fn hello() -> HelloMessage {
    HelloMessage {
        device_name: "Pixel".to_string(),
        device_id: "A1".to_string(),
    }
}

async fn open(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}{path}")).await.unwrap();
    ws
}

async fn send_plain(ws: &mut Ws, msg: TransportMessage) {
    ws.send(Message::Text(encode_frame(&WireFrame::Plain(msg)).unwrap())).await.unwrap();
}

async fn send_sealed(ws: &mut Ws, cipher: &mut SessionCipher, msg: &TransportMessage) {
    let env = cipher.seal(msg).unwrap();
    ws.send(Message::Text(encode_frame(&WireFrame::Sealed(env)).unwrap())).await.unwrap();
}

async fn recv_frame(ws: &mut Ws) -> Option<WireFrame> {
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out waiting for frame") {
            Some(Ok(Message::Text(text))) => return Some(decode_frame(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Runs the client half of the handshake with `code`; returns the cipher
/// (if accepted) and the raw authResult.
async fn handshake(ws: &mut Ws, code: &str) -> (Option<SessionCipher>, AuthResultMessage) {
    send_plain(ws, TransportMessage::Hello(hello())).await;
    let Some(WireFrame::Plain(TransportMessage::Hello(host_hello))) = recv_frame(ws).await else {
        panic!("expected host hello");
    };
    assert_eq!(host_hello.device_id, "B2");

    let key = derive_session_key(&PairingCode::new(code).unwrap(), "A1", &host_hello.device_id, Role::Client).unwrap();
    let mut cipher = SessionCipher::new(&key, Role::Client).unwrap();
    let proof = cipher.seal(&TransportMessage::Hello(hello())).unwrap();
    send_plain(ws, TransportMessage::Authenticate(AuthenticateMessage { proof })).await;

    let Some(WireFrame::Plain(TransportMessage::AuthResult(result))) = recv_frame(ws).await else {
        panic!("expected authResult");
    };
    if result.success {
        let host_proof = result.proof.clone().expect("host proof");
        assert_eq!(cipher.open(&host_proof).unwrap(), TransportMessage::Hello(host_hello));
        (Some(cipher), result)
    } else {
        (None, result)
    }
}

async fn next_event(events: &mut mpsc::Receiver<HostEvent>) -> HostEvent {
    timeout(WAIT, events.recv()).await.expect("timed out waiting for event").expect("event channel closed")
}

fn chunk(seq: u64, text: &str) -> TransportMessage {
    TransportMessage::TranscriptChunk(TranscriptChunkMessage {
        session_id: "s1".to_string(),
        sequence_number: seq,
        text: text.to_string(),
        is_final: false,
    })
}

fn start() -> TransportMessage {
    TransportMessage::SessionStart(SessionStartMessage {
        session_id: "s1".to_string(),
        model: "whisper-small".to_string(),
    })
}

#[tokio::test]
async fn test_paired_phone_streams_transcript() {
    // Arrange
    let mut host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;

    // Act
    let (cipher, result) = handshake(&mut ws, CODE).await;
    let mut cipher = cipher.expect("pairing accepted");
    send_sealed(&mut ws, &mut cipher, &start()).await;
    send_sealed(&mut ws, &mut cipher, &chunk(1, "hello")).await;

    // Assert
    assert!(result.session_token.is_some());
    let HostEvent::PeerAuthenticated { device, .. } = next_event(&mut host.events).await else {
        panic!("expected PeerAuthenticated");
    };
    assert_eq!(device.device_id, "A1");
    assert!(matches!(next_event(&mut host.events).await, HostEvent::SessionStarted { .. }));
    assert!(matches!(
        next_event(&mut host.events).await,
        HostEvent::TranscriptReceived { sequence_number: 1, ref text, .. } if text == "hello"
    ));
}

#[tokio::test]
async fn test_wrong_code_is_refused_and_closed() {
    // Arrange
    let host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;

    // Act
    let (cipher, result) = handshake(&mut ws, "000000").await;

    // Assert
    assert!(cipher.is_none());
    assert!(!result.success);
    assert_eq!(result.error_message.as_deref(), Some("invalid pairing code"));
    assert!(result.session_token.is_none());
    assert!(recv_frame(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_repeated_failures_lock_out_the_address() {
    // Arrange
    let host = start_host(Duration::from_secs(30)).await;
    for _ in 0..3 {
        let mut ws = open(host.addr, "/dictation").await;
        let (cipher, _) = handshake(&mut ws, "000000").await;
        assert!(cipher.is_none());
    }

    // Act: even the right code is refused now
    let mut ws = open(host.addr, "/dictation").await;
    let (cipher, result) = handshake(&mut ws, CODE).await;

    // Assert
    assert!(cipher.is_none());
    assert!(result.error_message.unwrap().starts_with("too many failed attempts"));
}

#[tokio::test]
async fn test_unknown_path_gets_404() {
    let host = start_host(Duration::from_secs(30)).await;

    let err = connect_async(format!("ws://{}/elsewhere", host.addr)).await.unwrap_err();

    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 404),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    // Arrange
    let host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();

    // Act
    send_sealed(&mut ws, &mut cipher, &TransportMessage::Ping).await;

    // Assert
    let Some(WireFrame::Sealed(env)) = recv_frame(&mut ws).await else {
        panic!("expected sealed reply");
    };
    assert_eq!(env.nonce, 1);
    assert_eq!(cipher.open(&env).unwrap(), TransportMessage::Pong);
}

#[tokio::test]
async fn test_host_sends_keepalive_pings() {
    let host = start_host(Duration::from_millis(100)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();

    let Some(WireFrame::Sealed(env)) = recv_frame(&mut ws).await else {
        panic!("expected sealed ping");
    };

    assert_eq!(cipher.open(&env).unwrap(), TransportMessage::Ping);
}

#[tokio::test]
async fn test_tampered_frame_closes_connection() {
    // Arrange
    let mut host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();
    next_event(&mut host.events).await;

    // Act
    let mut env = cipher.seal(&chunk(1, "hello")).unwrap();
    env.ciphertext[0] ^= 0x01;
    ws.send(Message::Text(encode_frame(&WireFrame::Sealed(env)).unwrap())).await.unwrap();

    // Assert
    assert!(recv_frame(&mut ws).await.is_none());
    assert!(matches!(next_event(&mut host.events).await, HostEvent::PeerDisconnected { .. }));
}

#[tokio::test]
async fn test_replayed_frame_closes_connection() {
    // Arrange
    let mut host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();
    next_event(&mut host.events).await;
    send_sealed(&mut ws, &mut cipher, &start()).await;
    next_event(&mut host.events).await;
    let env = cipher.seal(&chunk(1, "hello")).unwrap();
    let text = encode_frame(&WireFrame::Sealed(env)).unwrap();

    // Act
    ws.send(Message::Text(text.clone())).await.unwrap();
    ws.send(Message::Text(text)).await.unwrap();

    // Assert
    assert!(matches!(next_event(&mut host.events).await, HostEvent::TranscriptReceived { .. }));
    assert!(matches!(next_event(&mut host.events).await, HostEvent::PeerDisconnected { .. }));
}

#[tokio::test]
async fn test_skipped_chunk_reports_gap() {
    // Arrange
    let mut host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();
    next_event(&mut host.events).await;
    send_sealed(&mut ws, &mut cipher, &start()).await;
    assert!(matches!(next_event(&mut host.events).await, HostEvent::SessionStarted { .. }));

    // Act
    send_sealed(&mut ws, &mut cipher, &chunk(1, "a")).await;
    send_sealed(&mut ws, &mut cipher, &chunk(3, "c")).await;

    // Assert
    assert!(matches!(next_event(&mut host.events).await, HostEvent::TranscriptReceived { sequence_number: 1, .. }));
    assert!(matches!(
        next_event(&mut host.events).await,
        HostEvent::SequenceGap { expected: 2, received: 3, .. }
    ));
    assert!(matches!(next_event(&mut host.events).await, HostEvent::TranscriptReceived { sequence_number: 3, .. }));
}

#[tokio::test]
async fn test_session_end_is_acknowledged() {
    // Arrange
    let host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();
    send_sealed(&mut ws, &mut cipher, &start()).await;
    send_sealed(&mut ws, &mut cipher, &chunk(1, "done")).await;

    // Act
    send_sealed(
        &mut ws,
        &mut cipher,
        &TransportMessage::SessionEnd(SessionEndMessage {
            session_id: "s1".to_string(),
            final_text: "done".to_string(),
            duration: 1.5,
            word_count: 1,
        }),
    )
    .await;

    // Assert
    let Some(WireFrame::Sealed(env)) = recv_frame(&mut ws).await else {
        panic!("expected sealed ack");
    };
    let TransportMessage::Ack(ack) = cipher.open(&env).unwrap() else {
        panic!("expected ack");
    };
    assert_eq!(ack.session_id.as_deref(), Some("s1"));
    assert_eq!(ack.sequence_number, Some(1));
    drop(host);
}

#[tokio::test]
async fn test_chunk_without_session_start_is_reported() {
    // Arrange
    let mut host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let mut cipher = handshake(&mut ws, CODE).await.0.unwrap();
    next_event(&mut host.events).await;

    // Act
    send_sealed(&mut ws, &mut cipher, &chunk(1, "early")).await;

    // Assert
    assert!(matches!(
        next_event(&mut host.events).await,
        HostEvent::SessionMismatch { active: None, .. }
    ));
    assert!(matches!(next_event(&mut host.events).await, HostEvent::TranscriptReceived { sequence_number: 1, .. }));
}

#[tokio::test]
async fn test_oversized_frame_before_handshake_is_refused() {
    // Arrange
    let mut host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;
    let oversized = "x".repeat(MAX_FRAME_LEN + 1);

    // Act
    let sent = ws.send(Message::Text(oversized)).await;

    // Assert
    if sent.is_ok() {
        assert!(recv_frame(&mut ws).await.is_none(), "host answered an oversized frame");
    }
    assert!(timeout(Duration::from_millis(300), host.events.recv()).await.is_err());
}

#[tokio::test]
async fn test_silent_client_is_dropped_after_handshake_timeout() {
    // Arrange
    let host = start_host(Duration::from_secs(30)).await;
    let mut ws = open(host.addr, "/dictation").await;

    // Act: say nothing
    let closed = timeout(Duration::from_secs(4), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;

    // Assert
    assert!(closed.is_ok(), "host must close a client that never says hello");
    drop(host);
}
