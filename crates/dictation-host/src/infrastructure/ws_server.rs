//! WebSocket server: accept loop, pairing handshake, and sealed sessions.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading connections whose request path matches the configured path
//!    (any other path is answered with HTTP 404).
//! 3. Running the cleartext pairing handshake under a timeout.
//! 4. Opening sealed frames, handing each message to a [`HostSession`], and
//!    sealing its replies.
//! 5. Pinging each authenticated phone every `ping_interval`.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! A frame that fails to open ends the connection without a reply.  The
//! WebSocket layer refuses any message larger than the codec's frame limit
//! before buffering it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use dictation_core::protocol::codec::MAX_FRAME_LEN;
use dictation_core::{decode_frame, encode_frame, DeviceIdentity, Sealer, SessionCipher, TransportMessage, WireFrame};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::events::HostEvent;
use crate::application::handshake::{answer_authenticate, host_hello, HandshakeOutcome};
use crate::application::pairing::PairingAuthority;
use crate::application::session::HostSession;
use crate::domain::config::HostConfig;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// State shared by every connection task.
struct ServerShared {
    config: HostConfig,
    identity: DeviceIdentity,
    authority: Arc<Mutex<PairingAuthority>>,
    events: mpsc::Sender<HostEvent>,
}

impl ServerShared {
    async fn emit(&self, event: HostEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// A bound, not yet running, host server.
pub struct HostServer {
    listener: TcpListener,
    shared: Arc<ServerShared>,
}

impl HostServer {
    /// Binds the listener and creates the event channel.
    ///
    /// Binding happens here rather than in [`run`](Self::run) so the caller
    /// can learn the real port (for mDNS, or when binding port 0 in tests)
    /// before any connection is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(
        config: HostConfig,
        identity: DeviceIdentity,
        authority: Arc<Mutex<PairingAuthority>>,
    ) -> anyhow::Result<(Self, mpsc::Receiver<HostEvent>)> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        let shared = Arc::new(ServerShared {
            config,
            identity,
            authority,
            events,
        });
        Ok((Self { listener, shared }, rx))
    }

    /// The address actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot report the socket address.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr().context("listener has no local address")
    }

    /// Runs the accept loop until `running` is set to `false`.
    ///
    /// Each connection gets its own task; connections already running are
    /// not interrupted when the loop stops.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; the `Result` leaves room for fatal
    /// listener errors.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let local = self.local_addr()?;
        info!("dictation host listening on ws://{local}{}", self.shared.config.path);

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    debug!("TCP connection from {peer}");
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, shared).await;
                    });
                }
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {}
            }
        }

        Ok(())
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Wraps [`run_connection`] and logs the outcome.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, shared: Arc<ServerShared>) {
    match run_connection(stream, peer, &shared).await {
        Ok(()) => info!("connection {peer} closed"),
        Err(e) => warn!("connection {peer} closed with error: {e:#}"),
    }
}

async fn run_connection(stream: TcpStream, peer: SocketAddr, shared: &ServerShared) -> anyhow::Result<()> {
    // ── Step 1: WebSocket upgrade, restricted to the configured path ──────────
    let path = shared.config.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == path {
            Ok(resp)
        } else {
            let mut refusal = ErrorResponse::new(Some("not found".to_string()));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            Err(refusal)
        }
    };
    let ws = accept_hdr_async_with_config(stream, check_path, Some(ws_config()))
        .await
        .with_context(|| format!("WebSocket upgrade failed with {peer}"))?;
    let (mut sink, mut source) = ws.split();

    // ── Step 2: pairing handshake ─────────────────────────────────────────────
    let handshake = timeout(
        shared.config.handshake_timeout,
        run_handshake(&mut sink, &mut source, peer, shared),
    )
    .await;
    let (cipher, client) = match handshake {
        Ok(Ok(Some(established))) => established,
        Ok(Ok(None)) => {
            let _ = sink.close().await;
            return Ok(());
        }
        Ok(Err(e)) => {
            let _ = sink.close().await;
            return Err(e.context("handshake failed"));
        }
        Err(_) => {
            let _ = sink.close().await;
            bail!("handshake timed out after {:?}", shared.config.handshake_timeout);
        }
    };

    info!("{peer}: session open with {} ({})", client.device_name, client.device_id);
    shared
        .emit(HostEvent::PeerAuthenticated {
            peer,
            device: client,
        })
        .await;

    // ── Step 3: sealed session ────────────────────────────────────────────────
    let result = run_session(&mut sink, &mut source, peer, shared, cipher).await;
    let _ = sink.close().await;
    shared.emit(HostEvent::PeerDisconnected { peer }).await;
    result
}

/// Runs hello → hello → authenticate → authResult.
///
/// Returns `Ok(None)` when the client was refused (the refusal has already
/// been sent).
async fn run_handshake(
    sink: &mut WsSink,
    source: &mut WsSource,
    peer: SocketAddr,
    shared: &ServerShared,
) -> anyhow::Result<Option<(SessionCipher, DeviceIdentity)>> {
    let client_hello = match recv_plain(source).await? {
        TransportMessage::Hello(hello) => hello,
        other => {
            send_plain(sink, TransportMessage::error("expected hello")).await?;
            bail!("{peer} opened with {} instead of hello", other.type_name());
        }
    };
    debug!("{peer}: hello from {}", client_hello.device_name);
    send_plain(sink, TransportMessage::Hello(host_hello(&shared.identity))).await?;

    let auth = match recv_plain(source).await? {
        TransportMessage::Authenticate(auth) => auth,
        other => {
            send_plain(sink, TransportMessage::error("expected authenticate")).await?;
            bail!("{peer} sent {} instead of authenticate", other.type_name());
        }
    };

    let outcome = {
        let mut authority = shared.authority.lock().await;
        answer_authenticate(&mut authority, &shared.identity, peer.ip(), &client_hello, &auth)
    };

    match outcome {
        HandshakeOutcome::Accepted {
            token: _,
            cipher,
            client,
            reply,
        } => {
            send_plain(sink, TransportMessage::AuthResult(reply)).await?;
            Ok(Some((cipher, client)))
        }
        HandshakeOutcome::Refused { reply, reason } => {
            info!("{peer}: pairing refused ({reason})");
            send_plain(sink, TransportMessage::AuthResult(reply)).await?;
            Ok(None)
        }
    }
}

async fn run_session(
    sink: &mut WsSink,
    source: &mut WsSource,
    peer: SocketAddr,
    shared: &ServerShared,
    cipher: SessionCipher,
) -> anyhow::Result<()> {
    let (mut sealer, mut opener) = cipher.split();
    let mut session = HostSession::new(peer);
    let period = shared.config.ping_interval;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            frame = source.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("{peer}: client closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                };

                let envelope = match decode_frame(&text) {
                    Ok(WireFrame::Sealed(envelope)) => envelope,
                    Ok(WireFrame::Plain(msg)) => {
                        warn!("{peer}: unsealed {} after handshake; closing", msg.type_name());
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("{peer}: undecodable frame; closing: {e}");
                        return Ok(());
                    }
                };

                let msg = match opener.open(&envelope) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("{peer}: integrity failure; closing: {e}");
                        return Ok(());
                    }
                };
                debug!("{peer}: ← {}", msg.type_name());

                let handled = session.handle(msg);
                if let Some(reply) = handled.reply {
                    send_sealed(sink, &mut sealer, &reply).await?;
                }
                for event in handled.events {
                    shared.emit(event).await;
                }
                if handled.close {
                    return Ok(());
                }
            }
            _ = ticker.tick() => {
                send_sealed(sink, &mut sealer, &TransportMessage::Ping).await?;
            }
        }
    }
}

// ── Frame helpers ─────────────────────────────────────────────────────────────

/// Caps WebSocket messages and frames at the codec's frame limit.
fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_FRAME_LEN);
    config.max_frame_size = Some(MAX_FRAME_LEN);
    config
}

async fn recv_plain(source: &mut WsSource) -> anyhow::Result<TransportMessage> {
    let text = loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => break text,
            Some(Ok(WsMessage::Close(_))) | None => bail!("closed during handshake"),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e).context("WebSocket read failed"),
        }
    };
    match decode_frame(&text).context("malformed handshake frame")? {
        WireFrame::Plain(msg) => Ok(msg),
        WireFrame::Sealed(_) => bail!("sealed frame during handshake"),
    }
}

async fn send_plain(sink: &mut WsSink, msg: TransportMessage) -> anyhow::Result<()> {
    debug!("handshake → {}", msg.type_name());
    let text = encode_frame(&WireFrame::Plain(msg))?;
    sink.send(WsMessage::Text(text)).await.context("WebSocket send failed")
}

async fn send_sealed(sink: &mut WsSink, sealer: &mut Sealer, msg: &TransportMessage) -> anyhow::Result<()> {
    let envelope = sealer.seal(msg).context("sealing failed")?;
    let text = encode_frame(&WireFrame::Sealed(envelope))?;
    sink.send(WsMessage::Text(text)).await.context("WebSocket send failed")
}
