//! Connection / Session Manager: the state machine that owns the one active
//! session.
//!
//! # States (for beginners)
//!
//! ```text
//!              connect()            link open          authResult ok
//! Disconnected ─────────► Connecting ────────► Authenticating ────────► Connected
//!      ▲                                                                    │
//!      └──────────── disconnect() / integrity failure / remote error ◄──────┘
//! ```
//!
//! `Error(message)` can be entered from any state and always means the
//! underlying link has been (or is being) closed.  `disconnect()` from any
//! state, including `Error`, ends in `Disconnected`.
//!
//! # Ownership
//!
//! All session material (the token, both direction keys, the nonce counters,
//! and the application sequence counter) lives inside the manager's private
//! slot and is dropped, and therefore zeroed, when the session ends.  Once
//! connected, two background tasks run per session:
//!
//! - a **reader** that opens inbound envelopes, answers `ping` with `pong`,
//!   and tears the session down on any integrity failure;
//! - a **keepalive** that sends a sealed `ping` every `ping_interval` and
//!   declares the host lost after `ping_timeout` of silence.
//!
//! Every state transition happens while holding the slot lock, so the state
//! published on the watch channel always matches what the slot holds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dictation_core::protocol::messages::{
    AckMessage, SessionEndMessage, SessionStartMessage, TranscriptChunkMessage,
};
use dictation_core::protocol::sequence::SequenceCounter;
use dictation_core::{
    decode_frame, encode_frame, DeviceIdentity, DiscoveredHost, Opener, PairingCode, Sealer, SessionToken,
    TransportMessage, WireFrame,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::application::handshake::{client_handshake, Established, HandshakeError};
use crate::application::link::{Connector, FrameSink, FrameSource, Link};
use crate::infrastructure::storage::config::ClientConfig;

/// Message shown for every mid-session failure.  Integrity details stay in
/// the log.
const CONNECTION_LOST: &str = "connection lost";

/// Message shown when the host does not answer the handshake in time.
const NOT_CONNECTED: &str = "not connected";

// ── Public types ──────────────────────────────────────────────────────────────

/// Where the manager is in the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Authenticating => f.write_str("authenticating"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Error(message) => write!(f, "error({message})"),
        }
    }
}

/// Notifications delivered on the manager's event channel, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// The host acknowledged a session or chunk.
    Acknowledged(AckMessage),
    /// The host reported an error; the session has been torn down.
    RemoteError(String),
}

/// Outcome of a send call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was sealed and written to the link.
    Sent,
    /// No session was connected, so nothing was sent.
    Skipped,
}

/// Errors returned by [`SessionManager`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `connect` was called while a handshake or session is in progress.
    #[error("a session is already connecting or connected")]
    AlreadyActive,

    /// The pairing attempt failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// `disconnect` was called while the attempt was in progress.
    #[error("pairing attempt was cancelled")]
    Cancelled,

    /// The session failed while sending and has been torn down.
    #[error("connection lost")]
    ConnectionLost,

    /// A session duration was NaN or infinite; JSON cannot carry it.
    #[error("session duration must be a finite number of seconds, got {0}")]
    InvalidDuration(f64),
}

// ── Session internals ─────────────────────────────────────────────────────────

/// Write side of an active session.  Locked for the whole seal-and-write so
/// nonces and sequence numbers go out in the order they were assigned.
struct Outbound {
    sink: Box<dyn FrameSink>,
    sealer: Option<Sealer>,
    sequence: SequenceCounter,
}

impl Outbound {
    async fn send(&mut self, msg: &TransportMessage) -> Result<Delivery, SessionError> {
        let Some(sealer) = self.sealer.as_mut() else {
            return Ok(Delivery::Skipped);
        };
        let envelope = sealer.seal(msg).map_err(|e| {
            warn!("cannot seal {}: {e}", msg.type_name());
            SessionError::ConnectionLost
        })?;
        let frame = encode_frame(&WireFrame::Sealed(envelope)).map_err(|e| {
            warn!("cannot encode {}: {e}", msg.type_name());
            SessionError::ConnectionLost
        })?;
        self.sink.send(frame).await.map_err(|e| {
            warn!("send of {} failed: {e}", msg.type_name());
            SessionError::ConnectionLost
        })?;
        debug!("→ {}", msg.type_name());
        Ok(Delivery::Sent)
    }

    /// Drops the outbound key and closes the link.
    async fn close(&mut self) {
        self.sealer = None;
        self.sink.close().await;
    }
}

/// Time of the last inbound frame, shared by the reader and the keepalive.
struct Liveness {
    base: Instant,
    last_ms: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.base.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let now = self.base.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Relaxed)))
    }
}

struct ActiveSession {
    generation: u64,
    token: SessionToken,
    outbound: Arc<Mutex<Outbound>>,
    shutdown: watch::Sender<bool>,
}

impl ActiveSession {
    async fn close(self) {
        let _ = self.shutdown.send(true);
        self.outbound.lock().await.close().await;
    }
}

enum Slot {
    Idle,
    Handshaking { attempt: u64, cancel: watch::Sender<bool> },
    Active(ActiveSession),
}

struct Shared {
    identity: DeviceIdentity,
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::Sender<SessionEvent>,
    slot: Mutex<Slot>,
    attempts: AtomicU64,
}

impl Shared {
    /// Publishes `next` if it differs from the current state.  Callers hold
    /// the slot lock.
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next.clone();
            true
        });
        if changed {
            info!("connection state → {next}");
            self.emit(SessionEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SessionEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("session event channel full; dropping {event:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Moves a still-current attempt to `next`.
    async fn advance(&self, attempt: u64, next: ConnectionState) {
        let slot = self.slot.lock().await;
        if matches!(&*slot, Slot::Handshaking { attempt: a, .. } if *a == attempt) {
            self.set_state(next);
        }
    }

    /// Resets the slot if `attempt` is still the one in progress.
    async fn abandon(&self, attempt: u64) {
        let mut slot = self.slot.lock().await;
        if matches!(&*slot, Slot::Handshaking { attempt: a, .. } if *a == attempt) {
            *slot = Slot::Idle;
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Ends session `generation` in `state`.  Does nothing if that session
    /// is already gone.
    async fn teardown(&self, generation: u64, state: ConnectionState) {
        let mut slot = self.slot.lock().await;
        if !matches!(&*slot, Slot::Active(active) if active.generation == generation) {
            return;
        }
        let Slot::Active(active) = std::mem::replace(&mut *slot, Slot::Idle) else {
            return;
        };
        self.set_state(state);
        drop(slot);
        active.close().await;
    }
}

/// Resets the slot if a `connect` future is dropped before it finishes.
struct AttemptGuard {
    shared: Arc<Shared>,
    attempt: u64,
    armed: bool,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let attempt = self.attempt;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { shared.abandon(attempt).await });
        }
    }
}

// ── SessionManager ────────────────────────────────────────────────────────────

/// Drives discovery results through pairing into an encrypted session.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Creates a disconnected manager and the receiver for its events.
    pub fn new(
        identity: DeviceIdentity,
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Shared {
            identity,
            config,
            connector,
            state_tx,
            event_tx,
            slot: Mutex::new(Slot::Idle),
            attempts: AtomicU64::new(0),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            event_rx,
        )
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watch channel of the current state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The token issued by the host, while connected.
    pub async fn session_token(&self) -> Option<SessionToken> {
        match &*self.shared.slot.lock().await {
            Slot::Active(active) => Some(active.token.clone()),
            _ => None,
        }
    }

    /// `true` while session keys are held.
    pub async fn has_session_key(&self) -> bool {
        matches!(&*self.shared.slot.lock().await, Slot::Active(_))
    }

    /// Pairs with `host` using `code` and, on success, starts the session.
    ///
    /// Opening the link and the whole handshake are bounded together by the
    /// configured handshake timeout.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyActive`] if connecting or connected.
    /// - [`SessionError::Handshake`] if the attempt failed.  The state is
    ///   `Disconnected` after a rejection, `Error("not connected")` after a
    ///   timeout, and `Error(reason)` otherwise.
    /// - [`SessionError::Cancelled`] if [`disconnect`](Self::disconnect) was
    ///   called meanwhile.
    pub async fn connect(&self, host: &DiscoveredHost, code: PairingCode) -> Result<(), SessionError> {
        let shared = &self.shared;
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        let mut cancel_rx = {
            let mut slot = shared.slot.lock().await;
            if !matches!(*slot, Slot::Idle) {
                return Err(SessionError::AlreadyActive);
            }
            let (cancel_tx, cancel_rx) = watch::channel(false);
            *slot = Slot::Handshaking {
                attempt,
                cancel: cancel_tx,
            };
            shared.set_state(ConnectionState::Connecting);
            cancel_rx
        };
        let mut guard = AttemptGuard {
            shared: Arc::clone(shared),
            attempt,
            armed: true,
        };
        info!("pairing with {} at {}", host.display_name, host.websocket_url());

        let outcome = tokio::select! {
            _ = stopped(&mut cancel_rx) => Err(SessionError::Cancelled),
            result = tokio::time::timeout(
                shared.config.handshake_timeout(),
                open_and_handshake(shared, host, &code, attempt),
            ) => match result {
                Ok(Ok(established)) => Ok(established),
                Ok(Err(e)) => Err(SessionError::Handshake(e)),
                Err(_) => Err(SessionError::Handshake(HandshakeError::Timeout)),
            },
        };

        let mut slot = shared.slot.lock().await;
        guard.armed = false;
        let current = matches!(&*slot, Slot::Handshaking { attempt: a, .. } if *a == attempt);

        match outcome {
            Ok((link, established)) if current => {
                info!(
                    "paired with {} ({})",
                    established.host.device_name, established.host.device_id
                );
                *slot = Slot::Active(start_session(shared, attempt, link, established));
                shared.set_state(ConnectionState::Connected);
                Ok(())
            }
            Ok((mut link, _)) => {
                drop(slot);
                link.sink.close().await;
                Err(SessionError::Cancelled)
            }
            Err(e) if current => {
                *slot = Slot::Idle;
                warn!("pairing with {} failed: {e}", host.display_name);
                shared.set_state(failure_state(&e));
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Sends the next transcript chunk of the current transcription session.
    ///
    /// Returns [`Delivery::Skipped`] without sending if not connected.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConnectionLost`] if the write failed; the session has
    /// been torn down.
    pub async fn send_transcript_chunk(
        &self,
        session_id: &str,
        text: &str,
        is_final: bool,
    ) -> Result<Delivery, SessionError> {
        self.send_with(|out| {
            TransportMessage::TranscriptChunk(TranscriptChunkMessage {
                session_id: session_id.to_string(),
                sequence_number: out.sequence.next(),
                text: text.to_string(),
                is_final,
            })
        })
        .await
    }

    /// Opens a transcription session and restarts chunk numbering.
    pub async fn send_session_start(&self, session_id: &str, model: &str) -> Result<Delivery, SessionError> {
        self.send_with(|out| {
            out.sequence.reset();
            TransportMessage::SessionStart(SessionStartMessage {
                session_id: session_id.to_string(),
                model: model.to_string(),
            })
        })
        .await
    }

    /// Closes a transcription session.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidDuration`] for a non-finite `duration`; nothing
    /// is sent and the session stays up.  Otherwise as
    /// [`send_transcript_chunk`](Self::send_transcript_chunk).
    pub async fn send_session_end(
        &self,
        session_id: &str,
        final_text: &str,
        duration: f64,
        word_count: u64,
    ) -> Result<Delivery, SessionError> {
        if !duration.is_finite() {
            return Err(SessionError::InvalidDuration(duration));
        }
        self.send_with(|_| {
            TransportMessage::SessionEnd(SessionEndMessage {
                session_id: session_id.to_string(),
                final_text: final_text.to_string(),
                duration,
                word_count,
            })
        })
        .await
    }

    /// Ends whatever is in progress and returns to `Disconnected`.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let mut slot = self.shared.slot.lock().await;
        let previous = std::mem::replace(&mut *slot, Slot::Idle);
        self.shared.set_state(ConnectionState::Disconnected);
        drop(slot);

        match previous {
            Slot::Idle => {}
            Slot::Handshaking { cancel, .. } => {
                let _ = cancel.send(true);
                info!("pairing attempt cancelled");
            }
            Slot::Active(active) => {
                active.close().await;
                info!("disconnected");
            }
        }
    }

    async fn send_with<F>(&self, build: F) -> Result<Delivery, SessionError>
    where
        F: FnOnce(&Outbound) -> TransportMessage,
    {
        let (generation, outbound) = match &*self.shared.slot.lock().await {
            Slot::Active(active) => (active.generation, Arc::clone(&active.outbound)),
            _ => {
                debug!("not connected; message not sent");
                return Ok(Delivery::Skipped);
            }
        };

        let result = {
            let mut out = outbound.lock().await;
            let msg = build(&out);
            out.send(&msg).await
        };
        if result.is_err() {
            self.shared
                .teardown(generation, ConnectionState::Error(CONNECTION_LOST.to_string()))
                .await;
        }
        result
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("device_id", &self.shared.identity.device_id)
            .field("state", &self.state())
            .finish()
    }
}

fn failure_state(err: &SessionError) -> ConnectionState {
    match err {
        SessionError::Handshake(HandshakeError::Timeout) => ConnectionState::Error(NOT_CONNECTED.to_string()),
        SessionError::Handshake(e) if e.is_rejection() => ConnectionState::Disconnected,
        other => ConnectionState::Error(other.to_string()),
    }
}

async fn open_and_handshake(
    shared: &Shared,
    host: &DiscoveredHost,
    code: &PairingCode,
    attempt: u64,
) -> Result<(Link, Established), HandshakeError> {
    let mut link = shared.connector.open(host).await?;
    shared.advance(attempt, ConnectionState::Authenticating).await;
    match client_handshake(link.sink.as_mut(), link.source.as_mut(), &shared.identity, code).await {
        Ok(established) => Ok((link, established)),
        Err(e) => {
            link.sink.close().await;
            Err(e)
        }
    }
}

fn start_session(shared: &Arc<Shared>, generation: u64, link: Link, established: Established) -> ActiveSession {
    let Link { sink, source } = link;
    let Established { token, cipher, .. } = established;
    let (sealer, opener) = cipher.split();

    let outbound = Arc::new(Mutex::new(Outbound {
        sink,
        sealer: Some(sealer),
        sequence: SequenceCounter::new(),
    }));
    let liveness = Arc::new(Liveness::new());
    liveness.touch();
    let (shutdown, shutdown_rx) = watch::channel(false);

    tokio::spawn(read_loop(
        Arc::clone(shared),
        generation,
        source,
        opener,
        Arc::clone(&outbound),
        Arc::clone(&liveness),
        shutdown_rx.clone(),
    ));
    tokio::spawn(keepalive_loop(
        Arc::clone(shared),
        generation,
        Arc::clone(&outbound),
        liveness,
        shutdown_rx,
    ));

    ActiveSession {
        generation,
        token,
        outbound,
        shutdown,
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

/// Resolves once the flag is raised or its sender is gone.
async fn stopped(flag: &mut watch::Receiver<bool>) {
    loop {
        if *flag.borrow_and_update() {
            return;
        }
        if flag.changed().await.is_err() {
            return;
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    generation: u64,
    mut source: Box<dyn FrameSource>,
    mut opener: Opener,
    outbound: Arc<Mutex<Outbound>>,
    liveness: Arc<Liveness>,
    mut shutdown: watch::Receiver<bool>,
) {
    let lost = || ConnectionState::Error(CONNECTION_LOST.to_string());
    loop {
        let frame = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            frame = source.recv() => frame,
        };
        let text = match frame {
            Ok(Some(text)) => text,
            Ok(None) => {
                info!("host closed the link");
                shared.teardown(generation, lost()).await;
                break;
            }
            Err(e) => {
                warn!("link failed: {e}");
                shared.teardown(generation, lost()).await;
                break;
            }
        };
        liveness.touch();

        let msg = match decode_frame(&text) {
            Ok(WireFrame::Sealed(envelope)) => match opener.open(&envelope) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("rejecting inbound envelope: {e}");
                    shared.teardown(generation, lost()).await;
                    break;
                }
            },
            Ok(WireFrame::Plain(msg)) => {
                warn!("unsealed {} after authentication", msg.type_name());
                shared.teardown(generation, lost()).await;
                break;
            }
            Err(e) => {
                warn!("undecodable frame: {e}");
                shared.teardown(generation, lost()).await;
                break;
            }
        };
        debug!("← {}", msg.type_name());

        match msg {
            TransportMessage::Ping => {
                let result = outbound.lock().await.send(&TransportMessage::Pong).await;
                if result.is_err() {
                    shared.teardown(generation, lost()).await;
                    break;
                }
            }
            TransportMessage::Pong => {}
            TransportMessage::Ack(ack) => {
                debug!("ack for {:?} #{:?}", ack.session_id, ack.sequence_number);
                shared.emit(SessionEvent::Acknowledged(ack));
            }
            TransportMessage::Error(e) => {
                warn!("host reported error: {}", e.message);
                shared.emit(SessionEvent::RemoteError(e.message.clone()));
                shared.teardown(generation, ConnectionState::Error(e.message)).await;
                break;
            }
            other => warn!("ignoring unexpected {} from host", other.type_name()),
        }
    }
    debug!("reader for session {generation} stopped");
}

async fn keepalive_loop(
    shared: Arc<Shared>,
    generation: u64,
    outbound: Arc<Mutex<Outbound>>,
    liveness: Arc<Liveness>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = shared.config.ping_interval();
    let timeout = shared.config.ping_timeout();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        if liveness.idle() > timeout {
            warn!("no traffic from host for {:?}", liveness.idle());
            shared
                .teardown(generation, ConnectionState::Error(CONNECTION_LOST.to_string()))
                .await;
            break;
        }

        let result = outbound.lock().await.send(&TransportMessage::Ping).await;
        if result.is_err() {
            shared
                .teardown(generation, ConnectionState::Error(CONNECTION_LOST.to_string()))
                .await;
            break;
        }
    }
    debug!("keepalive for session {generation} stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
