//! Dictation host: entry point.
//!
//! Shows a pairing code, advertises `_dictation._tcp.local.` over mDNS, and
//! accepts encrypted transcript streams from paired phones.  Every
//! [`HostEvent`] is written to the log.
//!
//! # Usage
//!
//! ```text
//! dictation-host [OPTIONS]
//!
//! Options:
//!   --bind <IP>                     Listener address [default: 0.0.0.0]
//!   --port <PORT>                   Listener port [default: 7040]
//!   --path <PATH>                   WebSocket path [default: /dictation]
//!   --name <NAME>                   Advertised display name [default: Dictation Host]
//!   --ping-interval <SECS>          Keepalive ping interval [default: 10]
//!   --handshake-timeout <SECS>      Pairing handshake deadline [default: 5]
//!   --identity-file <PATH>          host.toml location [default: platform config dir]
//!   --no-advertise                  Do not register the mDNS service
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                      | Default          |
//! |-------------------------------|------------------|
//! | `DICTATION_BIND`              | `0.0.0.0`        |
//! | `DICTATION_PORT`              | `7040`           |
//! | `DICTATION_PATH`              | `/dictation`     |
//! | `DICTATION_NAME`              | `Dictation Host` |
//! | `DICTATION_PING_INTERVAL`     | `10`             |
//! | `DICTATION_HANDSHAKE_TIMEOUT` | `5`              |
//! | `DICTATION_IDENTITY_FILE`     | (platform)       |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dictation_host::infrastructure::advertiser::MdnsAdvertiser;
use dictation_host::infrastructure::storage::{default_identity_path, load_or_create_identity};
use dictation_host::{HostConfig, HostEvent, HostServer, PairingAuthority};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Companion host for voice dictation.
#[derive(Debug, Parser)]
#[command(
    name = "dictation-host",
    about = "Receives encrypted transcript streams from paired phones",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0", env = "DICTATION_BIND")]
    bind: String,

    /// TCP port of the WebSocket listener.
    #[arg(long, default_value_t = 7040, env = "DICTATION_PORT")]
    port: u16,

    /// WebSocket path; other paths are answered with 404.
    #[arg(long, default_value = "/dictation", env = "DICTATION_PATH")]
    path: String,

    /// Name shown to phones browsing the network.
    #[arg(long, default_value = "Dictation Host", env = "DICTATION_NAME")]
    name: String,

    /// Seconds between keepalive pings to a paired phone.
    #[arg(long, default_value_t = 10, env = "DICTATION_PING_INTERVAL")]
    ping_interval: u64,

    /// Seconds a phone has to complete the pairing handshake.
    #[arg(long, default_value_t = 5, env = "DICTATION_HANDSHAKE_TIMEOUT")]
    handshake_timeout: u64,

    /// Location of host.toml (the persistent device identity).
    #[arg(long, env = "DICTATION_IDENTITY_FILE")]
    identity_file: Option<PathBuf>,

    /// Skip mDNS registration; phones must be pointed at the host by hand.
    #[arg(long)]
    no_advertise: bool,
}

impl Cli {
    /// Converts the parsed arguments into a [`HostConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable bind address, a path not starting
    /// with `/`, or zero-second intervals.
    fn into_host_config(&self) -> anyhow::Result<HostConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;
        ensure!(self.path.starts_with('/'), "WebSocket path must start with '/': '{}'", self.path);
        ensure!(self.ping_interval > 0, "ping interval must be at least one second");
        ensure!(self.handshake_timeout > 0, "handshake timeout must be at least one second");

        Ok(HostConfig {
            bind_addr,
            path: self.path.clone(),
            display_name: self.name.clone(),
            ping_interval: Duration::from_secs(self.ping_interval),
            handshake_timeout: Duration::from_secs(self.handshake_timeout),
            ..HostConfig::default()
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.into_host_config()?;

    let identity_path = match &cli.identity_file {
        Some(path) => path.clone(),
        None => default_identity_path()?,
    };
    let mut identity = load_or_create_identity(&identity_path, &config.display_name)
        .with_context(|| format!("failed to load host identity from {identity_path:?}"))?;
    identity.device_name = config.display_name.clone();

    let authority = PairingAuthority::new();
    info!("pairing code: {}", authority.code().as_str());
    let authority = Arc::new(Mutex::new(authority));

    let (server, events) = HostServer::bind(config.clone(), identity, authority).await?;
    let port = server.local_addr()?.port();

    // Held until shutdown; dropping it withdraws the advertisement.
    let _advertiser = if cli.no_advertise {
        None
    } else {
        match MdnsAdvertiser::register(&config.display_name, port, &config.path) {
            Ok(advertiser) => Some(advertiser),
            Err(e) => {
                warn!("mDNS advertisement unavailable, phones must connect by address: {e}");
                None
            }
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    tokio::spawn(log_events(events));

    server.run(running).await?;
    info!("dictation host stopped");
    Ok(())
}

async fn log_events(mut events: mpsc::Receiver<HostEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::PeerAuthenticated { peer, device } => {
                info!("paired with {} ({}) at {peer}", device.device_name, device.device_id)
            }
            HostEvent::SessionStarted { session_id, model, .. } => {
                info!("[{session_id}] started with {model}")
            }
            HostEvent::TranscriptReceived {
                session_id,
                sequence_number,
                text,
                is_final,
                ..
            } => {
                let marker = if is_final { "final" } else { "partial" };
                info!("[{session_id}] #{sequence_number} ({marker}): {text}")
            }
            HostEvent::SequenceGap {
                session_id,
                expected,
                received,
                ..
            } => warn!("[{session_id}] expected chunk {expected}, got {received}"),
            HostEvent::SessionMismatch { active, received, .. } => match active {
                Some(active) => warn!("[{received}] chunk arrived while session {active} is active"),
                None => warn!("[{received}] chunk arrived before sessionStart"),
            },
            HostEvent::SessionEnded {
                session_id,
                final_text,
                duration,
                word_count,
                ..
            } => info!("[{session_id}] ended after {duration:.1}s, {word_count} words: {final_text}"),
            HostEvent::PeerDisconnected { peer } => info!("{peer} disconnected"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
