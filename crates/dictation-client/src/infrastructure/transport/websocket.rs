//! WebSocket links to companion hosts.
//!
//! Each protocol frame travels as one WebSocket *text* message.  Control
//! frames (WebSocket-level ping/pong) are handled by `tokio-tungstenite`
//! and never reach the session manager; binary messages are not part of the
//! protocol and are skipped with a warning.  Messages larger than the
//! codec's frame limit are refused by the WebSocket layer itself.

use async_trait::async_trait;
use dictation_core::protocol::codec::MAX_FRAME_LEN;
use dictation_core::DiscoveredHost;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig, Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::application::link::{Connector, FrameSink, FrameSource, Link, LinkError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` links to discovered hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, host: &DiscoveredHost) -> Result<Link, LinkError> {
        let url = host.websocket_url();
        let (stream, _response) = connect_async_with_config(url.as_str(), Some(ws_config()), false)
            .await
            .map_err(|e| LinkError::Connect {
                target: url.clone(),
                reason: e.to_string(),
            })?;
        info!("WebSocket link open to {} ({url})", host.display_name);

        let (sink, source) = stream.split();
        Ok(Link {
            sink: Box::new(WsSink { inner: sink }),
            source: Box::new(WsSource { inner: source }),
        })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, WsMessage>,
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), LinkError> {
        self.inner.send(WsMessage::Text(frame)).await.map_err(map_ws_error)
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            debug!("WebSocket close: {e}");
        }
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Result<Option<String>, LinkError> {
        loop {
            match self.inner.next().await {
                None => return Ok(None),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(map_ws_error(e)),
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text)),
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!("ignoring unexpected binary WebSocket message ({} bytes)", data.len());
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
            }
        }
    }
}

/// Caps WebSocket messages and frames at the codec's frame limit.
fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_FRAME_LEN);
    config.max_frame_size = Some(MAX_FRAME_LEN);
    config
}

fn map_ws_error(e: WsError) -> LinkError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => LinkError::Closed,
        other => LinkError::Io(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
