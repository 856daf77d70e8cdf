//! In-memory duplex links.
//!
//! Each side of a [`pair`] owns an unbounded sender to the other side's
//! receiver.  Closing a sink (or dropping it) ends the peer's stream, which
//! is how a real socket behaves from the protocol's point of view.

use std::sync::Mutex;

use async_trait::async_trait;
use dictation_core::DiscoveredHost;
use tokio::sync::mpsc;

use crate::application::link::{Connector, FrameSink, FrameSource, Link, LinkError};

/// Write half of an in-memory link.
#[derive(Debug)]
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

/// Read half of an in-memory link.
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<(), LinkError> {
        let tx = self.tx.as_ref().ok_or(LinkError::Closed)?;
        tx.send(frame).map_err(|_| LinkError::Closed)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<String>, LinkError> {
        Ok(self.rx.recv().await)
    }
}

/// Creates two connected links.  Frames sent on one arrive on the other.
pub fn pair() -> (Link, Link) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let a = Link {
        sink: Box::new(MemorySink { tx: Some(a_tx) }),
        source: Box::new(MemorySource { rx: a_rx }),
    };
    let b = Link {
        sink: Box::new(MemorySink { tx: Some(b_tx) }),
        source: Box::new(MemorySource { rx: b_rx }),
    };
    (a, b)
}

/// A connector whose "network" is a queue of accepted links.
///
/// Every [`open`](Connector::open) creates a fresh [`pair`], returns one end
/// to the caller, and pushes the other end onto the accept queue returned by
/// [`MemoryConnector::new`].  Dropping that queue makes further opens fail
/// as if the host were unreachable.
#[derive(Debug)]
pub struct MemoryConnector {
    accepted: Mutex<Option<mpsc::UnboundedSender<Link>>>,
}

impl MemoryConnector {
    /// Creates the connector and its accept queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Link>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Makes every later `open` fail with a connect error.
    pub fn refuse_connections(&self) {
        if let Ok(mut guard) = self.accepted.lock() {
            *guard = None;
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, host: &DiscoveredHost) -> Result<Link, LinkError> {
        let refused = || LinkError::Connect {
            target: host.websocket_url(),
            reason: "connection refused".to_string(),
        };
        let (local, remote) = pair();
        let guard = self.accepted.lock().map_err(|_| refused())?;
        let tx = guard.as_ref().ok_or_else(refused)?;
        tx.send(remote).map_err(|_| refused())?;
        Ok(local)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
