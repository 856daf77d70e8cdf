//! Transport-agnostic frame links.
//!
//! The protocol only ever exchanges whole JSON text frames, so a link is
//! modelled as a pair of halves: a [`FrameSink`] that the writer side owns
//! and a [`FrameSource`] that the reader task owns.  Keeping them separate
//! lets the reader block on `recv` while other tasks keep sending.

use async_trait::async_trait;
use dictation_core::DiscoveredHost;
use thiserror::Error;

/// Errors raised by a link implementation.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The connection to the host could not be established.
    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// The link was closed, locally or by the peer.
    #[error("link closed")]
    Closed,

    /// Any other I/O or framing failure on an established link.
    #[error("link I/O error: {0}")]
    Io(String),
}

/// Write half of a link.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one text frame.
    async fn send(&mut self, frame: String) -> Result<(), LinkError>;

    /// Closes the link.  Safe to call more than once.
    async fn close(&mut self);
}

/// Read half of a link.
#[async_trait]
pub trait FrameSource: Send {
    /// Receives the next text frame, or `Ok(None)` once the peer has closed.
    async fn recv(&mut self) -> Result<Option<String>, LinkError>;
}

/// An established link, split into its two halves.
pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Link { .. }")
    }
}

/// Opens links to discovered hosts.
///
/// Production code uses the WebSocket connector; tests inject an in-memory
/// connector so the session manager can be driven against a scripted host.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a fresh link to `host`.
    async fn open(&self, host: &DiscoveredHost) -> Result<Link, LinkError>;
}
