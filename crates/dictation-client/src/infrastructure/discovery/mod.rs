//! Service Directory: finds companion hosts on the local network.
//!
//! # How discovery works (for beginners)
//!
//! Hosts advertise the `_dictation._tcp.local.` service over multicast DNS,
//! the same mechanism printers and AirPlay speakers use.  The directory asks
//! a [`BrowseBackend`] to browse for that service type and folds the
//! resulting events into a [`HostDirectory`].  After every change it
//! publishes a fresh [`DirectorySnapshot`] on a `tokio::sync::watch`
//! channel, which the UI (or a test) can read at any time or await changes
//! on.
//!
//! ```text
//! mdns-sd daemon ──ServiceEvent──► MdnsBackend ──BrowseEvent──► browse task
//!                                                                  │ HostDirectory
//!                                                                  ▼
//!                                         watch::Sender<DirectorySnapshot>
//! ```
//!
//! The directory never touches session state; it only produces candidates.
//! A browse failure publishes `searching = false` with no hosts.  Retrying
//! is the caller's decision: call [`ServiceDirectory::start_searching`]
//! again.

pub mod directory;
pub mod mdns;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dictation_core::DiscoveredHost;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use directory::{BrowseEvent, HostDirectory, ResolvedService};

use crate::infrastructure::storage::config::ClientConfig;
pub use mdns::MdnsBackend;

/// Errors reported by discovery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The mDNS daemon could not be started.
    #[error("failed to start mDNS daemon: {0}")]
    Daemon(String),
    /// The browse request was refused.
    #[error("failed to browse for {service_type}: {reason}")]
    Browse { service_type: String, reason: String },
}

/// Source of browse events for one service type.
pub trait BrowseBackend: Send + Sync {
    /// Starts browsing.  Events arrive on the returned channel until the
    /// browse is stopped or fails.
    fn browse(&self, service_type: &str) -> Result<mpsc::Receiver<BrowseEvent>, DiscoveryError>;

    /// Stops a browse started with [`browse`](Self::browse).
    fn stop_browse(&self, service_type: &str);
}

/// What the directory currently knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    /// `true` while a browse is running.
    pub searching: bool,
    /// Current candidates, one per endpoint.
    pub hosts: Vec<DiscoveredHost>,
}

/// Long-lived browse for companion hosts, observable through a `watch`
/// channel.
pub struct ServiceDirectory {
    backend: Arc<dyn BrowseBackend>,
    service_type: String,
    snapshot_tx: Arc<watch::Sender<DirectorySnapshot>>,
    epoch: Arc<AtomicU64>,
    /// Epoch of the running browse, or 0 when none is running.  The browse
    /// task clears it before publishing its final snapshot.
    active: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceDirectory {
    /// Creates an idle directory browsing `service_type` through `backend`.
    pub fn new(backend: Arc<dyn BrowseBackend>, service_type: impl Into<String>) -> Self {
        let (snapshot_tx, _) = watch::channel(DirectorySnapshot::default());
        Self {
            backend,
            service_type: service_type.into(),
            snapshot_tx: Arc::new(snapshot_tx),
            epoch: Arc::new(AtomicU64::new(0)),
            active: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Creates an idle directory browsing the service type named in `config`.
    pub fn from_config(backend: Arc<dyn BrowseBackend>, config: &ClientConfig) -> Self {
        Self::new(backend, config.service_type.clone())
    }

    /// Subscribes to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<DirectorySnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> DirectorySnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Starts the browse.  Does nothing if a browse is already running.
    ///
    /// # Errors
    ///
    /// Returns the backend's error after publishing `searching = false`.
    pub async fn start_searching(&self) -> Result<(), DiscoveryError> {
        let mut task = self.task.lock().await;
        if self.active.load(Ordering::SeqCst) != 0 {
            debug!("browse for {} already running", self.service_type);
            return Ok(());
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let events = match self.backend.browse(&self.service_type) {
            Ok(events) => events,
            Err(e) => {
                warn!("browse for {} failed: {e}", self.service_type);
                self.snapshot_tx.send_replace(DirectorySnapshot::default());
                return Err(e);
            }
        };

        info!("browsing for {}", self.service_type);
        self.active.store(epoch, Ordering::SeqCst);
        publish(&self.snapshot_tx, &self.epoch, epoch, DirectorySnapshot {
            searching: true,
            hosts: Vec::new(),
        });

        let browse = BrowseTask {
            snapshot_tx: Arc::clone(&self.snapshot_tx),
            current: Arc::clone(&self.epoch),
            active: Arc::clone(&self.active),
            epoch,
        };
        *task = Some(tokio::spawn(browse.run(events)));
        Ok(())
    }

    /// Stops the browse and clears the candidate set.
    pub async fn stop_searching(&self) {
        let mut task = self.task.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.active.store(0, Ordering::SeqCst);
        if let Some(handle) = task.take() {
            handle.abort();
            self.backend.stop_browse(&self.service_type);
            info!("stopped browsing for {}", self.service_type);
        }
        self.snapshot_tx.send_replace(DirectorySnapshot::default());
    }
}

/// Publishes `snapshot` only if no stop/start happened since `epoch` began.
fn publish(tx: &watch::Sender<DirectorySnapshot>, current: &AtomicU64, epoch: u64, snapshot: DirectorySnapshot) {
    tx.send_if_modified(|value| {
        if current.load(Ordering::SeqCst) != epoch || *value == snapshot {
            return false;
        }
        *value = snapshot;
        true
    });
}

/// One running browse, tagged with the epoch it was started in.
struct BrowseTask {
    snapshot_tx: Arc<watch::Sender<DirectorySnapshot>>,
    current: Arc<AtomicU64>,
    active: Arc<AtomicU64>,
    epoch: u64,
}

impl BrowseTask {
    async fn run(self, mut events: mpsc::Receiver<BrowseEvent>) {
        let mut directory = HostDirectory::new();
        while let Some(event) = events.recv().await {
            if let BrowseEvent::Failed(reason) = &event {
                warn!("browse failed: {reason}");
                break;
            }
            if directory.apply(&event) {
                let hosts = directory.hosts();
                debug!("{} host(s) discovered", hosts.len());
                publish(&self.snapshot_tx, &self.current, self.epoch, DirectorySnapshot { searching: true, hosts });
            }
        }
        // Only the browse that is still current may mark the directory idle.
        let _ = self.active.compare_exchange(self.epoch, 0, Ordering::SeqCst, Ordering::SeqCst);
        publish(&self.snapshot_tx, &self.current, self.epoch, DirectorySnapshot::default());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
