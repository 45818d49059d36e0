//! Read-only per-tick views published for renderers.
//!
//! Snapshots are fanned out over a bounded crossbeam channel. When a subscriber falls behind the
//! snapshot is dropped and counted instead of blocking the control loop; the latest snapshot is
//! additionally kept on a board for readers that only care about the current state.

use crate::client::ClientId;
use crate::host::HostId;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// State of one host at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub id: HostId,
    pub busy: bool,
    /// Upload progress of the current file, 0..=100.
    pub percent: u8,
    pub client: Option<ClientId>,
}

/// State of one queued client at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub id: ClientId,
    /// Remaining files in upload order.
    pub files: Vec<u32>,
    pub wait_ticks: u64,
    pub coefficient: f64,
}

/// Running totals maintained by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub clients_admitted: u64,
    pub clients_rejected: u64,
    pub clients_served: u64,
    pub files_dispatched: u64,
    pub files_completed: u64,
    #[serde(default)]
    pub snapshots_dropped: u64,
}

/// Everything a renderer needs after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub tick: u64,
    pub clock_tick_ms: u64,
    pub speed_hz: f64,
    /// Cosmetic display line, e.g. `Time: 14:03:27 Speed: 1.00 Hz`.
    pub wall_clock: String,
    pub queued_clients: usize,
    pub hosts: Vec<HostSnapshot>,
    pub clients: Vec<ClientSnapshot>,
    pub stats: SchedulerStats,
}

impl SchedulerSnapshot {
    pub fn busy_hosts(&self) -> usize {
        self.hosts.iter().filter(|host| host.busy).count()
    }
}

/// Publishing side owned by the scheduler.
pub(crate) struct SnapshotPublisher {
    tx: Sender<Arc<SchedulerSnapshot>>,
    rx: Receiver<Arc<SchedulerSnapshot>>,
    latest: Arc<RwLock<Option<Arc<SchedulerSnapshot>>>>,
    dropped: Arc<AtomicU64>,
}

impl SnapshotPublisher {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            latest: Arc::new(RwLock::new(None)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Store `snapshot` as the latest and offer it to subscribers without blocking.
    pub(crate) fn publish(&self, snapshot: SchedulerSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self.latest.write() = Some(snapshot.clone());
        match self.tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // The publisher keeps its own receiver alive, so the channel never disconnects.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn subscription(&self) -> SnapshotSubscription {
        SnapshotSubscription {
            rx: self.rx.clone(),
            latest: self.latest.clone(),
        }
    }
}

/// Consumer side of the snapshot stream.
///
/// Clones share one channel: each snapshot is delivered to exactly one of them. Use a single
/// subscription per renderer and [`SnapshotSubscription::latest`] for ad-hoc reads.
#[derive(Clone)]
pub struct SnapshotSubscription {
    rx: Receiver<Arc<SchedulerSnapshot>>,
    latest: Arc<RwLock<Option<Arc<SchedulerSnapshot>>>>,
}

impl SnapshotSubscription {
    /// Most recently published snapshot, if any tick has run.
    pub fn latest(&self) -> Option<Arc<SchedulerSnapshot>> {
        self.latest.read().clone()
    }

    pub fn receiver(&self) -> &Receiver<Arc<SchedulerSnapshot>> {
        &self.rx
    }

    pub fn try_recv(&self) -> Option<Arc<SchedulerSnapshot>> {
        self.rx.try_recv().ok()
    }
}
