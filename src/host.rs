//! Fixed pool of upload hosts.
//!
//! Assignment state (`busy` plus the served client) belongs to the scheduler alone. Upload
//! progress lives in a separate lock-free table because it is written by the host's worker and
//! read by renderers at any time.

use crate::client::ClientId;
use crate::error::{Result, StateFault};
use crate::snapshot::HostSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Host identity, 1-based and stable for the lifetime of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub usize);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Assignment state of a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    client: Option<ClientId>,
}

impl Host {
    pub fn is_busy(&self) -> bool {
        self.client.is_some()
    }

    /// Client whose file is being uploaded, present iff the host is busy.
    pub fn client(&self) -> Option<ClientId> {
        self.client
    }
}

/// Per-host upload percentage (0..=100), shared between workers and readers.
#[derive(Debug)]
pub struct HostProgress {
    slots: Vec<AtomicU8>,
}

impl HostProgress {
    fn new(host_count: usize) -> Self {
        Self {
            slots: (0..host_count).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    /// Current percentage for a host; unknown hosts read as 0.
    pub fn percent(&self, host: HostId) -> u8 {
        self.slot(host)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub(crate) fn set(&self, host: HostId, percent: u8) {
        if let Some(slot) = self.slot(host) {
            slot.store(percent.min(100), Ordering::Relaxed);
        }
    }

    fn slot(&self, host: HostId) -> Option<&AtomicU8> {
        host.0.checked_sub(1).and_then(|index| self.slots.get(index))
    }
}

/// The set of hosts, ordered by id.
#[derive(Debug)]
pub struct HostPool {
    hosts: Vec<Host>,
    progress: Arc<HostProgress>,
}

impl HostPool {
    /// Create `host_count` idle hosts with ids `1..=host_count`.
    pub fn new(host_count: usize) -> Self {
        let hosts = (1..=host_count)
            .map(|id| Host {
                id: HostId(id),
                client: None,
            })
            .collect();
        Self {
            hosts,
            progress: Arc::new(HostProgress::new(host_count)),
        }
    }

    /// First idle host by ascending id.
    pub fn find_idle(&self) -> Option<HostId> {
        self.hosts
            .iter()
            .find(|host| !host.is_busy())
            .map(|host| host.id)
    }

    /// Mark a host busy serving `client`.
    ///
    /// # Returns
    /// `StateFault::HostBusy` if the host already serves a client, `StateFault::UnknownHost` if
    /// the id is outside the pool.
    pub fn assign(&mut self, host: HostId, client: ClientId) -> Result<()> {
        let entry = self.host_mut(host)?;
        if entry.is_busy() {
            return Err(StateFault::HostBusy(host).into());
        }
        entry.client = Some(client);
        self.progress.set(host, 0);
        Ok(())
    }

    /// Return a host to the idle set and reset its progress.
    ///
    /// # Returns
    /// The client that was being served, or `StateFault::HostIdle` when the host was not busy.
    pub fn free(&mut self, host: HostId) -> Result<ClientId> {
        let entry = self.host_mut(host)?;
        let client = entry.client.take().ok_or(StateFault::HostIdle(host))?;
        self.progress.set(host, 0);
        Ok(client)
    }

    pub fn get(&self, host: HostId) -> Option<&Host> {
        self.hosts.iter().find(|entry| entry.id == host)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    /// Size of the pool; fixed at construction.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn busy_count(&self) -> usize {
        self.hosts.iter().filter(|host| host.is_busy()).count()
    }

    /// Shared progress table handed to workers and renderers.
    pub fn progress(&self) -> Arc<HostProgress> {
        self.progress.clone()
    }

    pub(crate) fn snapshot(&self) -> Vec<HostSnapshot> {
        self.hosts
            .iter()
            .map(|host| HostSnapshot {
                id: host.id,
                busy: host.is_busy(),
                percent: self.progress.percent(host.id),
                client: host.client,
            })
            .collect()
    }

    fn host_mut(&mut self, host: HostId) -> Result<&mut Host> {
        self.hosts
            .iter_mut()
            .find(|entry| entry.id == host)
            .ok_or_else(|| StateFault::UnknownHost(host).into())
    }
}
