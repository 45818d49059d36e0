//! Host worker: simulates one file upload on its own timeline.
//!
//! A worker owns nothing but its progress slot. When the last step finishes it posts a
//! [`WorkerEvent::Completed`] to the scheduler, which frees the host at the start of its next
//! tick. Routing the release through the channel keeps the scheduler the only writer of host
//! assignment state, and the unbounded channel never loses a completion.

use crate::client::ClientId;
use crate::clock::TickClock;
use crate::config::UploadConfig;
use crate::host::{HostId, HostProgress};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Message sent by a worker back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    Completed {
        host: HostId,
        client: ClientId,
        file: u32,
    },
}

/// Parameters of a single upload.
#[derive(Debug, Clone)]
pub struct HostWorker {
    pub host: HostId,
    pub client: ClientId,
    pub file: u32,
    clock: TickClock,
    upload: UploadConfig,
    progress: Arc<HostProgress>,
    events: Sender<WorkerEvent>,
}

impl HostWorker {
    pub fn new(
        host: HostId,
        client: ClientId,
        file: u32,
        clock: TickClock,
        upload: UploadConfig,
        progress: Arc<HostProgress>,
        events: Sender<WorkerEvent>,
    ) -> Self {
        Self {
            host,
            client,
            file,
            clock,
            upload,
            progress,
            events,
        }
    }

    /// Length of one progress step at the current tick interval.
    ///
    /// `step_factor` seconds at a 1000 ms tick, scaled linearly: the default 0.05 gives 50 ms per
    /// step and 5 s per file at 1 Hz.
    fn step_duration(&self) -> Duration {
        let seconds = self.upload.step_factor * (self.clock.interval_ms() as f64 / 1000.0);
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /// Run the upload to completion.
    pub async fn run(self) {
        let steps = self.upload.steps.max(1);
        debug!(host = %self.host, client = %self.client, file = self.file, "upload started");

        for step in 1..=steps {
            tokio::time::sleep(self.step_duration()).await;
            let percent = (u64::from(step) * 100 / u64::from(steps)) as u8;
            self.progress.set(self.host, percent);
        }

        let event = WorkerEvent::Completed {
            host: self.host,
            client: self.client,
            file: self.file,
        };
        if self.events.send(event).is_err() {
            // Scheduler is gone (shutdown); nobody is left to free the host.
            warn!(host = %self.host, "upload finished after scheduler shutdown");
            return;
        }
        debug!(host = %self.host, client = %self.client, file = self.file, "upload finished");
    }

    /// Spawn the upload onto the current tokio runtime.
    ///
    /// The handle may be dropped: workers still running at shutdown are abandoned.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
