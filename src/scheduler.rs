//! Tick-driven auction scheduler.
//!
//! The scheduler is the single authority over the client queue and host assignments. Each tick:
//!
//! 1. Frees hosts whose workers reported completion since the previous tick, and admits a
//!    generated client when auto-generation is due
//! 2. Ages every queued client and recomputes all coefficients
//! 3. Picks the client with the highest coefficient and, if a host is idle, hands it the client's
//!    smallest file (at most one assignment per tick)
//! 4. Removes the client when that was its last file
//! 5. Publishes a snapshot for renderers
//!
//! Between ticks the loop sleeps for the current interval while still applying external commands
//! (new clients, speed changes) as they arrive.

use crate::client::{ClientGenerator, ClientId};
use crate::clock::TickClock;
use crate::config::SimulationConfig;
use crate::error::{AuctionError, Result};
use crate::host::{HostId, HostPool};
use crate::queue::ClientQueue;
use crate::snapshot::{SchedulerSnapshot, SchedulerStats, SnapshotPublisher, SnapshotSubscription};
use crate::worker::{HostWorker, WorkerEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// External commands accepted by a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Admit a client with randomly generated files.
    GenerateClient,
    /// Admit a client with the given files (sorted ascending by the caller).
    InsertClient(Vec<u32>),
    /// Shorten the tick interval by one step.
    SpeedUp,
    /// Lengthen the tick interval by one step.
    SlowDown,
    /// Shift the tick interval by an arbitrary amount of milliseconds.
    ChangeTick(i64),
    Shutdown,
}

/// A host handed to a client during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub host: HostId,
    pub client: ClientId,
    pub file: u32,
    /// The file was the client's last one and the client left the queue.
    pub client_removed: bool,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Hosts released by completed uploads at the start of the tick.
    pub freed: Vec<HostId>,
    pub assignment: Option<Assignment>,
}

/// Auction scheduler owning the queue, the host pool and the command inbox.
pub struct Scheduler {
    config: SimulationConfig,
    queue: ClientQueue,
    hosts: HostPool,
    clock: TickClock,
    generator: ClientGenerator,
    worker_tx: Sender<WorkerEvent>,
    worker_rx: Receiver<WorkerEvent>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    publisher: SnapshotPublisher,
    stats: SchedulerStats,
    tick: u64,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    /// Build an idle scheduler: empty queue, all hosts free, no tick run yet.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let (worker_tx, worker_rx) = unbounded();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Ok(Self {
            queue: ClientQueue::new(),
            hosts: HostPool::new(config.host_count),
            clock: TickClock::new(&config.clock),
            generator: ClientGenerator::new(config.generator.clone()),
            worker_tx,
            worker_rx,
            command_tx,
            command_rx,
            publisher: SnapshotPublisher::new(config.snapshot_buffer),
            stats: SchedulerStats::default(),
            tick: 0,
            running: Arc::new(AtomicBool::new(true)),
            config,
        })
    }

    /// Handle for issuing commands and reading snapshots from other tasks or threads.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            commands: self.command_tx.clone(),
            running: self.running.clone(),
            clock: self.clock.clone(),
            snapshots: self.publisher.subscription(),
        }
    }

    pub fn queue(&self) -> &ClientQueue {
        &self.queue
    }

    pub fn hosts(&self) -> &HostPool {
        &self.hosts
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            snapshots_dropped: self.publisher.dropped(),
            ..self.stats.clone()
        }
    }

    /// Admit a client with explicit files.
    pub fn insert_client(&mut self, files: Vec<u32>) -> Result<ClientId> {
        match self.queue.insert(files) {
            Ok(id) => {
                self.stats.clients_admitted += 1;
                info!(client = %id, queued = self.queue.len(), "client admitted");
                Ok(id)
            }
            Err(err) => {
                self.stats.clients_rejected += 1;
                Err(err)
            }
        }
    }

    /// Admit a client with files drawn from the configured generator.
    pub fn generate_client(&mut self) -> Result<ClientId> {
        let files = self.generator.next_files();
        self.insert_client(files)
    }

    /// Move the tick interval by `delta_ms`, never below the configured floor.
    pub fn change_tick(&mut self, delta_ms: i64) -> u64 {
        let interval = self.clock.change_tick(delta_ms);
        debug!(interval_ms = interval, "tick interval changed");
        interval
    }

    /// Apply one external command.
    ///
    /// A rejected explicit insert is logged and counted; it does not stop the scheduler.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        let step = self.config.clock.tick_step_ms as i64;
        match command {
            Command::GenerateClient => {
                self.generate_client()?;
            }
            Command::InsertClient(files) => match self.insert_client(files) {
                Ok(_) => {}
                Err(AuctionError::InvalidClientSpec(reason)) => {
                    warn!(%reason, "client rejected");
                }
                Err(err) => return Err(err),
            },
            Command::SpeedUp => {
                self.change_tick(-step);
            }
            Command::SlowDown => {
                self.change_tick(step);
            }
            Command::ChangeTick(delta) => {
                self.change_tick(delta);
            }
            Command::Shutdown => {
                self.running.store(false, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Apply every command already waiting in the inbox without blocking.
    pub fn apply_pending(&mut self) -> Result<()> {
        while let Ok(command) = self.command_rx.try_recv() {
            self.apply(command)?;
        }
        Ok(())
    }

    /// Run one scheduling round and publish its snapshot.
    ///
    /// # Returns
    /// The hosts freed and the assignment made, or a state fault. Faults mean host or queue
    /// bookkeeping is corrupt and the scheduler must not keep running.
    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick += 1;

        let freed = self.drain_completions()?;
        let every = self.config.auto_generate_every;
        if every > 0 && self.tick % every == 0 {
            self.generate_client()?;
        }
        self.queue.tick()?;
        let assignment = self.assign_next()?;

        self.publisher.publish(self.snapshot());

        Ok(TickReport {
            tick: self.tick,
            freed,
            assignment,
        })
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            tick: self.tick,
            clock_tick_ms: self.clock.interval_ms(),
            speed_hz: self.clock.speed_hz(),
            wall_clock: self.clock.wall_clock_display(),
            queued_clients: self.queue.len(),
            hosts: self.hosts.snapshot(),
            clients: self.queue.snapshot(),
            stats: self.stats(),
        }
    }

    /// Drive ticks until shutdown.
    ///
    /// Commands arriving while the loop sleeps are applied immediately; the sleep itself always
    /// lasts the interval that was current when it started. In-flight uploads are abandoned on
    /// exit.
    pub async fn run(mut self) -> Result<()> {
        info!(
            hosts = self.hosts.host_count(),
            interval_ms = self.clock.interval_ms(),
            "scheduler started"
        );

        while self.running.load(Ordering::Relaxed) {
            if let Err(err) = self.tick() {
                error!(tick = self.tick, error = %err, "scheduler fault");
                self.running.store(false, Ordering::Relaxed);
                return Err(err);
            }

            let deadline =
                tokio::time::Instant::now() + Duration::from_millis(self.clock.interval_ms());
            while self.running.load(Ordering::Relaxed) {
                let command = tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => None,
                    command = self.command_rx.recv() => command,
                };
                match command {
                    Some(command) => {
                        if let Err(err) = self.apply(command) {
                            error!(tick = self.tick, error = %err, "command failed");
                            self.running.store(false, Ordering::Relaxed);
                            return Err(err);
                        }
                    }
                    None => break,
                }
            }
        }

        info!(
            ticks = self.tick,
            served = self.stats.clients_served,
            "scheduler stopped"
        );
        Ok(())
    }

    /// Release every host whose worker has reported completion.
    fn drain_completions(&mut self) -> Result<Vec<HostId>> {
        let mut freed = Vec::new();
        while let Ok(WorkerEvent::Completed { host, client, file }) = self.worker_rx.try_recv() {
            self.hosts.free(host)?;
            self.stats.files_completed += 1;
            debug!(host = %host, client = %client, file, "host released");
            freed.push(host);
        }
        Ok(freed)
    }

    /// The auction step: at most one host goes to the best client.
    ///
    /// A client that keeps files after winning stays queued and may win again on a later tick
    /// while its earlier file is still uploading, so it can hold several hosts at once.
    fn assign_next(&mut self) -> Result<Option<Assignment>> {
        let Some(client) = self.queue.select_max().map(|client| client.id) else {
            return Ok(None);
        };
        let Some(host) = self.hosts.find_idle() else {
            // Every host is busy: the client simply ages another tick.
            return Ok(None);
        };

        let file = self.queue.consume_smallest_file(client)?;
        self.hosts.assign(host, client)?;
        HostWorker::new(
            host,
            client,
            file,
            self.clock.clone(),
            self.config.upload.clone(),
            self.hosts.progress(),
            self.worker_tx.clone(),
        )
        .spawn();
        self.stats.files_dispatched += 1;

        let client_removed = self.queue.remove_if_empty(client)?;
        if client_removed {
            self.stats.clients_served += 1;
            info!(client = %client, queued = self.queue.len(), "client fully dispatched");
        }
        debug!(tick = self.tick, host = %host, client = %client, file, "host assigned");

        Ok(Some(Assignment {
            host,
            client,
            file,
            client_removed,
        }))
    }
}

/// Cloneable remote control for a [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    running: Arc<AtomicBool>,
    clock: TickClock,
    snapshots: SnapshotSubscription,
}

impl SchedulerHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| AuctionError::SchedulerStopped)
    }

    pub fn generate_client(&self) -> Result<()> {
        self.send(Command::GenerateClient)
    }

    pub fn insert_client(&self, files: Vec<u32>) -> Result<()> {
        self.send(Command::InsertClient(files))
    }

    pub fn speed_up(&self) -> Result<()> {
        self.send(Command::SpeedUp)
    }

    pub fn slow_down(&self) -> Result<()> {
        self.send(Command::SlowDown)
    }

    /// Stop the loop after the current tick; the sleep is interrupted.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        // The loop may already be gone, in which case there is nothing to wake.
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Current tick interval in milliseconds.
    pub fn clock_tick_ms(&self) -> u64 {
        self.clock.interval_ms()
    }

    pub fn snapshots(&self) -> &SnapshotSubscription {
        &self.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateFault;

    fn scheduler(hosts: usize) -> Scheduler {
        let mut config = SimulationConfig::default();
        config.host_count = hosts;
        config.generator.seed = Some(1);
        Scheduler::new(config).unwrap()
    }

    #[tokio::test]
    async fn single_client_single_file_is_served_and_removed() {
        let mut scheduler = scheduler(5);
        let id = scheduler.insert_client(vec![5]).unwrap();
        let coefficient = scheduler.queue().get(id).unwrap().coefficient;
        assert!((coefficient - (-2.321928)).abs() < 1e-5);

        let report = scheduler.tick().unwrap();
        assert_eq!(
            report.assignment,
            Some(Assignment {
                host: HostId(1),
                client: id,
                file: 5,
                client_removed: true,
            })
        );
        assert!(scheduler.queue().is_empty());
        assert_eq!(scheduler.hosts().get(HostId(1)).unwrap().client(), Some(id));
        assert_eq!(scheduler.stats().clients_served, 1);
    }

    #[tokio::test]
    async fn empty_queue_tick_is_idle() {
        let mut scheduler = scheduler(2);
        let report = scheduler.tick().unwrap();
        assert_eq!(report.assignment, None);
        assert_eq!(scheduler.hosts().busy_count(), 0);
        assert_eq!(scheduler.ticks(), 1);
    }

    #[tokio::test]
    async fn one_assignment_per_tick_even_with_idle_hosts() {
        let mut scheduler = scheduler(2);
        scheduler.insert_client(vec![10, 20, 30]).unwrap();

        let report = scheduler.tick().unwrap();
        assert_eq!(report.assignment.unwrap().host, HostId(1));
        assert_eq!(scheduler.hosts().busy_count(), 1);
        assert!(!scheduler.hosts().get(HostId(2)).unwrap().is_busy());
    }

    #[tokio::test]
    async fn saturated_pool_defers_without_error() {
        let mut scheduler = scheduler(1);
        let a = scheduler.insert_client(vec![1, 2]).unwrap();
        let b = scheduler.insert_client(vec![900]).unwrap();

        assert_eq!(scheduler.tick().unwrap().assignment.unwrap().client, a);
        for _ in 0..3 {
            assert_eq!(scheduler.tick().unwrap().assignment, None);
        }
        assert_eq!(scheduler.queue().get(a).unwrap().wait_ticks, 4);
        assert_eq!(scheduler.queue().get(b).unwrap().wait_ticks, 4);
    }

    #[tokio::test]
    async fn unexpected_completion_is_a_fault() {
        let mut scheduler = scheduler(1);
        scheduler
            .worker_tx
            .send(WorkerEvent::Completed {
                host: HostId(1),
                client: ClientId(1),
                file: 1,
            })
            .unwrap();
        assert!(matches!(
            scheduler.tick(),
            Err(AuctionError::StateFault(StateFault::HostIdle(HostId(1))))
        ));
    }

    #[tokio::test]
    async fn stray_completion_stops_the_run_loop() {
        let scheduler = scheduler(1);
        let handle = scheduler.handle();
        scheduler
            .worker_tx
            .send(WorkerEvent::Completed {
                host: HostId(1),
                client: ClientId(1),
                file: 1,
            })
            .unwrap();
        assert!(matches!(
            scheduler.run().await,
            Err(AuctionError::StateFault(StateFault::HostIdle(HostId(1))))
        ));
        assert!(!handle.is_running());
        assert!(handle.snapshots().latest().is_none());
    }

    #[tokio::test]
    async fn auto_generation_follows_the_tick_count() {
        let mut config = SimulationConfig::default();
        config.host_count = 1;
        config.generator.seed = Some(3);
        config.auto_generate_every = 3;
        let mut scheduler = Scheduler::new(config).unwrap();

        let admitted: Vec<u64> = (0..7)
            .map(|_| {
                scheduler.tick().unwrap();
                scheduler.stats().clients_admitted
            })
            .collect();
        assert_eq!(admitted, vec![0, 0, 1, 1, 1, 2, 2]);
        // The first generated client won host 1 on the tick it arrived.
        assert_eq!(scheduler.stats().files_dispatched, 1);
    }

    #[tokio::test]
    async fn commands_change_the_interval_with_floor() {
        let mut scheduler = scheduler(1);
        let handle = scheduler.handle();
        handle.speed_up().unwrap();
        handle.send(Command::ChangeTick(-1000)).unwrap();
        handle.slow_down().unwrap();
        scheduler.apply_pending().unwrap();
        assert_eq!(handle.clock_tick_ms(), 200);
    }

    #[tokio::test]
    async fn rejected_insert_is_counted_not_fatal() {
        let mut scheduler = scheduler(1);
        scheduler.apply(Command::InsertClient(vec![3, 1])).unwrap();
        scheduler.apply(Command::GenerateClient).unwrap();
        let stats = scheduler.stats();
        assert_eq!(stats.clients_rejected, 1);
        assert_eq!(stats.clients_admitted, 1);
        assert_eq!(scheduler.queue().len(), 1);
    }

    #[tokio::test]
    async fn tick_publishes_snapshot() {
        let mut scheduler = scheduler(3);
        let handle = scheduler.handle();
        scheduler.insert_client(vec![4, 8]).unwrap();
        scheduler.tick().unwrap();

        let snapshot = handle.snapshots().try_recv().unwrap();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.queued_clients, 1);
        assert_eq!(snapshot.clients[0].files, vec![8]);
        assert_eq!(snapshot.clients[0].wait_ticks, 1);
        assert_eq!(snapshot.busy_hosts(), 1);
        assert_eq!(snapshot.hosts[0].client, Some(ClientId(1)));
        assert_eq!(snapshot.clock_tick_ms, 1000);
        assert_eq!(handle.snapshots().latest().unwrap().tick, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let scheduler = scheduler(1);
        let handle = scheduler.handle();
        handle.shutdown();
        scheduler.run().await.unwrap();
        assert!(!handle.is_running());
        assert!(matches!(
            handle.generate_client(),
            Err(AuctionError::SchedulerStopped)
        ));
    }
}
