//! Coefficient-driven admission control of clients onto a fixed pool of simulated upload hosts.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod priority;
pub mod queue;
pub mod scheduler;
pub mod snapshot;
pub mod worker;

// Re-exports for front ends and tests
pub use client::{Client, ClientGenerator, ClientId};
pub use config::SimulationConfig;
pub use error::{AuctionError, Result, StateFault};
pub use host::{HostId, HostPool};
pub use queue::ClientQueue;
pub use scheduler::{Assignment, Command, Scheduler, SchedulerHandle, TickReport};
pub use snapshot::{SchedulerSnapshot, SnapshotSubscription};
