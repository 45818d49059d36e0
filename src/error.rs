//! Error taxonomy for the scheduler core.
//!
//! Everything except [`AuctionError::Config`], [`AuctionError::Io`] and [`AuctionError::Json`] is
//! a programming invariant rather than an expected runtime condition. "No idle host this tick"
//! is normal backpressure and never shows up here.

use crate::client::ClientId;
use crate::host::HostId;
use thiserror::Error;

/// Synchronization faults between the control loop and host bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateFault {
    #[error("host {0} is already busy")]
    HostBusy(HostId),

    #[error("host {0} is already idle")]
    HostIdle(HostId),

    #[error("host {0} does not exist")]
    UnknownHost(HostId),

    #[error("client {0} is not queued")]
    ClientNotFound(ClientId),

    #[error("client {0} is queued without files")]
    EmptyClient(ClientId),
}

#[derive(Error, Debug)]
pub enum AuctionError {
    #[error("invalid client spec: {0}")]
    InvalidClientSpec(String),

    #[error("coefficient undefined for smallest file {smallest_file} and queue size {queue_size}")]
    Computation {
        smallest_file: u32,
        queue_size: usize,
    },

    #[error("state fault: {0}")]
    StateFault(#[from] StateFault),

    #[error("scheduler is no longer running")]
    SchedulerStopped,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AuctionError>;
