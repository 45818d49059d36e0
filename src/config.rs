//! Simulation configuration.
//!
//! Every knob has a default matching the classic five-host setup, so `SimulationConfig::default()`
//! is a complete configuration. A JSON file may override any subset of fields.

use crate::client::{MAX_FILE_SIZE, MIN_FILE_SIZE};
use crate::error::{AuctionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tick interval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Interval between ticks at startup, in milliseconds.
    pub initial_tick_ms: u64,
    /// Hard floor enforced by `change_tick`.
    pub min_tick_ms: u64,
    /// Amount a single speed-up / slow-down command moves the interval.
    pub tick_step_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            initial_tick_ms: 1000,
            min_tick_ms: 100,
            tick_step_ms: 100,
        }
    }
}

/// Shape of a simulated upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Number of progress steps per file.
    pub steps: u32,
    /// Seconds slept per step at a 1000 ms tick; scales linearly with the live tick interval.
    pub step_factor: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            steps: 100,
            step_factor: 0.05,
        }
    }
}

/// Bounds for randomly generated clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub min_files: usize,
    pub max_files: usize,
    pub min_file_size: u32,
    pub max_file_size: u32,
    /// Fixed seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_files: 2,
            max_files: 10,
            min_file_size: MIN_FILE_SIZE,
            max_file_size: MAX_FILE_SIZE,
            seed: None,
        }
    }
}

/// Top-level configuration used when building a [`crate::Scheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of hosts in the pool (ids 1..=host_count).
    pub host_count: usize,
    pub clock: ClockConfig,
    pub upload: UploadConfig,
    pub generator: GeneratorConfig,
    /// Capacity of the snapshot channel; snapshots are dropped when subscribers fall behind.
    pub snapshot_buffer: usize,
    /// Admit one generated client every N ticks (0 disables).
    pub auto_generate_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            host_count: 5,
            clock: ClockConfig::default(),
            upload: UploadConfig::default(),
            generator: GeneratorConfig::default(),
            snapshot_buffer: 64,
            auto_generate_every: 0,
        }
    }
}

impl SimulationConfig {
    /// Load a configuration from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host_count == 0 {
            return Err(AuctionError::Config("host_count must be at least 1".into()));
        }
        if self.clock.min_tick_ms == 0 {
            return Err(AuctionError::Config("min_tick_ms must be positive".into()));
        }
        if self.clock.initial_tick_ms < self.clock.min_tick_ms {
            return Err(AuctionError::Config(format!(
                "initial_tick_ms {} is below min_tick_ms {}",
                self.clock.initial_tick_ms, self.clock.min_tick_ms
            )));
        }
        if self.upload.steps == 0 {
            return Err(AuctionError::Config("upload steps must be positive".into()));
        }
        if !self.upload.step_factor.is_finite() || self.upload.step_factor < 0.0 {
            return Err(AuctionError::Config(
                "upload step_factor must be a non-negative number".into(),
            ));
        }
        let generator = &self.generator;
        if generator.min_files == 0 || generator.min_files > generator.max_files {
            return Err(AuctionError::Config(format!(
                "file count range {}..={} is empty or allows empty clients",
                generator.min_files, generator.max_files
            )));
        }
        if generator.min_file_size < MIN_FILE_SIZE
            || generator.max_file_size > MAX_FILE_SIZE
            || generator.min_file_size > generator.max_file_size
        {
            return Err(AuctionError::Config(format!(
                "file size range {}..={} must lie within {MIN_FILE_SIZE}..={MAX_FILE_SIZE}",
                generator.min_file_size, generator.max_file_size
            )));
        }
        if self.snapshot_buffer == 0 {
            return Err(AuctionError::Config("snapshot_buffer must be positive".into()));
        }
        Ok(())
    }
}
