//! Adjustable tick interval shared between the control loop and upload workers.

use crate::config::ClockConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Live tick interval in milliseconds.
///
/// Only the scheduler changes it; workers read it on every progress step so a speed change also
/// stretches or shrinks uploads already in flight.
#[derive(Debug, Clone)]
pub struct TickClock {
    interval_ms: Arc<AtomicU64>,
    min_tick_ms: u64,
}

impl TickClock {
    pub fn new(config: &ClockConfig) -> Self {
        Self {
            interval_ms: Arc::new(AtomicU64::new(
                config.initial_tick_ms.max(config.min_tick_ms),
            )),
            min_tick_ms: config.min_tick_ms,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    /// Shift the interval by `delta_ms`, clamped to the configured floor. There is no ceiling.
    ///
    /// # Returns
    /// The new interval in milliseconds.
    pub fn change_tick(&self, delta_ms: i64) -> u64 {
        let current = self.interval_ms();
        let shifted = if delta_ms >= 0 {
            current.saturating_add(delta_ms.unsigned_abs())
        } else {
            current.saturating_sub(delta_ms.unsigned_abs())
        };
        let next = shifted.max(self.min_tick_ms);
        self.interval_ms.store(next, Ordering::Relaxed);
        next
    }

    /// Ticks per second at the current interval.
    pub fn speed_hz(&self) -> f64 {
        1000.0 / self.interval_ms() as f64
    }

    /// Display line shown next to the queue counter, e.g. `Time: 14:03:27 Speed: 1.00 Hz`.
    pub fn wall_clock_display(&self) -> String {
        format!(
            "Time: {} Speed: {:.2} Hz",
            chrono::Local::now().format("%H:%M:%S"),
            self.speed_hz()
        )
    }
}
