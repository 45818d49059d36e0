//! Coefficient (priority) computation shared by the queue and the scheduler.
//!
//! The coefficient balances how long a client has waited against the size of the smallest file
//! it still holds, both scaled by the number of clients currently queued:
//!
//! ```text
//! coefficient = (1 / c) * t + log_{1/2}(v / c)
//! ```
//!
//! where `c` is the queue size, `t` the client's wait in ticks and `v` its smallest file. Because
//! `c` is shared by every client, all coefficients must be recomputed whenever the queue changes.

use crate::error::{AuctionError, Result};

/// Compute a client's coefficient.
///
/// `log_{1/2}(x)` equals `-log2(x)`, so small files relative to the queue size score high and
/// every additional tick of waiting adds `1 / c`.
///
/// # Arguments
/// * `wait_ticks` - Ticks the client has spent in the queue
/// * `smallest_file` - Size of the smallest file the client still holds (1..=1000)
/// * `queue_size` - Number of clients currently queued, including this one
///
/// # Returns
/// The coefficient, or [`AuctionError::Computation`] when either divisor input is zero. A
/// sentinel is never substituted because a zero here means a queue invariant was broken.
pub fn coefficient(wait_ticks: u64, smallest_file: u32, queue_size: usize) -> Result<f64> {
    if queue_size == 0 || smallest_file == 0 {
        return Err(AuctionError::Computation {
            smallest_file,
            queue_size,
        });
    }

    let c = queue_size as f64;
    let aging = wait_ticks as f64 / c;
    let size_term = -(f64::from(smallest_file) / c).log2();
    Ok(aging + size_term)
}
