//! Client representation and the random source that produces new clients.

use crate::config::GeneratorConfig;
use crate::error::{AuctionError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Smallest file size a client may hold.
pub const MIN_FILE_SIZE: u32 = 1;
/// Largest file size a client may hold.
pub const MAX_FILE_SIZE: u32 = 1000;

/// Stable client identity, assigned once at insertion and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A waiting client and the files it still has to upload.
///
/// `files` is kept sorted ascending; only the front is ever removed so the order never needs to
/// be restored.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub(crate) files: VecDeque<u32>,
    pub wait_ticks: u64,
    pub coefficient: f64,
}

impl Client {
    pub(crate) fn new(id: ClientId, files: Vec<u32>) -> Self {
        Self {
            id,
            files: files.into(),
            wait_ticks: 0,
            coefficient: 0.0,
        }
    }

    /// Smallest remaining file, which is the next one to be uploaded.
    pub fn smallest_file(&self) -> Option<u32> {
        self.files.front().copied()
    }

    /// Remaining files in upload order.
    pub fn files(&self) -> impl Iterator<Item = u32> + '_ {
        self.files.iter().copied()
    }

    pub fn remaining_files(&self) -> usize {
        self.files.len()
    }
}

/// Check a file list at the queue boundary.
///
/// # Arguments
/// * `files` - Candidate file sizes in upload order
///
/// # Returns
/// `Ok(())` when the list is non-empty, every size lies in
/// [`MIN_FILE_SIZE`]..=[`MAX_FILE_SIZE`], and sizes are non-decreasing; otherwise
/// [`AuctionError::InvalidClientSpec`] describing the first violation.
pub fn validate_files(files: &[u32]) -> Result<()> {
    if files.is_empty() {
        return Err(AuctionError::InvalidClientSpec(
            "client must hold at least one file".to_string(),
        ));
    }
    if let Some(size) = files
        .iter()
        .find(|size| !(MIN_FILE_SIZE..=MAX_FILE_SIZE).contains(*size))
    {
        return Err(AuctionError::InvalidClientSpec(format!(
            "file size {size} outside {MIN_FILE_SIZE}..={MAX_FILE_SIZE}"
        )));
    }
    if let Some(pair) = files.windows(2).find(|pair| pair[0] > pair[1]) {
        return Err(AuctionError::InvalidClientSpec(format!(
            "files not sorted ascending ({} before {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Random source for the `generate-client` command.
pub struct ClientGenerator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl ClientGenerator {
    /// Build a generator; a configured seed makes the sequence of clients reproducible.
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng, config }
    }

    /// Draw a file list, already sorted for insertion.
    pub fn next_files(&mut self) -> Vec<u32> {
        let count = self
            .rng
            .random_range(self.config.min_files..=self.config.max_files);
        let mut files: Vec<u32> = (0..count)
            .map(|_| {
                self.rng
                    .random_range(self.config.min_file_size..=self.config.max_file_size)
            })
            .collect();
        files.sort_unstable();
        files
    }
}
