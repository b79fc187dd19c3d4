//! Download configuration constants

use std::time::Duration;

/// Maximum number of retries for a failed download.
/// Three re-enqueues absorb transient timeouts without letting a dead file
/// occupy a worker for long.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Workers per server.
pub const DEFAULT_MAX_DOWNLOADS: usize = 4;

/// Files taken from each server's backlog per acquisition batch.
/// Bounds how long a shutdown request waits for the current batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Initial delay before a failed task is re-enqueued, in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum re-enqueue delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Suffix of in-progress downloads in the incoming directory
pub const PARTIAL_SUFFIX: &str = ".part";

/// Calculate exponential backoff from a base delay, capped at [`MAX_BACKOFF_MS`]
pub fn calculate_backoff(base: Duration, retry_count: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry_count);
    base.saturating_mul(factor)
        .min(Duration::from_millis(MAX_BACKOFF_MS))
}

/// Worker pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Concurrent workers per server
    pub workers: usize,
    /// Re-enqueues allowed after the first attempt
    pub max_retries: u32,
    /// Base delay before a retry is re-enqueued
    pub retry_backoff: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_MAX_DOWNLOADS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}
