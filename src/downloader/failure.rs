//! Retry and failure log messages for download tasks.

use super::task::DownloadTask;
use super::DownloadError;
use std::time::Duration;

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext<'a> {
    /// Task that failed
    pub task: &'a DownloadTask,
    /// Maximum re-enqueues allowed
    pub max_retries: u32,
    /// Error that triggered the retry
    pub error: &'a DownloadError,
    /// Delay before the task is re-enqueued
    pub backoff: Duration,
}

impl<'a> RetryContext<'a> {
    /// Build a context for the current attempt
    pub fn new(
        task: &'a DownloadTask,
        max_retries: u32,
        error: &'a DownloadError,
        backoff: Duration,
    ) -> Self {
        Self {
            task,
            max_retries,
            error,
            backoff,
        }
    }

    /// One-line retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying {} from {} (retry {}/{}) after {} - waiting {:.1} seconds",
            self.task.file.basename,
            self.task.server,
            self.task.attempt + 1,
            self.max_retries,
            self.error.description(),
            self.backoff.as_secs_f64()
        )
    }

    /// Multi-line summary logged when a task is dropped.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![format!(
            "[FAILED] {} dropped after {} attempt(s)",
            self.task.file.basename,
            self.task.attempt + 1
        )];
        lines.push(format!("  Last error: {}", self.error));
        lines.push(format!("  Server: {}", self.task.server));
        lines.push(format!("  Location: {}", self.task.file.location));
        if self.error.is_retryable() {
            lines.push(format!(
                "  Retries exhausted (max_retries = {}); the file will be retried next poll cycle",
                self.max_retries
            ));
        }
        lines.join("\n")
    }
}
