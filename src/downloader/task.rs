//! Download tasks and their outcomes

use super::DownloadError;
use crate::RemoteFileReference;
use std::path::PathBuf;

/// One file to fetch from one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Server name
    pub server: String,
    /// File to fetch
    pub file: RemoteFileReference,
    /// Attempts already made (0 for a fresh task)
    pub attempt: u32,
}

impl DownloadTask {
    /// Fresh task for a discovered file
    pub fn new(file: RemoteFileReference) -> Self {
        Self {
            server: file.server.clone(),
            file,
            attempt: 0,
        }
    }

    /// The same task after one more failed attempt
    pub fn retry(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Terminal result of a task
#[derive(Debug)]
pub enum DownloadOutcome {
    /// File staged in the incoming directory
    Downloaded {
        /// Completed task
        task: DownloadTask,
        /// Staged path
        staged: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// Task dropped after a terminal error or exhausted retries
    Failed {
        /// Failed task
        task: DownloadTask,
        /// Last error
        error: DownloadError,
    },
}

impl DownloadOutcome {
    /// Task this outcome belongs to
    pub fn task(&self) -> &DownloadTask {
        match self {
            DownloadOutcome::Downloaded { task, .. } | DownloadOutcome::Failed { task, .. } => task,
        }
    }

    /// Staged path on success
    pub fn staged_path(&self) -> Option<&PathBuf> {
        match self {
            DownloadOutcome::Downloaded { staged, .. } => Some(staged),
            DownloadOutcome::Failed { .. } => None,
        }
    }
}
