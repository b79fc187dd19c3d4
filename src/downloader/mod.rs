//! Download queues, workers and file fetchers
//!
//! Each configured server gets its own [`DownloaderPool`]: a [`TaskQueue`]
//! drained by a fixed number of worker tasks. Workers fetch one file per
//! task into the flat incoming directory through a [`Downloader`], then
//! report a [`DownloadOutcome`] back to the orchestrator.
//!
//! # Error Handling
//!
//! Failures are classified by [`DownloadError`]:
//! - retryable (timeouts, connection resets, HTTP 5xx): re-enqueued at the
//!   tail of the queue up to the configured bound
//! - fatal (disk full, permission denied): the worker requests daemon
//!   shutdown
//! - anything else: reported as failed and dropped
//!
//! # Components
//!
//! - [`queue`] - blocking FIFO with join semantics
//! - [`pool`] - worker tasks and outcome collection
//! - [`http`] / [`local`] - file fetchers
//! - [`failure`] - retry and failure log messages
//! - [`config`] - defaults and backoff calculation

pub mod config;
pub mod failure;
pub mod http;
pub mod local;
pub mod pool;
pub mod queue;
pub mod task;

use crate::server::registry::DownloadMethod;
use crate::RemoteFileReference;
use async_trait::async_trait;
use reqwest::Client;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use config::PoolSettings;
pub use http::HttpDownloader;
pub use local::LocalDownloader;
pub use pool::DownloaderPool;
pub use queue::TaskQueue;
pub use task::{DownloadOutcome, DownloadTask};

/// Download errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection refused or reset
    #[error("connection error: {0}")]
    Connection(String),

    /// Unexpected HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Response context
        message: String,
    },

    /// Source file no longer exists
    #[error("not found: {0}")]
    NotFound(String),

    /// No space left in the incoming directory
    #[error("disk full: {0}")]
    DiskFull(String),

    /// Incoming directory not writable
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Reference does not name a downloadable file
    #[error("invalid source: {0}")]
    InvalidSource(String),
}

impl DownloadError {
    /// Whether the task should be re-enqueued
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Timeout(_) | DownloadError::Connection(_) => true,
            DownloadError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the daemon cannot continue safely
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloadError::DiskFull(_) | DownloadError::PermissionDenied(_)
        )
    }

    /// Classify an I/O error on the staging side
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        let context = format!("{}: {err}", path.display());
        match err.kind() {
            ErrorKind::StorageFull => DownloadError::DiskFull(context),
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                DownloadError::PermissionDenied(context)
            }
            ErrorKind::NotFound => DownloadError::NotFound(context),
            ErrorKind::TimedOut => DownloadError::Timeout(context),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::Interrupted
            | ErrorKind::UnexpectedEof => DownloadError::Connection(context),
            _ => DownloadError::Io(context),
        }
    }

    /// Short description used in retry messages
    pub fn description(&self) -> &'static str {
        match self {
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Connection(_) => "connection error",
            DownloadError::Http { .. } => "HTTP error",
            DownloadError::NotFound(_) => "file not found",
            DownloadError::DiskFull(_) => "disk full",
            DownloadError::PermissionDenied(_) => "permission denied",
            DownloadError::Io(_) => "I/O error",
            DownloadError::InvalidSource(_) => "invalid source",
        }
    }
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

/// A file fully written to the incoming directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Final path (`{staging_dir}/{basename}`)
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
}

/// Fetches one file into the staging directory
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `file` to `{staging_dir}/{basename}`.
    ///
    /// Data is written to a `.part` file first and renamed on success; the
    /// partial file is removed on failure.
    async fn fetch(&self, file: &RemoteFileReference, staging_dir: &Path)
        -> DownloadResult<StagedFile>;
}

/// Paths used while staging `file`: (partial, final)
pub fn staging_paths(
    file: &RemoteFileReference,
    staging_dir: &Path,
) -> DownloadResult<(PathBuf, PathBuf)> {
    file.validate().map_err(DownloadError::InvalidSource)?;
    let target = staging_dir.join(&file.basename);
    let partial = staging_dir.join(format!("{}{}", file.basename, config::PARTIAL_SUFFIX));
    Ok((partial, target))
}

/// Create a downloader for the given method
pub fn create_downloader(method: DownloadMethod, client: Arc<Client>) -> Arc<dyn Downloader> {
    match method {
        DownloadMethod::Http => Arc::new(HttpDownloader::new(client)),
        DownloadMethod::Local => Arc::new(LocalDownloader::new()),
    }
}
