//! Directory browsers
//!
//! A browser lists the files under each candidate directory of a server.
//! [`HttpBrowser`] reads HTML index pages; [`LocalBrowser`] reads the
//! filesystem. Both share the candidate directory computation of the
//! underlying [`DataServerConfig`].

pub mod http;
pub mod listing;
pub mod local;

use crate::server::registry::BrowseMethod;
use crate::server::{CandidateDirectory, DataServerConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::RemoteFileReference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use http::HttpBrowser;
pub use local::LocalBrowser;

/// Browser errors
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    /// Server unreachable; the current poll of this server must stop
    #[error("network error: {server} unreachable at {location}: {message}")]
    Network {
        /// Server name
        server: String,
        /// Location being listed
        location: String,
        /// Underlying error
        message: String,
    },

    /// Local directory could not be read
    #[error("I/O error listing {location}: {message}")]
    Io {
        /// Location being listed
        location: String,
        /// Underlying error
        message: String,
    },
}

impl BrowserError {
    /// Whether this error signals an unreachable server
    pub fn is_network(&self) -> bool {
        matches!(self, BrowserError::Network { .. })
    }
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Lists candidate directories and files for one data server
#[async_trait]
pub trait DataBrowser: Send + Sync {
    /// Server this browser reads from
    fn server(&self) -> &DataServerConfig;

    /// Directories that may hold files in `[start, end]`
    fn list_candidate_directories(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<CandidateDirectory> {
        self.server().get_candidate_directories(start, end)
    }

    /// List files under `location` ending in `.{extension}`
    ///
    /// A missing directory yields an empty list.
    async fn list_files(&self, location: &str, extension: &str) -> BrowserResult<Vec<String>>;

    /// Discover all files in `[start, end]`
    ///
    /// Stops early (returning what was found so far) once shutdown is
    /// requested. A [`BrowserError::Network`] aborts the query; other
    /// per-directory failures are logged and skipped.
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        extension: &str,
        shutdown: &ShutdownCoordinator,
    ) -> BrowserResult<Vec<RemoteFileReference>> {
        let server = self.server();
        let directories = self.list_candidate_directories(start, end);

        info!(
            server = %server.name,
            start = %start.format(crate::DATE_FORMAT),
            end = %end.format(crate::DATE_FORMAT),
            directories = directories.len(),
            "Querying time range"
        );

        let mut files = Vec::new();
        for directory in directories {
            if shutdown.is_shutdown_requested() {
                debug!(server = %server.name, "Shutdown requested, stopping query");
                break;
            }

            debug!(server = %server.name, location = %directory.location, "Scanning");
            match self.list_files(&directory.location, extension).await {
                Ok(found) => files.extend(
                    found
                        .into_iter()
                        .map(|location| RemoteFileReference::new(location, server.name.clone())),
                ),
                Err(e) if e.is_network() => return Err(e),
                Err(e) => {
                    warn!(server = %server.name, location = %directory.location, error = %e, "Skipping directory");
                }
            }
        }

        Ok(files)
    }
}

/// Create a browser for the given method
pub fn create_browser(
    method: BrowseMethod,
    server: DataServerConfig,
    client: Arc<Client>,
    listing_retries: u32,
) -> Box<dyn DataBrowser> {
    match method {
        BrowseMethod::Http => Box::new(HttpBrowser::new(server, client, listing_retries)),
        BrowseMethod::Local => Box::new(LocalBrowser::new(server)),
    }
}
