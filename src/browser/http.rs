//! Remote directory browsing over HTTP index pages

use super::{listing, BrowserError, BrowserResult, DataBrowser};
use crate::net::{classify_failure, FailureKind};
use crate::server::DataServerConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retries after a listing request times out
pub const DEFAULT_LISTING_RETRIES: u32 = 10;

/// Browser for servers publishing HTML directory indexes
pub struct HttpBrowser {
    server: DataServerConfig,
    client: Arc<Client>,
    listing_retries: u32,
}

impl HttpBrowser {
    /// Create a browser using the shared client
    pub fn new(server: DataServerConfig, client: Arc<Client>, listing_retries: u32) -> Self {
        Self {
            server,
            client,
            listing_retries,
        }
    }

    /// Fetch an index page; `Ok(None)` when the directory does not exist.
    async fn fetch_index(&self, location: &str) -> Result<Option<String>, (FailureKind, String)> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| (classify_failure(None, Some(&e)), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let kind = classify_failure(Some(status), None);
            if kind == FailureKind::NotFound {
                return Ok(None);
            }
            return Err((kind, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| (classify_failure(None, Some(&e)), e.to_string()))
    }
}

#[async_trait]
impl DataBrowser for HttpBrowser {
    fn server(&self) -> &DataServerConfig {
        &self.server
    }

    async fn list_files(&self, location: &str, extension: &str) -> BrowserResult<Vec<String>> {
        let mut retries = 0;

        loop {
            match self.fetch_index(location).await {
                Ok(Some(body)) => return Ok(listing::extract_files(location, &body, extension)),
                Ok(None) => {
                    debug!(server = %self.server.name, location, "Directory not found");
                    return Ok(Vec::new());
                }
                Err((FailureKind::Timeout, message)) => {
                    if retries >= self.listing_retries {
                        warn!(
                            server = %self.server.name,
                            location,
                            attempts = retries + 1,
                            error = %message,
                            "Listing timed out repeatedly, treating directory as empty"
                        );
                        return Ok(Vec::new());
                    }
                    retries += 1;
                    debug!(
                        server = %self.server.name,
                        location,
                        retry = retries,
                        max_retries = self.listing_retries,
                        "Listing timed out, retrying"
                    );
                }
                Err((FailureKind::Offline, message)) => {
                    return Err(BrowserError::Network {
                        server: self.server.name.clone(),
                        location: location.to_string(),
                        message,
                    });
                }
                Err((kind, message)) => {
                    warn!(
                        server = %self.server.name,
                        location,
                        reason = kind.description(),
                        error = %message,
                        "Listing failed, treating directory as empty"
                    );
                    return Ok(Vec::new());
                }
            }
        }
    }
}
