//! Streaming HTTP downloader

use super::{staging_paths, DownloadError, DownloadResult, Downloader, StagedFile};
use crate::net::{classify_failure, FailureKind};
use crate::RemoteFileReference;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Downloads files with HTTP GET, streaming the body to disk
pub struct HttpDownloader {
    client: Arc<Client>,
}

impl HttpDownloader {
    /// Create a downloader using the shared client
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn stream_to(&self, file: &RemoteFileReference, partial: &Path) -> DownloadResult<u64> {
        let response = self
            .client
            .get(&file.location)
            .send()
            .await
            .map_err(|e| request_error(&file.location, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match classify_failure(Some(status), None) {
                FailureKind::NotFound => DownloadError::NotFound(file.location.clone()),
                _ => DownloadError::Http {
                    status: status.as_u16(),
                    message: file.location.clone(),
                },
            });
        }

        let mut output = tokio::fs::File::create(partial)
            .await
            .map_err(|e| DownloadError::from_io(e, partial))?;

        let mut bytes = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| request_error(&file.location, &e))?;
            output
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::from_io(e, partial))?;
            bytes += chunk.len() as u64;
        }

        output
            .flush()
            .await
            .map_err(|e| DownloadError::from_io(e, partial))?;
        output
            .sync_all()
            .await
            .map_err(|e| DownloadError::from_io(e, partial))?;

        Ok(bytes)
    }
}

fn request_error(location: &str, err: &reqwest::Error) -> DownloadError {
    let message = format!("{location}: {err}");
    match classify_failure(None, Some(err)) {
        FailureKind::Timeout => DownloadError::Timeout(message),
        _ => DownloadError::Connection(message),
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(
        &self,
        file: &RemoteFileReference,
        staging_dir: &Path,
    ) -> DownloadResult<StagedFile> {
        let (partial, target) = staging_paths(file, staging_dir)?;

        let bytes = match self.stream_to(file, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::from_io(e, &target));
        }

        debug!(location = %file.location, path = %target.display(), bytes, "Downloaded");
        Ok(StagedFile {
            path: target,
            bytes,
        })
    }
}
