//! Filesystem downloader for locally mounted servers

use super::{staging_paths, DownloadError, DownloadResult, Downloader, StagedFile};
use crate::RemoteFileReference;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Copies files from a local or mounted path
#[derive(Debug, Default)]
pub struct LocalDownloader;

impl LocalDownloader {
    /// Create a local downloader
    pub fn new() -> Self {
        Self
    }
}

async fn copy_to(file: &RemoteFileReference, partial: &Path) -> DownloadResult<u64> {
    let source = Path::new(&file.location);
    let mut input = tokio::fs::File::open(source).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => DownloadError::NotFound(file.location.clone()),
        _ => DownloadError::Io(format!("{}: {e}", file.location)),
    })?;

    let mut output = tokio::fs::File::create(partial)
        .await
        .map_err(|e| DownloadError::from_io(e, partial))?;

    let bytes = tokio::io::copy(&mut input, &mut output)
        .await
        .map_err(|e| DownloadError::from_io(e, partial))?;
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

#[async_trait]
impl Downloader for LocalDownloader {
    async fn fetch(
        &self,
        file: &RemoteFileReference,
        staging_dir: &Path,
    ) -> DownloadResult<StagedFile> {
        let (partial, target) = staging_paths(file, staging_dir)?;

        let bytes = match copy_to(file, &partial).await {
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

        Ok(StagedFile {
            path: target,
            bytes,
        })
    }
}
