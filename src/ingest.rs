//! Archive placement and catalog insertion
//!
//! Validated files are moved from the incoming directory into
//! `{image_archive}/{nickname}/{YYYY}/{MM}/{DD}/{measurement}/{filename}`
//! and then recorded in the catalog. If the catalog insert fails, the moves
//! of that batch are undone so no file sits in the archive uncataloged.

use crate::catalog::{Catalog, CatalogError};
use crate::ImageMetadata;
use chrono::Datelike;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Ingest errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Filesystem operation failed
    #[error("storage error on {path}: {message}")]
    Storage {
        /// Path involved
        path: String,
        /// Underlying error
        message: String,
    },

    /// Catalog rejected the batch
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Metadata cannot produce an archive path
    #[error("invalid image metadata: {0}")]
    InvalidImage(String),
}

impl IngestError {
    fn storage(path: &Path, err: io::Error) -> Self {
        IngestError::Storage {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Computes archive locations
#[derive(Debug, Clone)]
pub struct ArchivePathBuilder {
    root: PathBuf,
}

impl ArchivePathBuilder {
    /// Create a builder rooted at the image archive
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding an image
    pub fn directory_for(&self, image: &ImageMetadata) -> PathBuf {
        self.root
            .join(image.nickname())
            .join(format!("{:04}", image.date.year()))
            .join(format!("{:02}", image.date.month()))
            .join(format!("{:02}", image.date.day()))
            .join(&image.measurement)
    }

    /// Full archive path of an image
    pub fn build(&self, image: &ImageMetadata) -> Result<PathBuf, IngestError> {
        image.validate().map_err(IngestError::InvalidImage)?;
        Ok(self.directory_for(image).join(image.filename()))
    }
}

/// Move a file, creating the destination directory and falling back to
/// copy + remove across filesystems.
pub async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(rename_err) => {
            debug!(from = %from.display(), to = %to.display(), error = %rename_err, "Rename failed, copying");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

/// Moves validated images into the archive and catalogs them
#[derive(Debug, Clone)]
pub struct Ingestor {
    paths: ArchivePathBuilder,
}

impl Ingestor {
    /// Create an ingestor for the given archive root
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self {
            paths: ArchivePathBuilder::new(archive_root),
        }
    }

    /// Path computation used by this ingestor
    pub fn paths(&self) -> &ArchivePathBuilder {
        &self.paths
    }

    /// Archive a batch; returns the number of new catalog rows.
    ///
    /// On any failure every file moved by this call is put back where it was.
    pub async fn ingest(
        &self,
        images: Vec<ImageMetadata>,
        catalog: &mut dyn Catalog,
    ) -> Result<usize, IngestError> {
        if images.is_empty() {
            return Ok(0);
        }

        let mut moved: Vec<(PathBuf, ImageMetadata)> = Vec::with_capacity(images.len());
        for image in images {
            let destination = match self.paths.build(&image) {
                Ok(path) => path,
                Err(e) => {
                    self.rollback(&moved).await;
                    return Err(e);
                }
            };

            if let Err(e) = move_file(&image.path, &destination).await {
                error!(
                    filename = %image.filename(),
                    destination = %destination.display(),
                    error = %e,
                    "Failed to move image into archive"
                );
                self.rollback(&moved).await;
                return Err(IngestError::storage(&destination, e));
            }

            debug!(filename = %image.filename(), destination = %destination.display(), "Archived");
            let original = image.path.clone();
            moved.push((original, image.relocated(&destination)));
        }

        let archived: Vec<ImageMetadata> = moved.iter().map(|(_, image)| image.clone()).collect();
        match catalog.insert_batch(&archived) {
            Ok(inserted) => {
                info!(inserted, batch = archived.len(), "Ingested images");
                Ok(inserted)
            }
            Err(e) => {
                error!(error = %e, batch = archived.len(), "Catalog insert failed, rolling back archive moves");
                self.rollback(&moved).await;
                Err(IngestError::Catalog(e))
            }
        }
    }

    async fn rollback(&self, moved: &[(PathBuf, ImageMetadata)]) {
        for (original, image) in moved.iter().rev() {
            if let Err(e) = move_file(&image.path, original).await {
                warn!(
                    filename = %image.filename(),
                    archived = %image.path.display(),
                    error = %e,
                    "Failed to roll back archived file"
                );
            }
        }
    }
}
