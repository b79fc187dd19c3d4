//! Catalog collaborator
//!
//! The catalog records which images are in the archive and which files were
//! rejected. It is owned by the orchestrator and never shared with download
//! workers, so implementations need not be thread-safe.

pub mod json;

use crate::{BadImageReason, ImageMetadata, QuarantineRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use json::JsonCatalog;

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Lock acquisition failed
    #[error("lock error: {0}")]
    Lock(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored catalog could not be read
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Stored catalog uses an unknown schema
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Supported version
        expected: String,
        /// Version on disk
        found: String,
    },

    /// Stored catalog exceeds the size limit
    #[error("catalog file too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size on disk
        size: u64,
        /// Limit
        max: u64,
    },

    /// Backend not reachable
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog of archived and rejected images
pub trait Catalog: Send {
    /// Whether an image with this filename is already archived
    fn is_known(&self, filename: &str) -> CatalogResult<bool>;

    /// Whether this filename was previously rejected
    fn is_quarantined(&self, filename: &str) -> CatalogResult<bool>;

    /// Record archived images; already-known filenames are ignored.
    ///
    /// Returns the number of new rows. Either every new row is recorded or
    /// none is.
    fn insert_batch(&mut self, images: &[ImageMetadata]) -> CatalogResult<usize>;

    /// Record a rejected file
    fn mark_quarantined(&mut self, filename: &str, reason: BadImageReason) -> CatalogResult<()>;

    /// All rejected files, ordered by filename
    fn quarantine_records(&self) -> CatalogResult<Vec<QuarantineRecord>>;

    /// Number of archived images
    fn image_count(&self) -> CatalogResult<usize>;
}

/// One archived image row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Observatory
    pub observatory: String,
    /// Instrument
    pub instrument: String,
    /// Detector
    pub detector: String,
    /// Measurement
    pub measurement: String,
    /// Observation time
    pub date: DateTime<Utc>,
    /// Archive path
    pub path: PathBuf,
}

impl From<&ImageMetadata> for CatalogEntry {
    fn from(image: &ImageMetadata) -> Self {
        Self {
            observatory: image.observatory.clone(),
            instrument: image.instrument.clone(),
            detector: image.detector.clone(),
            measurement: image.measurement.clone(),
            date: image.date,
            path: image.path.clone(),
        }
    }
}

/// Catalog tables shared by the in-memory and JSON implementations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTables {
    /// Archived images keyed by filename
    pub images: BTreeMap<String, CatalogEntry>,
    /// Rejected files keyed by filename
    pub corrupt: BTreeMap<String, QuarantineRecord>,
}

impl CatalogTables {
    /// Insert new rows, returning how many were added
    pub fn insert_batch(&mut self, images: &[ImageMetadata]) -> usize {
        images
            .iter()
            .filter(|image| {
                let filename = image.filename();
                if self.images.contains_key(&filename) {
                    false
                } else {
                    self.images.insert(filename, CatalogEntry::from(*image));
                    true
                }
            })
            .count()
    }

    /// Record a rejected file (first reason wins)
    pub fn mark_quarantined(&mut self, filename: &str, reason: BadImageReason) {
        self.corrupt
            .entry(filename.to_string())
            .or_insert_with(|| QuarantineRecord::new(filename, reason));
    }
}

/// Catalog held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: CatalogTables,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog entry for a filename
    pub fn entry(&self, filename: &str) -> Option<&CatalogEntry> {
        self.tables.images.get(filename)
    }
}

impl Catalog for MemoryCatalog {
    fn is_known(&self, filename: &str) -> CatalogResult<bool> {
        Ok(self.tables.images.contains_key(filename))
    }

    fn is_quarantined(&self, filename: &str) -> CatalogResult<bool> {
        Ok(self.tables.corrupt.contains_key(filename))
    }

    fn insert_batch(&mut self, images: &[ImageMetadata]) -> CatalogResult<usize> {
        Ok(self.tables.insert_batch(images))
    }

    fn mark_quarantined(&mut self, filename: &str, reason: BadImageReason) -> CatalogResult<()> {
        self.tables.mark_quarantined(filename, reason);
        Ok(())
    }

    fn quarantine_records(&self) -> CatalogResult<Vec<QuarantineRecord>> {
        Ok(self.tables.corrupt.values().cloned().collect())
    }

    fn image_count(&self) -> CatalogResult<usize> {
        Ok(self.tables.images.len())
    }
}
