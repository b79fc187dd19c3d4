//! JSON file catalog with atomic writes and file locking
//!
//! Every mutation rewrites the whole document through a temp file in the
//! same directory, fsyncs it, and renames it over the previous version, so a
//! crash leaves either the old or the new catalog on disk, never a torn one.

use super::{Catalog, CatalogError, CatalogResult, CatalogTables};
use crate::{BadImageReason, ImageMetadata, QuarantineRecord};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current catalog schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum catalog size accepted on load (256MB)
pub const MAX_CATALOG_FILE_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    schema_version: String,
    #[serde(flatten)]
    tables: CatalogTables,
}

#[derive(Serialize)]
struct CatalogDocumentRef<'a> {
    schema_version: &'a str,
    #[serde(flatten)]
    tables: &'a CatalogTables,
}

/// Catalog persisted as a single JSON document
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    tables: CatalogTables,
}

fn open_lock_file(path: &Path) -> CatalogResult<File> {
    let lock_path = path.with_extension("lock");
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| CatalogError::Lock(format!("Failed to create lock file: {e}")))
}

impl JsonCatalog {
    /// Open the catalog at `path`, creating an empty one if it does not exist
    pub fn open(path: impl Into<PathBuf>) -> CatalogResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::Io(e.to_string()))?;
        }

        if !path.exists() {
            info!(path = %path.display(), "Creating new catalog");
            let catalog = Self {
                path,
                tables: CatalogTables::default(),
            };
            catalog.save()?;
            return Ok(catalog);
        }

        let tables = Self::load(&path)?;
        Ok(Self { path, tables })
    }

    /// Location of the catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> CatalogResult<CatalogTables> {
        debug!(path = %path.display(), "Loading catalog");

        let lock = RwLock::new(open_lock_file(path)?);
        let _guard = lock
            .read()
            .map_err(|e| CatalogError::Lock(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| CatalogError::Io(e.to_string()))?;
        if metadata.len() > MAX_CATALOG_FILE_SIZE {
            return Err(CatalogError::TooLarge {
                size: metadata.len(),
                max: MAX_CATALOG_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::Io(e.to_string()))?;
        let document: CatalogDocument = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize catalog");
            CatalogError::Deserialization(e.to_string())
        })?;

        if document.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %document.schema_version,
                expected_version = SCHEMA_VERSION,
                "Catalog schema version mismatch"
            );
            return Err(CatalogError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: document.schema_version,
            });
        }

        info!(
            images = document.tables.images.len(),
            corrupt = document.tables.corrupt.len(),
            "Catalog loaded"
        );
        Ok(document.tables)
    }

    fn save(&self) -> CatalogResult<()> {
        let document = CatalogDocumentRef {
            schema_version: SCHEMA_VERSION,
            tables: &self.tables,
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;

        let mut lock = RwLock::new(open_lock_file(&self.path)?);
        let _guard = lock
            .write()
            .map_err(|e| CatalogError::Lock(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| CatalogError::Io(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| CatalogError::Io(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| CatalogError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| CatalogError::Io(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| CatalogError::Io(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            path = %self.path.display(),
            images = self.tables.images.len(),
            corrupt = self.tables.corrupt.len(),
            "Catalog saved"
        );
        Ok(())
    }

    /// Apply a mutation and persist it; the in-memory tables are restored if saving fails.
    fn commit<T>(&mut self, mutate: impl FnOnce(&mut CatalogTables) -> T) -> CatalogResult<T> {
        let previous = self.tables.clone();
        let result = mutate(&mut self.tables);
        if let Err(e) = self.save() {
            self.tables = previous;
            return Err(e);
        }
        Ok(result)
    }
}

impl Catalog for JsonCatalog {
    fn is_known(&self, filename: &str) -> CatalogResult<bool> {
        Ok(self.tables.images.contains_key(filename))
    }

    fn is_quarantined(&self, filename: &str) -> CatalogResult<bool> {
        Ok(self.tables.corrupt.contains_key(filename))
    }

    fn insert_batch(&mut self, images: &[ImageMetadata]) -> CatalogResult<usize> {
        let inserted = self.commit(|tables| tables.insert_batch(images))?;
        info!(inserted, total = self.tables.images.len(), "Catalog rows inserted");
        Ok(inserted)
    }

    fn mark_quarantined(&mut self, filename: &str, reason: BadImageReason) -> CatalogResult<()> {
        self.commit(|tables| tables.mark_quarantined(filename, reason))
    }

    fn quarantine_records(&self) -> CatalogResult<Vec<QuarantineRecord>> {
        Ok(self.tables.corrupt.values().cloned().collect())
    }

    fn image_count(&self) -> CatalogResult<usize> {
        Ok(self.tables.images.len())
    }
}
