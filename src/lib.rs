//! # hvpull
//!
//! Image retrieval daemon for a solar image archive. The daemon polls a set of
//! remote or local data servers, discovers new JPEG 2000 files, downloads them
//! through a bounded worker pool, validates and transcodes them, and ingests
//! them into a persistent catalog.
//!
//! ## Pipeline
//!
//! ```text
//! server ──► browser ──► dedup ──► catalog filter ──► downloader pool
//!                                                        │
//!                 catalog ◄── ingest ◄── transcode ◄── validate
//!                                           │
//!                                       quarantine
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use hvpull::config::DaemonConfig;
//! use hvpull::daemon::{ImageRetrievalDaemon, ServerSelection, TimeRange};
//! use hvpull::shutdown::ShutdownCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DaemonConfig::load_from("settings.cfg".as_ref())?;
//! let selection = ServerSelection::parse("lmsal,jsoc", "http", "http")?;
//! let shutdown = ShutdownCoordinator::shared();
//!
//! let mut daemon = ImageRetrievalDaemon::new(&config, &selection, shutdown)?;
//! let stats = daemon.run(TimeRange::default()).await?;
//! println!("ingested {} images", stats.images_ingested);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`server`] - Data server taxonomy and candidate directory generation
//! - [`browser`] - Remote (HTTP) and local directory browsing
//! - [`dedup`] - Mirror deduplication
//! - [`downloader`] - Work queues, worker pool and file downloaders
//! - [`pipeline`] - Header parsing, validation and transcoding
//! - [`ingest`] - Archive placement and catalog insertion
//! - [`catalog`] - Catalog collaborator and its JSON-backed implementation
//! - [`daemon`] - The poll/acquire/ingest/sleep orchestrator

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory browsers
pub mod browser;

/// Catalog collaborator
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Settings file handling
pub mod config;

/// Daemon orchestrator
pub mod daemon;

/// Mirror deduplication
pub mod dedup;

/// Download queues and workers
pub mod downloader;

/// Archive placement
pub mod ingest;

/// Observability metrics
pub mod metrics;

/// Shared HTTP client construction
pub mod net;

/// Validation and transcoding
pub mod pipeline;

/// Data server definitions and registry
pub mod server;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Date format accepted for `--start` / `--end` overrides.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp as UTC.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(input.trim(), DATE_FORMAT).map(|dt| dt.and_utc())
}

/// Final path segment of a URL or filesystem location.
pub fn basename_of(location: &str) -> &str {
    let trimmed = location.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}

/// A file discovered on a data server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFileReference {
    /// Full location (URL or filesystem path)
    pub location: String,
    /// Name of the server the file was discovered on
    pub server: String,
    /// Basename; the global deduplication key
    pub basename: String,
}

impl RemoteFileReference {
    /// Create a reference, deriving the basename from the location
    pub fn new(location: impl Into<String>, server: impl Into<String>) -> Self {
        let location = location.into();
        let basename = basename_of(&location).to_string();
        Self {
            location,
            server: server.into(),
            basename,
        }
    }

    /// Validate reference integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.location.is_empty() {
            return Err("Location cannot be empty".to_string());
        }

        if self.basename.is_empty() || self.basename == "." || self.basename == ".." {
            return Err(format!(
                "Location {} does not name a file",
                self.location
            ));
        }

        if self.server.is_empty() {
            return Err("Server name cannot be empty".to_string());
        }

        Ok(())
    }
}

impl std::fmt::Display for RemoteFileReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.location, self.server)
    }
}

/// Metadata parsed from a staged image header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Observatory (e.g., "SDO", "SOHO")
    pub observatory: String,
    /// Instrument (e.g., "AIA", "LASCO")
    pub instrument: String,
    /// Detector (e.g., "AIA", "C2")
    pub detector: String,
    /// Measurement (e.g., "171", "white-light")
    pub measurement: String,
    /// Observation time
    pub date: DateTime<Utc>,
    /// Current location of the file
    pub path: PathBuf,
    /// Raw header keywords, keys upper-cased
    #[serde(default)]
    pub header: BTreeMap<String, String>,
}

impl ImageMetadata {
    /// File name of the image
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Archive nickname: the instrument, or `INSTRUMENT-DETECTOR` when they differ
    pub fn nickname(&self) -> String {
        if self.instrument.eq_ignore_ascii_case(&self.detector) {
            self.instrument.clone()
        } else {
            format!("{}-{}", self.instrument, self.detector)
        }
    }

    /// Look up a raw header keyword (case-insensitive)
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.header
            .get(&key.to_ascii_uppercase())
            .map(|v| v.trim())
    }

    /// Return a copy pointing at a new location
    pub fn relocated(&self, path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..self.clone()
        }
    }

    /// Validate metadata integrity
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("observatory", &self.observatory),
            ("instrument", &self.instrument),
            ("detector", &self.detector),
            ("measurement", &self.measurement),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} cannot be empty"));
            }
            // Fields become archive path components.
            if value.contains(['/', '\\']) || value == "." || value == ".." {
                return Err(format!("{field} '{value}' is not a valid path component"));
            }
        }

        if self.filename().is_empty() {
            return Err(format!("Path {} has no file name", self.path.display()));
        }

        Ok(())
    }
}

/// Reason an image was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BadImageReason {
    /// Header could not be parsed
    #[serde(rename = "HEADER")]
    Header,
    /// Calibration / dark frame
    #[serde(rename = "DARK")]
    Dark,
    /// Data completeness below threshold
    #[serde(rename = "PERCENTD")]
    PercentD,
    /// Unexpected compression scale factor for the detector
    #[serde(rename = "WrongMask")]
    WrongMask,
}

impl BadImageReason {
    /// Reason code stored in the catalog
    pub fn code(&self) -> &'static str {
        match self {
            BadImageReason::Header => "HEADER",
            BadImageReason::Dark => "DARK",
            BadImageReason::PercentD => "PERCENTD",
            BadImageReason::WrongMask => "WrongMask",
        }
    }
}

impl std::fmt::Display for BadImageReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BadImageReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HEADER" => Ok(BadImageReason::Header),
            "DARK" => Ok(BadImageReason::Dark),
            "PERCENTD" => Ok(BadImageReason::PercentD),
            "WrongMask" => Ok(BadImageReason::WrongMask),
            _ => Err(format!("Invalid quarantine reason: {s}")),
        }
    }
}

/// A file that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// File name
    pub filename: String,
    /// Reason code
    pub reason: BadImageReason,
    /// When the file was quarantined
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    /// Create a record stamped with the current time
    pub fn new(filename: impl Into<String>, reason: BadImageReason) -> Self {
        Self {
            filename: filename.into(),
            reason,
            quarantined_at: Utc::now(),
        }
    }
}
