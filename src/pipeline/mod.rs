//! Validation and transcoding of staged files
//!
//! Each staged file ends in exactly one place:
//! - valid and transcoded: returned for ingestion
//! - rejected: moved to the quarantine directory and recorded in the catalog
//! - transcode failure: left in the incoming directory for inspection

pub mod header;
pub mod rules;
pub mod transcode;

use crate::catalog::Catalog;
use crate::ingest::{move_file, IngestError};
use crate::metrics;
use crate::{BadImageReason, ImageMetadata, QuarantineRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

pub use header::{HeaderError, HeaderParser, Jp2HeaderParser};
pub use rules::ValidationRules;
pub use transcode::{KakaduTranscoder, PassthroughTranscoder, TranscodeError, Transcoder};

/// Tally of what happened to one acquisition batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Files staged by the downloader pools
    pub downloaded: usize,
    /// Tasks dropped by the downloader pools
    pub download_failures: usize,
    /// Tasks removed from queues by a shutdown
    pub abandoned: usize,
    /// Files rejected by validation
    pub quarantined: Vec<QuarantineRecord>,
    /// Files left in incoming after a transcode failure
    pub transcode_failures: Vec<PathBuf>,
    /// New catalog rows
    pub ingested: usize,
}

impl BatchReport {
    /// Add another report's counts into this one
    pub fn merge(&mut self, other: BatchReport) {
        self.downloaded += other.downloaded;
        self.download_failures += other.download_failures;
        self.abandoned += other.abandoned;
        self.quarantined.extend(other.quarantined);
        self.transcode_failures.extend(other.transcode_failures);
        self.ingested += other.ingested;
    }
}

/// Header parsing, validation, quarantine and transcoding
pub struct ImagePipeline {
    parser: Arc<dyn HeaderParser>,
    rules: ValidationRules,
    transcoder: Arc<dyn Transcoder>,
    quarantine_dir: PathBuf,
}

impl ImagePipeline {
    /// Assemble a pipeline
    pub fn new(
        parser: Arc<dyn HeaderParser>,
        rules: ValidationRules,
        transcoder: Arc<dyn Transcoder>,
        quarantine_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            parser,
            rules,
            transcoder,
            quarantine_dir: quarantine_dir.into(),
        }
    }

    /// Directory receiving rejected files
    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    /// Parse and validate one file without moving it
    pub fn inspect(&self, path: &Path) -> Result<ImageMetadata, BadImageReason> {
        let image = self.parser.parse(path).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Header parse failed");
            BadImageReason::Header
        })?;
        image.validate().map_err(|e| {
            warn!(path = %path.display(), error = %e, "Header fields unusable");
            BadImageReason::Header
        })?;
        self.rules.check(&image)?;
        Ok(image)
    }

    /// Triage staged files; returns the images ready for ingestion.
    ///
    /// A bad file never aborts the batch. Errors are returned only when the
    /// quarantine directory or the catalog cannot be written.
    pub async fn process(
        &self,
        staged: Vec<PathBuf>,
        catalog: &mut dyn Catalog,
        report: &mut BatchReport,
    ) -> Result<Vec<ImageMetadata>, IngestError> {
        let mut valid = Vec::with_capacity(staged.len());

        for path in staged {
            let image = match self.inspect(&path) {
                Ok(image) => image,
                Err(reason) => {
                    report.quarantined.push(self.quarantine(&path, reason, catalog).await?);
                    continue;
                }
            };

            match self.transcoder.transcode(&image).await {
                Ok(()) => valid.push(image),
                Err(e) => {
                    error!(
                        filename = %image.filename(),
                        error = %e,
                        "Transcode failed, leaving file in incoming"
                    );
                    metrics::record_transcode_failure();
                    report.transcode_failures.push(path);
                }
            }
        }

        Ok(valid)
    }

    async fn quarantine(
        &self,
        path: &Path,
        reason: BadImageReason,
        catalog: &mut dyn Catalog,
    ) -> Result<QuarantineRecord, IngestError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let destination = self.quarantine_dir.join(&filename);

        move_file(path, &destination)
            .await
            .map_err(|e| IngestError::Storage {
                path: destination.display().to_string(),
                message: e.to_string(),
            })?;
        catalog.mark_quarantined(&filename, reason)?;

        warn!(filename = %filename, reason = %reason, "Quarantined image");
        metrics::record_quarantined(reason.code());
        Ok(QuarantineRecord::new(filename, reason))
    }
}
