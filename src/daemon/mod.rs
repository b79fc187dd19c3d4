//! Poll / acquire / ingest / sleep orchestrator
//!
//! One [`ImageRetrievalDaemon`] owns a browser and a downloader pool per
//! selected server, the catalog, the validation pipeline and the ingestor.
//! All catalog access happens on the task driving [`ImageRetrievalDaemon::run`];
//! workers only see their queue and the staging directory.
//!
//! Each poll cycle:
//! 1. queries every server (a server that is unreachable is skipped for the cycle)
//! 2. deduplicates across mirrors, then drops files already cataloged or quarantined
//! 3. downloads in batches of `batch_size` per server, validating and ingesting
//!    each batch before starting the next
//! 4. sleeps until the next cycle, waking early on shutdown

mod state;

pub use state::DaemonState;

use crate::browser::{create_browser, DataBrowser};
use crate::catalog::{Catalog, CatalogError, JsonCatalog};
use crate::config::DaemonConfig;
use crate::dedup;
use crate::downloader::{
    create_downloader, DownloadError, DownloadOutcome, Downloader, DownloaderPool, PoolSettings,
};
use crate::ingest::{IngestError, Ingestor};
use crate::metrics::{self, CycleMetrics};
use crate::net::build_http_client;
use crate::pipeline::{
    BatchReport, ImagePipeline, Jp2HeaderParser, KakaduTranscoder, PassthroughTranscoder,
    Transcoder, ValidationRules,
};
use crate::server::registry::{BrowseMethod, DownloadMethod};
use crate::server::{resolve_servers, DataServerConfig, RegistryError};
use crate::shutdown::SharedShutdown;
use crate::{parse_datetime, RemoteFileReference, DATE_FORMAT};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extension of the files the daemon retrieves
pub const IMAGE_EXTENSION: &str = "jp2";

/// Daemon errors
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// A working directory is missing, cannot be created or is not writable
    #[error("directory {path} is not usable: {message}")]
    Directory {
        /// Directory
        path: String,
        /// Underlying error
        message: String,
    },

    /// Invalid server, browser or downloader selection
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Invalid settings
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Start/end override rejected
    #[error("invalid time range: {0}")]
    InvalidRange(String),

    /// Catalog could not be read or written
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Archive or quarantine storage failed
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// A download hit a storage error that makes further work unsafe
    #[error("fatal resource error: {0}")]
    Resource(DownloadError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(String),

    /// State machine violated
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        /// Current state
        from: DaemonState,
        /// Requested state
        to: DaemonState,
    },
}

/// Optional start/end overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// First cycle starts here instead of `now - lookback`
    pub start: Option<DateTime<Utc>>,
    /// When set, exactly one cycle over `[start, end]` runs
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Parse `YYYY-MM-DD HH:MM:SS` overrides
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, DaemonError> {
        let parse = |label: &str, value: &str| {
            parse_datetime(value).map_err(|e| {
                DaemonError::InvalidRange(format!(
                    "{label} '{value}' is not in {DATE_FORMAT} format: {e}"
                ))
            })
        };

        let range = Self {
            start: start.map(|s| parse("start", s)).transpose()?,
            end: end.map(|e| parse("end", e)).transpose()?,
        };

        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(DaemonError::InvalidRange(format!(
                    "start {} is after end {}",
                    start.format(DATE_FORMAT),
                    end.format(DATE_FORMAT)
                )));
            }
        }
        Ok(range)
    }

    /// Whether the run stops after one cycle
    pub fn is_one_shot(&self) -> bool {
        self.end.is_some()
    }
}

/// Servers and access methods chosen on the command line
#[derive(Debug, Clone)]
pub struct ServerSelection {
    /// Selected servers, in rotation order
    pub servers: Vec<DataServerConfig>,
    /// How directories are listed
    pub browse: BrowseMethod,
    /// How files are fetched
    pub download: DownloadMethod,
}

impl ServerSelection {
    /// Resolve configuration keys, e.g. `("lmsal,soho", "http", "urllib")`
    pub fn parse(servers: &str, browse: &str, download: &str) -> Result<Self, RegistryError> {
        Ok(Self {
            servers: resolve_servers(servers)?,
            browse: browse.parse()?,
            download: download.parse()?,
        })
    }
}

/// Cumulative counters for one daemon run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStats {
    /// Poll cycles started
    pub cycles: u64,
    /// Files listed by browsers, before deduplication
    pub files_discovered: usize,
    /// Files skipped because the catalog already knows them
    pub files_skipped_known: usize,
    /// Files staged successfully
    pub downloads_completed: usize,
    /// Files dropped after terminal download failures
    pub download_failures: usize,
    /// Queued files dropped by a shutdown
    pub downloads_abandoned: usize,
    /// Images archived and cataloged
    pub images_ingested: usize,
    /// Images rejected by validation
    pub images_quarantined: usize,
    /// Images left in incoming after a transcode failure
    pub transcode_failures: usize,
    /// Server queries skipped because the server was unreachable
    pub servers_unreachable: usize,
}

impl DaemonStats {
    fn record_batch(&mut self, report: &BatchReport) {
        self.downloads_completed += report.downloaded;
        self.download_failures += report.download_failures;
        self.downloads_abandoned += report.abandoned;
        self.images_ingested += report.ingested;
        self.images_quarantined += report.quarantined.len();
        self.transcode_failures += report.transcode_failures.len();
    }
}

/// Loop tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Files per server per acquisition batch
    pub batch_size: usize,
    /// Fixed sleep between cycles; `None` uses the shortest server pause
    pub poll_interval: Option<Duration>,
    /// Time allowed for in-flight downloads after shutdown
    pub shutdown_grace: Duration,
}

impl From<&DaemonConfig> for LoopSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            poll_interval: config.poll_interval,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

/// One server's browser paired with its downloader
pub struct ServerComponents {
    /// Directory browser
    pub browser: Box<dyn DataBrowser>,
    /// File downloader
    pub downloader: Arc<dyn Downloader>,
}

/// Everything the daemon needs, already constructed
pub struct DaemonComponents {
    /// Per-server browser and downloader, in rotation order
    pub servers: Vec<ServerComponents>,
    /// Catalog collaborator
    pub catalog: Box<dyn Catalog>,
    /// Validation and transcoding
    pub pipeline: ImagePipeline,
    /// Archive placement
    pub ingestor: Ingestor,
    /// Staging directory for downloads
    pub incoming_dir: PathBuf,
    /// Worker pool settings
    pub pool: PoolSettings,
    /// Loop tuning
    pub settings: LoopSettings,
}

struct ServerHandle {
    browser: Box<dyn DataBrowser>,
    pool: DownloaderPool,
}

impl ServerHandle {
    fn name(&self) -> &str {
        &self.browser.server().name
    }
}

/// The image retrieval daemon
pub struct ImageRetrievalDaemon {
    servers: Vec<ServerHandle>,
    catalog: Box<dyn Catalog>,
    pipeline: ImagePipeline,
    ingestor: Ingestor,
    settings: LoopSettings,
    shutdown: SharedShutdown,
    state: DaemonState,
    stats: DaemonStats,
}

impl ImageRetrievalDaemon {
    /// Build a daemon from settings and a server selection.
    ///
    /// Creates the working directories and opens the catalog. Must be called
    /// inside a Tokio runtime since the worker pools are spawned here.
    pub fn new(
        config: &DaemonConfig,
        selection: &ServerSelection,
        shutdown: SharedShutdown,
    ) -> Result<Self, DaemonError> {
        let incoming = config.incoming_dir();
        let quarantine = config.quarantine_dir();
        for dir in [&config.working_dir, &config.image_archive, &incoming, &quarantine] {
            prepare_directory(dir)?;
        }

        let servers = config.apply_server_overrides(selection.servers.clone());
        for server in &servers {
            server.validate().map_err(DaemonError::Config)?;
        }

        let client = build_http_client(config.http_timeouts())
            .map_err(|e| DaemonError::Http(e.to_string()))?;
        let downloader = create_downloader(selection.download, client.clone());
        let servers = servers
            .into_iter()
            .map(|server| ServerComponents {
                browser: create_browser(
                    selection.browse,
                    server,
                    client.clone(),
                    config.listing_retries,
                ),
                downloader: downloader.clone(),
            })
            .collect();

        let transcoder: Arc<dyn Transcoder> = if config.transcode_enabled {
            Arc::new(KakaduTranscoder::new(config.transcode_command.clone()))
        } else {
            Arc::new(PassthroughTranscoder)
        };

        let catalog_path = config.catalog_path();
        info!(path = %catalog_path.display(), "Opening catalog");
        let catalog = JsonCatalog::open(catalog_path)?;

        let components = DaemonComponents {
            servers,
            catalog: Box::new(catalog),
            pipeline: ImagePipeline::new(
                Arc::new(Jp2HeaderParser),
                ValidationRules {
                    min_percentd: config.min_percentd,
                },
                transcoder,
                quarantine,
            ),
            ingestor: Ingestor::new(config.image_archive.clone()),
            incoming_dir: incoming,
            pool: config.pool_settings(),
            settings: LoopSettings::from(config),
        };

        info!(
            servers = %selection.servers.iter().map(|s| s.key()).collect::<Vec<_>>().join(","),
            browse = %selection.browse,
            download = %selection.download,
            workers = config.max_downloads,
            "Initializing daemon"
        );

        Ok(Self::from_components(components, shutdown))
    }

    /// Assemble a daemon from pre-built parts, spawning one pool per server
    pub fn from_components(components: DaemonComponents, shutdown: SharedShutdown) -> Self {
        let servers = components
            .servers
            .into_iter()
            .map(|server| {
                let pool = DownloaderPool::spawn(
                    server.browser.server().name.clone(),
                    server.downloader,
                    components.incoming_dir.clone(),
                    components.pool,
                    shutdown.clone(),
                );
                ServerHandle {
                    browser: server.browser,
                    pool,
                }
            })
            .collect();

        Self {
            servers,
            catalog: components.catalog,
            pipeline: components.pipeline,
            ingestor: components.ingestor,
            settings: components.settings,
            shutdown,
            state: DaemonState::Idle,
            stats: DaemonStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    /// Catalog handle, for inspection after a run
    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    /// Run until shutdown, or for one cycle when `range.end` is set.
    ///
    /// Returns the final counters. A fatal error stops the workers before
    /// being returned.
    pub async fn run(&mut self, range: TimeRange) -> Result<DaemonStats, DaemonError> {
        self.enter(DaemonState::Polling)?;
        let result = self.run_loop(range).await;
        self.stop().await;
        result.map(|()| self.stats.clone())
    }

    async fn run_loop(&mut self, range: TimeRange) -> Result<(), DaemonError> {
        let mut start_override = range.start;

        loop {
            let end = range.end.unwrap_or_else(Utc::now);
            self.run_cycle(start_override.take(), end).await?;

            if range.is_one_shot() {
                info!("Finished processing requested time range");
                return Ok(());
            }
            if self.shutdown.is_shutdown_requested() {
                return Ok(());
            }

            self.enter(DaemonState::Sleeping)?;
            let pause = self.sleep_interval();
            info!(minutes = pause.as_secs() / 60, "Sleeping until next poll cycle");
            if !self.shutdown.sleep_or_shutdown(pause).await {
                return Ok(());
            }
            self.enter(DaemonState::Polling)?;
        }
    }

    /// One poll cycle over `[start, end]`.
    ///
    /// `start` defaults to each server's lookback window.
    async fn run_cycle(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
    ) -> Result<BatchReport, DaemonError> {
        self.stats.cycles += 1;
        let cycle = CycleMetrics::start(self.stats.cycles);

        let discovered = self.poll(start, end).await;
        if self.shutdown.is_shutdown_requested() {
            info!("Shutdown requested during polling");
            return Ok(BatchReport::default());
        }

        self.enter(DaemonState::Acquiring)?;
        let candidates = self.filter_new(dedup::deduplicate(discovered))?;
        let total = dedup::total_files(&candidates);
        if total > 0 {
            info!(files = total, "Found new files");
        } else {
            info!("No new files found");
        }

        let mut pending: Vec<VecDeque<RemoteFileReference>> =
            candidates.into_iter().map(VecDeque::from).collect();
        let mut report = BatchReport::default();
        let mut batch = 0usize;

        while pending.iter().any(|queue| !queue.is_empty()) {
            if self.shutdown.is_shutdown_requested() {
                let remaining: usize = pending.iter().map(VecDeque::len).sum();
                info!(remaining, "Shutdown requested, not starting another batch");
                break;
            }

            batch += 1;
            self.enter(DaemonState::Acquiring)?;
            let mut batch_report = BatchReport::default();
            let staged = self.acquire_batch(batch, &mut pending, &mut batch_report).await?;

            self.enter(DaemonState::Ingesting)?;
            self.ingest_batch(staged, &mut batch_report).await?;

            self.stats.record_batch(&batch_report);
            report.merge(batch_report);
        }

        cycle.record_complete(report.ingested, report.quarantined.len());
        Ok(report)
    }

    /// Query every server; an unreachable server yields an empty list
    async fn poll(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: DateTime<Utc>,
    ) -> Vec<Vec<RemoteFileReference>> {
        let now = Utc::now();
        let mut discovered = Vec::with_capacity(self.servers.len());

        for handle in &self.servers {
            if self.shutdown.is_shutdown_requested() {
                discovered.push(Vec::new());
                continue;
            }

            let server = handle.browser.server();
            let start = start.unwrap_or_else(|| server.start_time_at(now));
            match handle
                .browser
                .query(start, end, IMAGE_EXTENSION, &self.shutdown)
                .await
            {
                Ok(files) => {
                    debug!(server = %server.name, files = files.len(), "Query complete");
                    metrics::record_discovered(&server.name, files.len());
                    self.stats.files_discovered += files.len();
                    discovered.push(files);
                }
                Err(e) => {
                    error!(server = %server.name, error = %e, "Server unreachable, skipping for this cycle");
                    metrics::record_server_unreachable(&server.name);
                    self.stats.servers_unreachable += 1;
                    discovered.push(Vec::new());
                }
            }
        }

        discovered
    }

    /// Drop files the catalog already holds or has rejected
    fn filter_new(
        &mut self,
        lists: Vec<Vec<RemoteFileReference>>,
    ) -> Result<Vec<Vec<RemoteFileReference>>, DaemonError> {
        let mut skipped = 0usize;
        let mut filtered = Vec::with_capacity(lists.len());

        for list in lists {
            let mut keep = Vec::with_capacity(list.len());
            for file in list {
                if self.catalog.is_known(&file.basename)?
                    || self.catalog.is_quarantined(&file.basename)?
                {
                    skipped += 1;
                    continue;
                }
                keep.push(file);
            }
            filtered.push(keep);
        }

        if skipped > 0 {
            debug!(skipped, "Skipped files already in catalog");
            metrics::record_skipped_known(skipped);
        }
        self.stats.files_skipped_known += skipped;
        Ok(filtered)
    }

    /// Enqueue up to `batch_size` files per server and wait for the batch.
    ///
    /// On shutdown, tasks not yet started are abandoned and in-flight
    /// downloads get `shutdown_grace` to finish.
    async fn acquire_batch(
        &mut self,
        batch: usize,
        pending: &mut [VecDeque<RemoteFileReference>],
        report: &mut BatchReport,
    ) -> Result<Vec<PathBuf>, DaemonError> {
        let batch_size = self.settings.batch_size;
        let mut enqueued = 0usize;
        for (handle, queue) in self.servers.iter().zip(pending.iter_mut()) {
            let take = queue.len().min(batch_size);
            enqueued += handle.pool.enqueue(queue.drain(..take));
        }
        info!(batch, files = enqueued, "Downloading batch");

        let servers = &self.servers;
        let shutdown = &self.shutdown;
        tokio::select! {
            _ = join_all(servers) => {}
            _ = shutdown.wait_for_shutdown() => {
                for handle in servers {
                    report.abandoned += handle.pool.abandon_pending();
                }
                let in_flight: usize = servers.iter().map(|h| h.pool.in_flight()).sum();
                info!(in_flight, abandoned = report.abandoned, "Shutdown requested, waiting for in-flight downloads");
                if tokio::time::timeout(self.settings.shutdown_grace, join_all(servers))
                    .await
                    .is_err()
                {
                    warn!(grace_secs = self.settings.shutdown_grace.as_secs(), "In-flight downloads did not finish within grace period");
                }
            }
        }

        let mut staged = Vec::new();
        for handle in &mut self.servers {
            report.abandoned += handle.pool.take_dropped_retries();
            for outcome in handle.pool.drain_outcomes() {
                match outcome {
                    DownloadOutcome::Downloaded { staged: path, .. } => {
                        report.downloaded += 1;
                        staged.push(path);
                    }
                    DownloadOutcome::Failed { .. } => report.download_failures += 1,
                }
            }
        }

        for handle in &self.servers {
            if let Some(err) = handle.pool.take_fatal_error() {
                error!(server = %handle.name(), error = %err, "Stopping on fatal resource error");
                return Err(DaemonError::Resource(err));
            }
        }

        Ok(staged)
    }

    /// Validate, transcode, quarantine and archive one batch
    async fn ingest_batch(
        &mut self,
        staged: Vec<PathBuf>,
        report: &mut BatchReport,
    ) -> Result<(), DaemonError> {
        if staged.is_empty() {
            return Ok(());
        }

        let valid = self
            .pipeline
            .process(staged, self.catalog.as_mut(), report)
            .await?;
        report.ingested = self.ingestor.ingest(valid, self.catalog.as_mut()).await?;
        metrics::record_ingested(report.ingested);

        info!(
            ingested = report.ingested,
            quarantined = report.quarantined.len(),
            transcode_failures = report.transcode_failures.len(),
            download_failures = report.download_failures,
            "Batch complete"
        );
        Ok(())
    }

    fn sleep_interval(&self) -> Duration {
        self.settings.poll_interval.unwrap_or_else(|| {
            self.servers
                .iter()
                .map(|h| h.browser.server().pause)
                .min()
                .unwrap_or(Duration::from_secs(60))
        })
    }

    fn enter(&mut self, next: DaemonState) -> Result<(), DaemonError> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(DaemonError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    async fn stop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = DaemonState::ShuttingDown;
        info!("Stopping downloader pools");

        let grace = self.settings.shutdown_grace;
        for handle in self.servers.drain(..) {
            handle.pool.shutdown(grace).await;
        }

        self.state = DaemonState::Stopped;
        info!(
            cycles = self.stats.cycles,
            ingested = self.stats.images_ingested,
            quarantined = self.stats.images_quarantined,
            "Exiting daemon"
        );
    }
}

async fn join_all(servers: &[ServerHandle]) {
    for handle in servers {
        handle.pool.join().await;
    }
}

/// Create `dir` if needed and verify it accepts new files
fn prepare_directory(dir: &Path) -> Result<(), DaemonError> {
    let failure = |e: std::io::Error| DaemonError::Directory {
        path: dir.display().to_string(),
        message: e.to_string(),
    };

    std::fs::create_dir_all(dir).map_err(failure)?;
    tempfile::NamedTempFile::new_in(dir).map_err(failure)?;
    debug!(path = %dir.display(), "Directory ready");
    Ok(())
}
