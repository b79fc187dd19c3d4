//! Observability metrics for the retrieval daemon
//!
//! Counters and gauges are recorded through the `metrics` facade everywhere;
//! they only become visible once [`init_metrics`] installs the Prometheus
//! exporter (`--metrics-addr`). Without an exporter the calls are no-ops.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls after a successful install are ignored.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "poll_cycles_total",
        Unit::Count,
        "Total number of completed poll cycles"
    );
    describe_histogram!(
        "poll_cycle_duration_seconds",
        Unit::Seconds,
        "Wall time of one poll cycle"
    );
    describe_counter!(
        "files_discovered_total",
        Unit::Count,
        "Files listed by browsers before deduplication"
    );
    describe_counter!(
        "files_skipped_known_total",
        Unit::Count,
        "Files skipped because the catalog already has them"
    );
    describe_counter!(
        "server_unreachable_total",
        Unit::Count,
        "Poll cycles in which a server could not be reached"
    );
    describe_counter!(
        "downloads_completed_total",
        Unit::Count,
        "Total number of successful downloads completed"
    );
    describe_counter!(
        "download_bytes_total",
        Unit::Bytes,
        "Bytes written to the incoming directory"
    );
    describe_counter!(
        "downloads_failed_total",
        Unit::Count,
        "Total number of downloads dropped"
    );
    describe_counter!(
        "download_retries_total",
        Unit::Count,
        "Total number of re-enqueued downloads"
    );
    describe_gauge!(
        "download_queue_depth",
        Unit::Count,
        "Tasks waiting for a worker"
    );
    describe_counter!(
        "images_ingested_total",
        Unit::Count,
        "Images moved into the archive and cataloged"
    );
    describe_counter!(
        "images_quarantined_total",
        Unit::Count,
        "Images rejected by validation"
    );
    describe_counter!(
        "transcode_failures_total",
        Unit::Count,
        "Images left in incoming after a transcode failure"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Poll cycle timing
pub struct CycleMetrics {
    cycle: u64,
    start_time: Instant,
}

impl CycleMetrics {
    /// Start timing a poll cycle
    pub fn start(cycle: u64) -> Self {
        debug!(cycle, "Poll cycle started");
        Self {
            cycle,
            start_time: Instant::now(),
        }
    }

    /// Record cycle completion
    pub fn record_complete(&self, ingested: usize, quarantined: usize) {
        let duration = self.start_time.elapsed();
        counter!("poll_cycles_total").increment(1);
        histogram!("poll_cycle_duration_seconds").record(duration.as_secs_f64());

        info!(
            cycle = self.cycle,
            ingested,
            quarantined,
            duration_secs = duration.as_secs(),
            "Poll cycle complete"
        );
    }
}

/// Per-file download timing
pub struct DownloadMetrics {
    server: String,
    start_time: Instant,
}

impl DownloadMetrics {
    /// Start tracking one download
    pub fn start(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            start_time: Instant::now(),
        }
    }

    /// Record a staged file
    pub fn record_success(&self, bytes: u64) {
        counter!("downloads_completed_total", "server" => self.server.clone()).increment(1);
        counter!("download_bytes_total", "server" => self.server.clone()).increment(bytes);

        debug!(
            server = %self.server,
            bytes,
            duration_ms = self.start_time.elapsed().as_millis(),
            "Download completed"
        );
    }

    /// Record a dropped task
    pub fn record_failure(&self, reason: &str) {
        counter!(
            "downloads_failed_total",
            "server" => self.server.clone(),
            "reason" => reason.to_string(),
        )
        .increment(1);
    }
}

/// Record a re-enqueued download
pub fn record_retry(server: &str, attempt: u32, backoff: Duration) {
    counter!(
        "download_retries_total",
        "server" => server.to_string(),
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    debug!(server, attempt, backoff_ms = backoff.as_millis(), "Retry recorded");
}

/// Record files listed by a browser
pub fn record_discovered(server: &str, count: usize) {
    counter!("files_discovered_total", "server" => server.to_string()).increment(count as u64);
}

/// Record files skipped because they are already known
pub fn record_skipped_known(count: usize) {
    counter!("files_skipped_known_total").increment(count as u64);
}

/// Record an unreachable server
pub fn record_server_unreachable(server: &str) {
    counter!("server_unreachable_total", "server" => server.to_string()).increment(1);
    warn!(server, "Server unreachable this cycle");
}

/// Update a server's queue depth gauge
pub fn set_queue_depth(server: &str, depth: usize) {
    gauge!("download_queue_depth", "server" => server.to_string()).set(depth as f64);
}

/// Record images ingested in one batch
pub fn record_ingested(count: usize) {
    counter!("images_ingested_total").increment(count as u64);
}

/// Record one quarantined image
pub fn record_quarantined(reason: &str) {
    counter!("images_quarantined_total", "reason" => reason.to_string()).increment(1);
}

/// Record one transcode failure
pub fn record_transcode_failure() {
    counter!("transcode_failures_total").increment(1);
}
