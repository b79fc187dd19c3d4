//! Fixed-size worker pool draining one server's queue

use super::config::{calculate_backoff, PoolSettings};
use super::failure::RetryContext;
use super::queue::TaskQueue;
use super::task::{DownloadOutcome, DownloadTask};
use super::{DownloadError, Downloader};
use crate::metrics::{self, DownloadMetrics};
use crate::shutdown::SharedShutdown;
use crate::RemoteFileReference;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct WorkerContext {
    server: String,
    queue: Arc<TaskQueue>,
    downloader: Arc<dyn Downloader>,
    staging_dir: PathBuf,
    settings: PoolSettings,
    shutdown: SharedShutdown,
    outcomes: mpsc::UnboundedSender<DownloadOutcome>,
    fatal: Mutex<Option<DownloadError>>,
    dropped_retries: AtomicUsize,
}

impl WorkerContext {
    fn report(&self, outcome: DownloadOutcome) {
        // The receiver lives as long as the pool; a send error means it is being torn down.
        let _ = self.outcomes.send(outcome);
        self.queue.task_done();
    }

    fn record_fatal(&self, err: &DownloadError) {
        let mut slot = self.fatal.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(err.clone());
        }
    }
}

/// Worker tasks for one server plus the queue they drain
pub struct DownloaderPool {
    context: Arc<WorkerContext>,
    outcomes: mpsc::UnboundedReceiver<DownloadOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl DownloaderPool {
    /// Spawn `settings.workers` workers onto the current runtime
    pub fn spawn(
        server: impl Into<String>,
        downloader: Arc<dyn Downloader>,
        staging_dir: impl Into<PathBuf>,
        settings: PoolSettings,
        shutdown: SharedShutdown,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = Arc::new(WorkerContext {
            server: server.into(),
            queue: Arc::new(TaskQueue::new()),
            downloader,
            staging_dir: staging_dir.into(),
            settings,
            shutdown,
            outcomes: tx,
            fatal: Mutex::new(None),
            dropped_retries: AtomicUsize::new(0),
        });

        let workers = (0..settings.workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, context.clone())))
            .collect();

        debug!(server = %context.server, workers = settings.workers.max(1), "Downloader pool started");

        Self {
            context,
            outcomes: rx,
            workers,
        }
    }

    /// Server this pool downloads from
    pub fn server(&self) -> &str {
        &self.context.server
    }

    /// Enqueue files; returns how many were accepted
    pub fn enqueue(&self, files: impl IntoIterator<Item = RemoteFileReference>) -> usize {
        let accepted = files
            .into_iter()
            .map(|file| self.context.queue.put(DownloadTask::new(file)))
            .filter(|accepted| *accepted)
            .count();
        metrics::set_queue_depth(&self.context.server, self.context.queue.len());
        accepted
    }

    /// Wait until every enqueued task reached a terminal outcome
    pub async fn join(&self) {
        self.context.queue.join().await;
        metrics::set_queue_depth(&self.context.server, 0);
    }

    /// Drop tasks no worker has started; returns how many were dropped
    pub fn abandon_pending(&self) -> usize {
        let abandoned = self.context.queue.abandon_pending();
        if !abandoned.is_empty() {
            info!(
                server = %self.context.server,
                abandoned = abandoned.len(),
                "Abandoned queued downloads"
            );
        }
        metrics::set_queue_depth(&self.context.server, 0);
        abandoned.len()
    }

    /// Retries dropped because of shutdown since the last call
    pub fn take_dropped_retries(&self) -> usize {
        self.context.dropped_retries.swap(0, Ordering::SeqCst)
    }

    /// Tasks enqueued but not yet finished
    pub fn in_flight(&self) -> usize {
        self.context.queue.unfinished()
    }

    /// Collect outcomes reported since the last call
    pub fn drain_outcomes(&mut self) -> Vec<DownloadOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.outcomes.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// First fatal error seen by any worker, if any
    pub fn take_fatal_error(&self) -> Option<DownloadError> {
        self.context
            .fatal
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    /// Stop accepting work and wait up to `grace` for workers to exit
    pub async fn shutdown(self, grace: Duration) {
        self.context.queue.close();
        let server = self.context.server.clone();
        for mut worker in self.workers {
            if tokio::time::timeout(grace, &mut worker).await.is_err() {
                warn!(server = %server, "Worker did not stop within grace period, aborting");
                worker.abort();
            }
        }
        debug!(server = %server, "Downloader pool stopped");
    }
}

async fn run_worker(id: usize, ctx: Arc<WorkerContext>) {
    while let Some(task) = ctx.queue.pop(&ctx.shutdown).await {
        let recorder = DownloadMetrics::start(ctx.server.clone());

        match ctx.downloader.fetch(&task.file, &ctx.staging_dir).await {
            Ok(staged) => {
                recorder.record_success(staged.bytes);
                ctx.report(DownloadOutcome::Downloaded {
                    task,
                    staged: staged.path,
                    bytes: staged.bytes,
                });
            }
            Err(err) if err.is_fatal() => {
                error!(
                    worker = id,
                    server = %ctx.server,
                    filename = %task.file.basename,
                    error = %err,
                    "Fatal storage error, requesting shutdown"
                );
                recorder.record_failure(err.description());
                ctx.record_fatal(&err);
                ctx.shutdown.request_shutdown();
                ctx.report(DownloadOutcome::Failed { task, error: err });
            }
            Err(err) if err.is_retryable() && task.attempt < ctx.settings.max_retries => {
                let backoff = calculate_backoff(ctx.settings.retry_backoff, task.attempt);
                warn!(
                    worker = id,
                    "{}",
                    RetryContext::new(&task, ctx.settings.max_retries, &err, backoff).format_retry()
                );
                metrics::record_retry(&ctx.server, task.attempt + 1, backoff);

                if !backoff.is_zero() {
                    ctx.shutdown.sleep_or_shutdown(backoff).await;
                }
                if ctx.shutdown.is_shutdown_requested() {
                    // Pending work is being abandoned; the file is rediscovered next run.
                    debug!(server = %ctx.server, filename = %task.file.basename, "Shutdown requested, retry dropped");
                    ctx.dropped_retries.fetch_add(1, Ordering::SeqCst);
                    ctx.queue.task_done();
                } else if !ctx.queue.requeue(task.retry()) {
                    debug!(server = %ctx.server, "Queue closed, retry dropped");
                    ctx.dropped_retries.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(err) => {
                warn!(
                    worker = id,
                    "{}",
                    RetryContext::new(&task, ctx.settings.max_retries, &err, Duration::ZERO)
                        .format_failure()
                );
                recorder.record_failure(err.description());
                ctx.report(DownloadOutcome::Failed { task, error: err });
            }
        }
    }

    debug!(worker = id, server = %ctx.server, "Worker exiting");
}
