use async_trait::async_trait;
use hvpull::downloader::{
    DownloadOutcome, DownloadResult, Downloader, DownloaderPool, PoolSettings, StagedFile,
};
use hvpull::shutdown::ShutdownCoordinator;
use hvpull::RemoteFileReference;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// All waiters wake on a single request.
#[tokio::test]
async fn shutdown_concurrent_waiters_all_notified() {
    let shutdown = ShutdownCoordinator::shared();

    let mut waiters = Vec::new();
    for _ in 0..10 {
        let handle = shutdown.clone();
        waiters.push(tokio::spawn(async move {
            handle.wait_for_shutdown().await;
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.request_shutdown();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "A waiter was not notified of shutdown");
    }
}

#[tokio::test]
async fn poll_sleep_is_interrupted() {
    let shutdown = ShutdownCoordinator::shared();
    let sleeper = {
        let handle = shutdown.clone();
        tokio::spawn(async move { handle.sleep_or_shutdown(Duration::from_secs(3600)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.request_shutdown();

    let completed = tokio::time::timeout(Duration::from_secs(1), sleeper)
        .await
        .expect("sleep should be interrupted")
        .unwrap();
    assert!(!completed);
}

/// Takes a fixed time per file and counts how many it started
struct SlowDownloader {
    delay: Duration,
    started: AtomicUsize,
}

#[async_trait]
impl Downloader for SlowDownloader {
    async fn fetch(
        &self,
        file: &RemoteFileReference,
        staging_dir: &Path,
    ) -> DownloadResult<StagedFile> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let path = staging_dir.join(&file.basename);
        std::fs::write(&path, b"jp2").unwrap();
        Ok(StagedFile { path, bytes: 3 })
    }
}

/// In-flight downloads finish; queued ones are abandoned without an outcome.
#[tokio::test]
async fn shutdown_abandons_queued_tasks_and_finishes_in_flight() {
    let staging = tempfile::tempdir().unwrap();
    let shutdown = ShutdownCoordinator::shared();
    let downloader = Arc::new(SlowDownloader {
        delay: Duration::from_millis(200),
        started: AtomicUsize::new(0),
    });

    let mut pool = DownloaderPool::spawn(
        "SOHO",
        downloader.clone(),
        staging.path(),
        PoolSettings {
            workers: 2,
            max_retries: 0,
            retry_backoff: Duration::from_millis(10),
        },
        shutdown.clone(),
    );

    let files = (0..10).map(|i| RemoteFileReference::new(format!("/srv/f{i}.jp2"), "SOHO"));
    pool.enqueue(files);

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();
    let abandoned = pool.abandon_pending();

    tokio::time::timeout(Duration::from_secs(2), pool.join())
        .await
        .expect("join should return once in-flight work is done");

    let outcomes = pool.drain_outcomes();
    let started = downloader.started.load(Ordering::SeqCst);
    assert_eq!(started, 2);
    assert_eq!(abandoned, 8);
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, DownloadOutcome::Downloaded { .. })));

    pool.shutdown(Duration::from_secs(1)).await;
}
