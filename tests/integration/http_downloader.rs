//! HTTP downloader and worker pool tests against a mock file server

use httpmock::prelude::*;
use hvpull::downloader::{
    DownloadError, DownloadOutcome, Downloader, DownloaderPool, HttpDownloader, PoolSettings,
};
use hvpull::net::{build_http_client, HttpTimeouts};
use hvpull::shutdown::ShutdownCoordinator;
use hvpull::RemoteFileReference;
use std::sync::Arc;
use std::time::Duration;

fn downloader() -> HttpDownloader {
    HttpDownloader::new(build_http_client(HttpTimeouts::default()).unwrap())
}

#[tokio::test]
async fn fetch_writes_final_file_only() {
    let server = MockServer::start_async().await;
    let body = vec![7u8; 64 * 1024];
    let mock = server.mock(|when, then| {
        when.method(GET).path("/jp2/AIA/2011/03/07/171/a.jp2");
        then.status(200).body(body.clone());
    });

    let staging = tempfile::tempdir().unwrap();
    let file = RemoteFileReference::new(server.url("/jp2/AIA/2011/03/07/171/a.jp2"), "LMSAL");
    let staged = downloader().fetch(&file, staging.path()).await.unwrap();

    mock.assert();
    assert_eq!(staged.path, staging.path().join("a.jp2"));
    assert_eq!(staged.bytes, body.len() as u64);
    assert_eq!(std::fs::read(&staged.path).unwrap(), body);
    assert!(!staging.path().join("a.jp2.part").exists());
}

#[tokio::test]
async fn missing_file_is_not_found_and_leaves_nothing() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET);
        then.status(404);
    });

    let staging = tempfile::tempdir().unwrap();
    let file = RemoteFileReference::new(server.url("/jp2/gone.jp2"), "LMSAL");
    let err = downloader().fetch(&file, staging.path()).await.unwrap_err();

    assert!(matches!(err, DownloadError::NotFound(_)));
    assert!(!err.is_retryable());
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn server_error_is_retryable() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET);
        then.status(502);
    });

    let staging = tempfile::tempdir().unwrap();
    let file = RemoteFileReference::new(server.url("/jp2/busy.jp2"), "LMSAL");
    let err = downloader().fetch(&file, staging.path()).await.unwrap_err();

    assert_eq!(
        err,
        DownloadError::Http {
            status: 502,
            message: server.url("/jp2/busy.jp2"),
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn pool_downloads_every_task_once() {
    let server = MockServer::start_async().await;
    let files: Vec<RemoteFileReference> = (0..6)
        .map(|i| RemoteFileReference::new(server.url(format!("/jp2/f{i}.jp2")), "LMSAL"))
        .collect();
    let mocks: Vec<_> = (0..6)
        .map(|i| {
            server.mock(|when, then| {
                when.method(GET).path(format!("/jp2/f{i}.jp2"));
                then.status(200).body(format!("file {i}"));
            })
        })
        .collect();
    let missing = server.mock(|when, then| {
        when.method(GET).path("/jp2/missing.jp2");
        then.status(404);
    });

    let staging = tempfile::tempdir().unwrap();
    let mut pool = DownloaderPool::spawn(
        "LMSAL",
        Arc::new(downloader()),
        staging.path(),
        PoolSettings {
            workers: 3,
            max_retries: 1,
            retry_backoff: Duration::from_millis(10),
        },
        ShutdownCoordinator::shared(),
    );

    let mut batch = files.clone();
    batch.push(RemoteFileReference::new(server.url("/jp2/missing.jp2"), "LMSAL"));
    assert_eq!(pool.enqueue(batch), 7);
    tokio::time::timeout(Duration::from_secs(10), pool.join())
        .await
        .expect("pool should drain");

    let outcomes = pool.drain_outcomes();
    assert_eq!(outcomes.len(), 7);
    let downloaded = outcomes
        .iter()
        .filter(|o| matches!(o, DownloadOutcome::Downloaded { .. }))
        .count();
    assert_eq!(downloaded, 6);
    assert!(pool.take_fatal_error().is_none());

    for mock in &mocks {
        mock.assert_hits(1);
    }
    // 404 is terminal: no retry.
    missing.assert_hits(1);

    pool.shutdown(Duration::from_secs(1)).await;
}
