//! HTTP browser tests against a mock index server

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use hvpull::browser::{BrowserError, DataBrowser, HttpBrowser};
use hvpull::net::{build_http_client, HttpTimeouts};
use hvpull::server::{DataServerConfig, ServerKind};
use hvpull::shutdown::ShutdownCoordinator;
use std::time::Duration;

fn rob_server(uri: String) -> DataServerConfig {
    DataServerConfig::new(
        ServerKind::Rob,
        "ROB",
        uri,
        Duration::from_secs(60),
        chrono::Duration::days(1),
    )
}

fn browser(uri: String) -> HttpBrowser {
    let timeouts = HttpTimeouts {
        connect: Duration::from_secs(2),
        request: Duration::from_secs(5),
    };
    HttpBrowser::new(rob_server(uri), build_http_client(timeouts).unwrap(), 0)
}

const SWAP_INDEX: &str = r#"<html><body>
<a href="?C=N;O=D">Name</a>
<a href="/jp2/SWAP/2011/03/">Parent Directory</a>
<a href="2011_03_07__10_00_00_000__PROBA2_SWAP_SWAP_174.jp2">one</a>
<a href="2011_03_07__10_01_40_000__PROBA2_SWAP_SWAP_174.jp2">two</a>
<a href="README.txt">readme</a>
</body></html>"#;

#[tokio::test]
async fn lists_files_from_index_page() {
    let server = MockServer::start_async().await;
    let index = server.mock(|when, then| {
        when.method(GET).path("/jp2/SWAP/2011/03/07/174");
        then.status(200)
            .header("content-type", "text/html")
            .body(SWAP_INDEX);
    });

    let browser = browser(server.url("/jp2"));
    let files = browser
        .list_files(&server.url("/jp2/SWAP/2011/03/07/174"), "jp2")
        .await
        .unwrap();

    index.assert();
    assert_eq!(
        files,
        vec![
            server.url("/jp2/SWAP/2011/03/07/174/2011_03_07__10_00_00_000__PROBA2_SWAP_SWAP_174.jp2"),
            server.url("/jp2/SWAP/2011/03/07/174/2011_03_07__10_01_40_000__PROBA2_SWAP_SWAP_174.jp2"),
        ]
    );
}

#[tokio::test]
async fn missing_directory_is_empty() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET);
        then.status(404);
    });

    let files = browser(server.url("/jp2"))
        .list_files(&server.url("/jp2/SWAP/2011/03/08/174"), "jp2")
        .await
        .unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn server_error_is_skipped_not_fatal() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET);
        then.status(503);
    });

    let files = browser(server.url("/jp2"))
        .list_files(&server.url("/jp2/SWAP/2011/03/07/174"), "jp2")
        .await
        .unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn query_walks_every_day_of_the_range() {
    let server = MockServer::start_async().await;
    let day_one = server.mock(|when, then| {
        when.method(GET).path("/jp2/SWAP/2011/03/07/174");
        then.status(200)
            .body(r#"<a href="2011_03_07__23_59_00_000__PROBA2_SWAP_SWAP_174.jp2">a</a>"#);
    });
    let day_two = server.mock(|when, then| {
        when.method(GET).path("/jp2/SWAP/2011/03/08/174");
        then.status(200)
            .body(r#"<a href="2011_03_08__00_01_00_000__PROBA2_SWAP_SWAP_174.jp2">b</a>"#);
    });

    let browser = browser(server.url("/jp2"));
    let shutdown = ShutdownCoordinator::new();
    let files = browser
        .query(
            Utc.with_ymd_and_hms(2011, 3, 7, 22, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2011, 3, 8, 1, 0, 0).unwrap(),
            "jp2",
            &shutdown,
        )
        .await
        .unwrap();

    day_one.assert();
    day_two.assert();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.server == "ROB"));
    assert_eq!(
        files[1].basename,
        "2011_03_08__00_01_00_000__PROBA2_SWAP_SWAP_174.jp2"
    );
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // Nothing listens on port 1.
    let browser = browser("http://127.0.0.1:1/jp2".to_string());
    let shutdown = ShutdownCoordinator::new();

    let result = browser
        .query(
            Utc.with_ymd_and_hms(2011, 3, 7, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2011, 3, 7, 1, 0, 0).unwrap(),
            "jp2",
            &shutdown,
        )
        .await;

    match result {
        Err(BrowserError::Network { server, location, .. }) => {
            assert_eq!(server, "ROB");
            assert_eq!(location, "http://127.0.0.1:1/jp2/SWAP/2011/03/07/174");
        }
        other => panic!("expected network error, got {other:?}"),
    }
}
