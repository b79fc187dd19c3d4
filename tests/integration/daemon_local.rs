//! End-to-end runs of the daemon against a locally mounted server tree

use crate::support::{eit_xml, jp2_with_xml, lasco_c2_xml, write_file};
use hvpull::catalog::{Catalog, JsonCatalog};
use hvpull::config::DaemonConfig;
use hvpull::daemon::{DaemonState, ImageRetrievalDaemon, ServerSelection, TimeRange};
use hvpull::shutdown::ShutdownCoordinator;
use hvpull::BadImageReason;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

struct Site {
    _root: TempDir,
    server_root: PathBuf,
    working: PathBuf,
    archive: PathBuf,
}

impl Site {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let server_root = root.path().join("server/jp2");
        let working = root.path().join("working");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&server_root).unwrap();
        Self {
            _root: root,
            server_root,
            working,
            archive,
        }
    }

    fn config(&self) -> DaemonConfig {
        let text = format!(
            "[directories]\n\
             working_dir = {}\n\
             image_archive = {}\n\
             [network]\n\
             max_downloads = 3\n\
             retry_backoff_ms = 10\n\
             [daemon]\n\
             batch_size = 4\n\
             shutdown_grace_secs = 5\n\
             [transcode]\n\
             enabled = no\n\
             [server.soho]\n\
             uri = {}\n",
            self.working.display(),
            self.archive.display(),
            self.server_root.display()
        );
        DaemonConfig::from_ini_str(&text).unwrap()
    }

    fn day_dir(&self, nickname: &str, measurement: &str) -> PathBuf {
        self.server_root
            .join(nickname)
            .join("2011/03/07")
            .join(measurement)
    }

    /// Eight valid EIT frames plus one unparseable file and one masked C2 frame
    fn populate(&self) {
        for i in 0..8 {
            let time = format!("{:02}:{:02}:10", 1 + i / 4, (i % 4) * 12);
            let name = format!(
                "2011_03_07__{}__SOHO_EIT_EIT_195.jp2",
                time.replace(':', "_")
            );
            write_file(
                &self.day_dir("EIT", "195"),
                &name,
                &jp2_with_xml(&eit_xml(195, &time)),
            );
        }
        write_file(
            &self.day_dir("EIT", "304"),
            "2011_03_07__05_00_00__SOHO_EIT_EIT_304.jp2",
            b"not a jpeg 2000 file",
        );
        write_file(
            &self.day_dir("LASCO-C2", "white-light"),
            "2011_03_07__06_00_00__SOHO_LASCO_C2_white-light.jp2",
            &jp2_with_xml(&lasco_c2_xml("06:00:00", 32)),
        );
    }
}

fn selection() -> ServerSelection {
    ServerSelection::parse("soho", "local", "local").unwrap()
}

fn one_day() -> TimeRange {
    TimeRange::parse(Some("2011-03-07 00:00:00"), Some("2011-03-07 23:59:59")).unwrap()
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

#[tokio::test]
async fn bad_files_are_quarantined_and_good_files_ingested() {
    let site = Site::new();
    site.populate();
    let config = site.config();

    let mut daemon =
        ImageRetrievalDaemon::new(&config, &selection(), ShutdownCoordinator::shared()).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(30), daemon.run(one_day()))
        .await
        .expect("one-shot run should finish")
        .unwrap();

    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.files_discovered, 10);
    assert_eq!(stats.downloads_completed, 10);
    assert_eq!(stats.images_ingested, 8);
    assert_eq!(stats.images_quarantined, 2);

    let mut records = daemon.catalog().quarantine_records().unwrap();
    records.sort_by(|a, b| a.filename.cmp(&b.filename));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].filename, "2011_03_07__05_00_00__SOHO_EIT_EIT_304.jp2");
    assert_eq!(records[0].reason, BadImageReason::Header);
    assert_eq!(
        records[1].filename,
        "2011_03_07__06_00_00__SOHO_LASCO_C2_white-light.jp2"
    );
    assert_eq!(records[1].reason, BadImageReason::WrongMask);

    assert_eq!(count_files(&site.archive.join("EIT/2011/03/07/195")), 8);
    assert_eq!(count_files(&config.quarantine_dir()), 2);
    assert_eq!(count_files(&config.incoming_dir()), 0);
    assert_eq!(daemon.catalog().image_count().unwrap(), 8);
}

#[tokio::test]
async fn second_run_downloads_nothing() {
    let site = Site::new();
    site.populate();
    let config = site.config();

    {
        let mut daemon =
            ImageRetrievalDaemon::new(&config, &selection(), ShutdownCoordinator::shared())
                .unwrap();
        daemon.run(one_day()).await.unwrap();
    }

    let mut daemon =
        ImageRetrievalDaemon::new(&config, &selection(), ShutdownCoordinator::shared()).unwrap();
    let stats = daemon.run(one_day()).await.unwrap();

    assert_eq!(stats.files_discovered, 10);
    assert_eq!(stats.files_skipped_known, 10);
    assert_eq!(stats.downloads_completed, 0);
    assert_eq!(stats.images_ingested, 0);
    assert_eq!(stats.images_quarantined, 0);
    drop(daemon);

    // The catalog persisted across both runs.
    let catalog = JsonCatalog::open(config.catalog_path()).unwrap();
    assert_eq!(catalog.image_count().unwrap(), 8);
    assert!(catalog
        .is_quarantined("2011_03_07__05_00_00__SOHO_EIT_EIT_304.jp2")
        .unwrap());
}

#[tokio::test]
async fn shutdown_before_run_stops_without_downloading() {
    let site = Site::new();
    site.populate();
    let config = site.config();

    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let mut daemon = ImageRetrievalDaemon::new(&config, &selection(), shutdown).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(10), daemon.run(TimeRange::default()))
        .await
        .expect("shutdown should stop the daemon")
        .unwrap();

    assert_eq!(daemon.state(), DaemonState::Stopped);
    assert_eq!(stats.downloads_completed, 0);
    assert_eq!(count_files(&site.archive), 0);
}
