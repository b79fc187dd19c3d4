//! Kakadu transcoder driven through stand-in executables

#![cfg(unix)]

use chrono::{TimeZone, Utc};
use hvpull::catalog::{Catalog, MemoryCatalog};
use hvpull::pipeline::{
    BatchReport, ImagePipeline, Jp2HeaderParser, KakaduTranscoder, Transcoder, ValidationRules,
};
use hvpull::ImageMetadata;
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::support::{eit_xml, jp2_with_xml, write_file};

/// Write an executable shell script
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Copies `-i` to `-o`, appending a marker so the replacement is visible
const COPYING_TRANSCODER: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat "$in" > "$out"
printf 'transcoded' >> "$out"
"#;

fn eit_image(path: PathBuf) -> ImageMetadata {
    ImageMetadata {
        observatory: "SOHO".to_string(),
        instrument: "EIT".to_string(),
        detector: "EIT".to_string(),
        measurement: "195".to_string(),
        date: Utc.with_ymd_and_hms(2011, 3, 7, 1, 0, 0).unwrap(),
        path,
        header: BTreeMap::new(),
    }
}

#[tokio::test]
async fn transcoder_replaces_file_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let kdu = script(dir.path(), "kdu_transcode", COPYING_TRANSCODER);
    let image_path = write_file(dir.path(), "a.jp2", b"raw");

    KakaduTranscoder::new(kdu)
        .transcode(&eit_image(image_path.clone()))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&image_path).unwrap(), b"rawtranscoded");
    assert!(!dir.path().join("a.jp2.tmp.jp2").exists());
}

#[tokio::test]
async fn failing_transcoder_leaves_original() {
    let dir = tempfile::tempdir().unwrap();
    let kdu = script(dir.path(), "kdu_transcode", "echo 'bad codestream' >&2\nexit 3");
    let image_path = write_file(dir.path(), "a.jp2", b"raw");

    let err = KakaduTranscoder::new(kdu)
        .transcode(&eit_image(image_path.clone()))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("bad codestream"));
    assert_eq!(std::fs::read(&image_path).unwrap(), b"raw");
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = write_file(dir.path(), "a.jp2", b"raw");

    let err = KakaduTranscoder::new(dir.path().join("no-such-kdu"))
        .transcode(&eit_image(image_path))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to run"));
}

/// A transcode failure keeps the file out of both the archive and quarantine.
#[tokio::test]
async fn pipeline_reports_transcode_failures() {
    let dir = tempfile::tempdir().unwrap();
    let incoming = dir.path().join("incoming");
    let quarantine = dir.path().join("quarantine");
    std::fs::create_dir_all(&quarantine).unwrap();
    let kdu = script(dir.path(), "kdu_transcode", "exit 1");

    let staged = write_file(
        &incoming,
        "2011_03_07__01_00_10__SOHO_EIT_EIT_195.jp2",
        &jp2_with_xml(&eit_xml(195, "01:00:10")),
    );

    let pipeline = ImagePipeline::new(
        Arc::new(Jp2HeaderParser),
        ValidationRules::default(),
        Arc::new(KakaduTranscoder::new(kdu)),
        quarantine.clone(),
    );
    let mut catalog = MemoryCatalog::new();
    let mut report = BatchReport::default();
    let ready = pipeline
        .process(vec![staged.clone()], &mut catalog, &mut report)
        .await
        .unwrap();

    assert!(ready.is_empty());
    assert_eq!(report.transcode_failures, vec![staged.clone()]);
    assert!(report.quarantined.is_empty());
    assert!(staged.exists());
    assert!(!catalog
        .is_quarantined("2011_03_07__01_00_10__SOHO_EIT_EIT_195.jp2")
        .unwrap());
}
