//! Binary-level checks of the read-only subcommands

use assert_cmd::Command;
use serde_json::Value;

use crate::support::{eit_xml, jp2_with_xml, lasco_c2_xml, write_file};

fn hvpull() -> Command {
    Command::cargo_bin("hvpull").unwrap()
}

#[test]
fn servers_list_json_names_every_server() {
    let output = hvpull()
        .args(["servers", "list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let listing: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let keys: Vec<&str> = listing.iter().map(|s| s["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["jsoc", "lmsal", "rob", "soho", "stereo"]);

    let lmsal = &listing[1];
    assert_eq!(lmsal["measurements"], 10);
    assert_eq!(lmsal["instruments"][0], "AIA");
}

#[test]
fn servers_list_applies_settings_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_file(
        dir.path(),
        "settings.cfg",
        b"[server.stereo]\nuri = /mnt/stereo\npause_minutes = 15\n",
    );

    let output = hvpull()
        .args(["servers", "list", "--format", "json", "-c"])
        .arg(&settings)
        .output()
        .unwrap();
    assert!(output.status.success());

    let listing: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let stereo = listing.iter().find(|s| s["key"] == "stereo").unwrap();
    assert_eq!(stereo["uri"], "/mnt/stereo");
    assert_eq!(stereo["pause_minutes"], 15);
}

#[test]
fn run_rejects_unknown_server() {
    hvpull()
        .args(["run", "-d", "nasa", "-s", "2011-03-07 00:00:00", "-e", "2011-03-07 01:00:00"])
        .assert()
        .failure();
}

#[test]
fn validate_config_reports_bad_value() {
    let dir = tempfile::tempdir().unwrap();
    let settings = write_file(dir.path(), "settings.cfg", b"[network]\nmax_downloads = 0\n");

    hvpull()
        .args(["validate-config", "-c"])
        .arg(&settings)
        .assert()
        .failure();
}

#[test]
fn inspect_prints_quarantine_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(
        dir.path(),
        "c2.jp2",
        &jp2_with_xml(&lasco_c2_xml("06:00:00", 32)),
    );

    let output = hvpull()
        .args(["inspect", "--format", "json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let verdict: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["instrument"], "LASCO");
    assert_eq!(verdict["detector"], "C2");
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["reason"], "WrongMask");
}

#[test]
fn inspect_flags_empty_observatory_as_header() {
    let dir = tempfile::tempdir().unwrap();
    let xml = eit_xml(195, "01:00:10").replace("<TELESCOP>SOHO", "<TELESCOP>/SOHO");
    let file = write_file(dir.path(), "eit.jp2", &jp2_with_xml(&xml));

    let output = hvpull()
        .args(["inspect", "--format", "json"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(output.status.success());

    let verdict: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["observatory"], "");
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["reason"], "HEADER");
}
