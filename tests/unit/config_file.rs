use hvpull::config::{ConfigFileError, DaemonConfig};
use hvpull::server::{resolve_servers, ServerKind};
use std::path::PathBuf;
use std::time::Duration;

const FULL_SETTINGS: &str = "\
[directories]
working_dir = /var/hvpull/working
image_archive = /var/hvpull/jp2

[network]
max_downloads = 8
max_retries = 5
retry_backoff_ms = 250
request_timeout_secs = 60
listing_retries = 2

[daemon]
batch_size = 25
poll_interval_minutes = 10
shutdown_grace_secs = 12

[catalog]
path = /var/hvpull/catalog.json

[validation]
min_percentd = 90

[transcode]
enabled = off
command = /opt/kakadu/kdu_transcode

[server.lmsal]
uri = http://mirror.example.org/jp2
pause_minutes = 5
lookback_hours = 6
";

#[test]
fn full_settings_file_round_trips_into_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.cfg");
    std::fs::write(&path, FULL_SETTINGS).unwrap();

    let config = DaemonConfig::load_from(&path).unwrap();
    assert_eq!(config.working_dir, PathBuf::from("/var/hvpull/working"));
    assert_eq!(config.image_archive, PathBuf::from("/var/hvpull/jp2"));
    assert_eq!(config.catalog_path(), PathBuf::from("/var/hvpull/catalog.json"));
    assert_eq!(config.incoming_dir(), PathBuf::from("/var/hvpull/working/incoming"));
    assert_eq!(config.max_downloads, 8);
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_backoff, Duration::from_millis(250));
    assert_eq!(config.request_timeout, Duration::from_secs(60));
    assert_eq!(config.listing_retries, 2);
    assert_eq!(config.batch_size, 25);
    assert_eq!(config.poll_interval, Some(Duration::from_secs(600)));
    assert_eq!(config.shutdown_grace, Duration::from_secs(12));
    assert_eq!(config.min_percentd, 90.0);
    assert!(!config.transcode_enabled);
    assert_eq!(
        config.transcode_command,
        PathBuf::from("/opt/kakadu/kdu_transcode")
    );

    let pool = config.pool_settings();
    assert_eq!(pool.workers, 8);
    assert_eq!(pool.max_retries, 5);

    let servers = config.apply_server_overrides(resolve_servers("lmsal,soho").unwrap());
    assert_eq!(servers[0].kind, ServerKind::Lmsal);
    assert_eq!(servers[0].uri, "http://mirror.example.org/jp2");
    assert_eq!(servers[0].pause, Duration::from_secs(300));
    assert_eq!(servers[0].lookback, chrono::Duration::hours(6));
    assert_eq!(servers[1].uri, "http://sohowww.nascom.nasa.gov/sdb/hv/jp2");
}

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = DaemonConfig::load_from(&dir.path().join("absent.cfg")).unwrap();
    assert_eq!(config, DaemonConfig::default());
}

#[test]
fn out_of_range_values_name_their_key() {
    for (text, key) in [
        ("[network]\nmax_downloads = 65\n", "network.max_downloads"),
        ("[validation]\nmin_percentd = 101\n", "validation.min_percentd"),
        ("[transcode]\nenabled = maybe\n", "transcode.enabled"),
        ("[daemon]\nbatch_size = 0\n", "daemon.batch_size"),
        (
            "[daemon]\npoll_interval_minutes = 18446744073709551615\n",
            "daemon.poll_interval_minutes",
        ),
        (
            "[server.soho]\npause_minutes = 18446744073709551615\n",
            "server.soho.pause_minutes",
        ),
        (
            "[server.soho]\nlookback_hours = 9223372036854775807\n",
            "server.soho.lookback_hours",
        ),
        ("[server.soho]\nlookback_hours = 87601\n", "server.soho.lookback_hours"),
    ] {
        let err = DaemonConfig::from_ini_str(text).unwrap_err();
        assert!(
            matches!(err, ConfigFileError::InvalidValue { .. }),
            "{text}: {err}"
        );
        assert!(err.to_string().contains(key), "{err} should mention {key}");
    }
}

#[test]
fn longest_lookback_is_accepted() {
    let config = DaemonConfig::from_ini_str("[server.soho]\nlookback_hours = 87600\n").unwrap();
    let soho = &config.servers[&ServerKind::Soho];
    assert_eq!(soho.lookback, Some(chrono::Duration::hours(87600)));
}

#[test]
fn unknown_server_section_is_rejected() {
    let err = DaemonConfig::from_ini_str("[server.nasa]\nuri = http://x\n").unwrap_err();
    assert!(matches!(err, ConfigFileError::UnknownServerSection(ref key) if key == "nasa"));
}
