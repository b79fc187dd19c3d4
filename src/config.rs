//! Daemon settings file
//!
//! Settings are read from an INI file and overlaid on [`DaemonConfig::default`].
//! A missing file yields the defaults.
//!
//! ```ini
//! [directories]
//! working_dir = ~/hvpull/working
//! image_archive = ~/hvpull/archive
//!
//! [network]
//! max_downloads = 4
//! max_retries = 3
//!
//! [daemon]
//! batch_size = 100
//!
//! [server.soho]
//! uri = /mnt/mirror/soho
//! pause_minutes = 30
//! ```

use crate::browser::http::DEFAULT_LISTING_RETRIES;
use crate::downloader::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_DOWNLOADS, DEFAULT_MAX_RETRIES, INITIAL_BACKOFF_MS,
};
use crate::downloader::PoolSettings;
use crate::net::{HttpTimeouts, HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS};
use crate::pipeline::rules::DEFAULT_MIN_PERCENTD;
use crate::pipeline::transcode::DEFAULT_KDU_TRANSCODE;
use crate::server::{DataServerConfig, ServerKind};
use ini::{Ini, Properties};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on workers per server
pub const MAX_DOWNLOADS_LIMIT: usize = 64;

/// Default time allowed for workers to stop after shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Longest accepted server lookback (ten years)
pub const MAX_LOOKBACK_HOURS: i64 = 24 * 365 * 10;

/// Settings file errors
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// File exists but could not be read or parsed
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// A value failed to parse or is out of range
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        /// Section name
        section: String,
        /// Key name
        key: String,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// `[server.<key>]` names a server that does not exist
    #[error("Unknown server section [server.{0}]")]
    UnknownServerSection(String),
}

/// Per-server overrides from `[server.<key>]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerOverride {
    /// Replacement root location
    pub uri: Option<String>,
    /// Replacement poll interval
    pub pause: Option<Duration>,
    /// Replacement lookback window
    pub lookback: Option<chrono::Duration>,
}

impl ServerOverride {
    /// Apply the overrides to a server description
    pub fn apply(&self, mut server: DataServerConfig) -> DataServerConfig {
        if let Some(uri) = &self.uri {
            server = server.with_uri(uri.clone());
        }
        if let Some(pause) = self.pause {
            server = server.with_pause(pause);
        }
        if let Some(lookback) = self.lookback {
            server = server.with_lookback(lookback);
        }
        server
    }
}

/// All daemon settings
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// Parent of `incoming/` and `quarantine/`
    pub working_dir: PathBuf,
    /// Root of the permanent image archive
    pub image_archive: PathBuf,
    /// Catalog file; defaults to `{working_dir}/catalog.json`
    pub catalog_path: Option<PathBuf>,
    /// Concurrent downloads per server
    pub max_downloads: usize,
    /// Re-enqueues allowed for a retryable download failure
    pub max_retries: u32,
    /// Base delay before a failed download is retried
    pub retry_backoff: Duration,
    /// Whole-request HTTP timeout
    pub request_timeout: Duration,
    /// HTTP connect timeout
    pub connect_timeout: Duration,
    /// Attempts for a directory listing that times out
    pub listing_retries: u32,
    /// Files per acquisition batch
    pub batch_size: usize,
    /// Fixed sleep between cycles; `None` means the shortest server pause
    pub poll_interval: Option<Duration>,
    /// Time allowed for workers to stop after shutdown
    pub shutdown_grace: Duration,
    /// AIA completeness threshold
    pub min_percentd: f64,
    /// Whether validated files are re-encoded
    pub transcode_enabled: bool,
    /// Transcoder executable
    pub transcode_command: PathBuf,
    /// `[server.<key>]` sections
    pub servers: BTreeMap<ServerKind, ServerOverride>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("hvpull/working"),
            image_archive: PathBuf::from("hvpull/archive"),
            catalog_path: None,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            listing_retries: DEFAULT_LISTING_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: None,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            min_percentd: DEFAULT_MIN_PERCENTD,
            transcode_enabled: true,
            transcode_command: PathBuf::from(DEFAULT_KDU_TRANSCODE),
            servers: BTreeMap::new(),
        }
    }
}

impl DaemonConfig {
    /// Load settings from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Parse settings from INI text
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text)
            .map_err(|e| ConfigFileError::ReadError(ini::Error::Parse(e)))?;
        Self::from_ini(&ini)
    }

    /// Overlay the values found in `ini` on the defaults
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigFileError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("directories")) {
            if let Some(v) = non_empty(section, "working_dir") {
                config.working_dir = expand_tilde(v);
            }
            if let Some(v) = non_empty(section, "image_archive") {
                config.image_archive = expand_tilde(v);
            }
        }

        if let Some(section) = ini.section(Some("network")) {
            if let Some(v) = section.get("max_downloads") {
                let parsed: usize = parse_value("network", "max_downloads", v)?;
                if parsed == 0 || parsed > MAX_DOWNLOADS_LIMIT {
                    return Err(invalid(
                        "network",
                        "max_downloads",
                        v,
                        format!("must be between 1 and {MAX_DOWNLOADS_LIMIT}"),
                    ));
                }
                config.max_downloads = parsed;
            }
            if let Some(v) = section.get("max_retries") {
                config.max_retries = parse_value("network", "max_retries", v)?;
            }
            if let Some(v) = section.get("retry_backoff_ms") {
                config.retry_backoff =
                    Duration::from_millis(parse_value("network", "retry_backoff_ms", v)?);
            }
            if let Some(v) = section.get("request_timeout_secs") {
                config.request_timeout =
                    Duration::from_secs(parse_positive("network", "request_timeout_secs", v)?);
            }
            if let Some(v) = section.get("connect_timeout_secs") {
                config.connect_timeout =
                    Duration::from_secs(parse_positive("network", "connect_timeout_secs", v)?);
            }
            if let Some(v) = section.get("listing_retries") {
                config.listing_retries = parse_positive("network", "listing_retries", v)?;
            }
        }

        if let Some(section) = ini.section(Some("daemon")) {
            if let Some(v) = section.get("batch_size") {
                config.batch_size = parse_positive("daemon", "batch_size", v)?;
            }
            if let Some(v) = non_empty(section, "poll_interval_minutes") {
                config.poll_interval = Some(parse_minutes("daemon", "poll_interval_minutes", v)?);
            }
            if let Some(v) = section.get("shutdown_grace_secs") {
                config.shutdown_grace =
                    Duration::from_secs(parse_value("daemon", "shutdown_grace_secs", v)?);
            }
        }

        if let Some(section) = ini.section(Some("catalog")) {
            if let Some(v) = non_empty(section, "path") {
                config.catalog_path = Some(expand_tilde(v));
            }
        }

        if let Some(section) = ini.section(Some("validation")) {
            if let Some(v) = section.get("min_percentd") {
                let parsed: f64 = parse_value("validation", "min_percentd", v)?;
                if !(0.0..=100.0).contains(&parsed) {
                    return Err(invalid(
                        "validation",
                        "min_percentd",
                        v,
                        "must be between 0 and 100".to_string(),
                    ));
                }
                config.min_percentd = parsed;
            }
        }

        if let Some(section) = ini.section(Some("transcode")) {
            if let Some(v) = section.get("enabled") {
                config.transcode_enabled = parse_bool("transcode", "enabled", v)?;
            }
            if let Some(v) = non_empty(section, "command") {
                config.transcode_command = expand_tilde(v);
            }
        }

        for (name, section) in ini.iter() {
            let Some(key) = name.and_then(|n| n.strip_prefix("server.")) else {
                continue;
            };
            let kind = ServerKind::from_str(key)
                .map_err(|_| ConfigFileError::UnknownServerSection(key.to_string()))?;
            config
                .servers
                .insert(kind, parse_server_override(&format!("server.{key}"), section)?);
        }

        Ok(config)
    }

    /// Catalog file location
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.working_dir.join("catalog.json"))
    }

    /// Staging directory for downloads
    pub fn incoming_dir(&self) -> PathBuf {
        self.working_dir.join("incoming")
    }

    /// Directory receiving rejected files
    pub fn quarantine_dir(&self) -> PathBuf {
        self.working_dir.join("quarantine")
    }

    /// Worker pool settings
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            workers: self.max_downloads,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
        }
    }

    /// HTTP client timeouts
    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: self.connect_timeout,
            request: self.request_timeout,
        }
    }

    /// Apply `[server.<key>]` overrides to the selected servers
    pub fn apply_server_overrides(&self, servers: Vec<DataServerConfig>) -> Vec<DataServerConfig> {
        servers
            .into_iter()
            .map(|server| match self.servers.get(&server.kind) {
                Some(overrides) => overrides.apply(server),
                None => server,
            })
            .collect()
    }
}

fn parse_server_override(
    section_name: &str,
    section: &Properties,
) -> Result<ServerOverride, ConfigFileError> {
    let mut overrides = ServerOverride::default();
    if let Some(v) = non_empty(section, "uri") {
        overrides.uri = Some(v.to_string());
    }
    if let Some(v) = section.get("pause_minutes") {
        overrides.pause = Some(parse_minutes(section_name, "pause_minutes", v)?);
    }
    if let Some(v) = section.get("lookback_hours") {
        let hours: i64 = parse_positive(section_name, "lookback_hours", v)?;
        let lookback = chrono::TimeDelta::try_hours(hours)
            .filter(|_| hours <= MAX_LOOKBACK_HOURS)
            .ok_or_else(|| {
                invalid(
                    section_name,
                    "lookback_hours",
                    v,
                    format!("must be at most {MAX_LOOKBACK_HOURS}"),
                )
            })?;
        overrides.lookback = Some(lookback);
    }
    Ok(overrides)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: String) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "not a valid number".to_string()))
}

fn parse_positive<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = parse_value(section, key, value)?;
    if parsed <= T::default() {
        return Err(invalid(section, key, value, "must be greater than zero".to_string()));
    }
    Ok(parsed)
}

fn parse_minutes(section: &str, key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    let minutes: u64 = parse_positive(section, key, value)?;
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid(section, key, value, "too large".to_string()))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false".to_string())),
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
