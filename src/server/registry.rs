//! Registry of supported servers, browsers and downloaders
//!
//! Configuration keys are resolved once at startup into closed enums. Unknown
//! keys are rejected with the list of valid choices.

use super::{DataServerConfig, ServerKind};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

type ServerConstructor = fn() -> DataServerConfig;

/// Configuration key → constructor (loaded once)
static SERVERS: Lazy<BTreeMap<&'static str, ServerConstructor>> = Lazy::new(|| {
    let mut map: BTreeMap<&'static str, ServerConstructor> = BTreeMap::new();
    map.insert(ServerKind::Lmsal.key(), lmsal);
    map.insert(ServerKind::Jsoc.key(), jsoc);
    map.insert(ServerKind::Soho.key(), soho);
    map.insert(ServerKind::Stereo.key(), stereo);
    map.insert(ServerKind::Rob.key(), rob);
    map
});

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn lmsal() -> DataServerConfig {
    DataServerConfig::new(
        ServerKind::Lmsal,
        "LMSAL",
        "http://sdowww.lmsal.com/sdomedia/hv_jp2kwrite/v0.8/jp2",
        minutes(15),
        chrono::Duration::hours(24),
    )
}

fn jsoc() -> DataServerConfig {
    DataServerConfig::new(
        ServerKind::Jsoc,
        "JSOC",
        "http://jsoc.stanford.edu/data/hv/jp2",
        minutes(60),
        chrono::Duration::hours(48),
    )
}

fn soho() -> DataServerConfig {
    DataServerConfig::new(
        ServerKind::Soho,
        "SOHO",
        "http://sohowww.nascom.nasa.gov/sdb/hv/jp2",
        minutes(60),
        chrono::Duration::days(7),
    )
}

fn stereo() -> DataServerConfig {
    DataServerConfig::new(
        ServerKind::Stereo,
        "STEREO",
        "http://stereo-ssc.nascom.nasa.gov/data/hv/jp2",
        minutes(24 * 60),
        chrono::Duration::days(7),
    )
}

fn rob() -> DataServerConfig {
    DataServerConfig::new(
        ServerKind::Rob,
        "ROB",
        "http://proba2.oma.be/swap/data/hv/jp2",
        minutes(30),
        chrono::Duration::days(2),
    )
}

/// Errors resolving configuration keys
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Server key not in the registry
    #[error("Unknown server '{key}'. Valid servers: {valid}")]
    UnknownServer {
        /// Key as given
        key: String,
        /// Comma-separated valid keys
        valid: String,
    },

    /// Browse method not recognised
    #[error("Unknown browse method '{0}'. Valid methods: http, local")]
    UnknownBrowser(String),

    /// Download method not recognised
    #[error("Unknown download method '{0}'. Valid methods: http, urllib, local")]
    UnknownDownloader(String),

    /// Same server listed twice
    #[error("Server '{0}' selected more than once")]
    DuplicateServer(String),

    /// No servers selected
    #[error("At least one server must be selected")]
    EmptySelection,
}

/// All registered server keys, sorted
pub fn server_keys() -> Vec<&'static str> {
    SERVERS.keys().copied().collect()
}

/// Construct the default configuration for a server key
pub fn create_server(key: &str) -> Result<DataServerConfig, RegistryError> {
    let kind: ServerKind = key.parse()?;
    SERVERS
        .get(kind.key())
        .map(|constructor| constructor())
        .ok_or_else(|| RegistryError::UnknownServer {
            key: key.to_string(),
            valid: server_keys().join(", "),
        })
}

/// Resolve a comma-separated server list (e.g. `"lmsal,soho"`)
pub fn resolve_servers(list: &str) -> Result<Vec<DataServerConfig>, RegistryError> {
    let mut servers: Vec<DataServerConfig> = Vec::new();

    for key in list.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        let server = create_server(key)?;
        if servers.iter().any(|s| s.kind == server.kind) {
            return Err(RegistryError::DuplicateServer(server.key().to_string()));
        }
        servers.push(server);
    }

    if servers.is_empty() {
        return Err(RegistryError::EmptySelection);
    }

    Ok(servers)
}

/// How directories are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseMethod {
    /// HTML index pages over HTTP
    Http,
    /// Local filesystem
    Local,
}

impl FromStr for BrowseMethod {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "httpbrowser" => Ok(BrowseMethod::Http),
            "local" | "localbrowser" => Ok(BrowseMethod::Local),
            _ => Err(RegistryError::UnknownBrowser(s.to_string())),
        }
    }
}

impl fmt::Display for BrowseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowseMethod::Http => write!(f, "http"),
            BrowseMethod::Local => write!(f, "local"),
        }
    }
}

/// How files are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMethod {
    /// Streaming HTTP GET
    Http,
    /// Filesystem copy
    Local,
}

impl FromStr for DownloadMethod {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "urllib" => Ok(DownloadMethod::Http),
            "local" => Ok(DownloadMethod::Local),
            _ => Err(RegistryError::UnknownDownloader(s.to_string())),
        }
    }
}

impl fmt::Display for DownloadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadMethod::Http => write!(f, "http"),
            DownloadMethod::Local => write!(f, "local"),
        }
    }
}
