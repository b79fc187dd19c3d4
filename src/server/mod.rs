//! Data server definitions
//!
//! A data server is a remote (HTTP) or local (filesystem) root under which
//! images are laid out as `{nickname}/{YYYY}/{MM}/{DD}/{measurement}/`. The
//! set of nicknames and measurements a server carries is fixed per
//! [`ServerKind`], so candidate directories for a time range can be computed
//! without touching the network.

pub mod registry;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use registry::{create_server, resolve_servers, server_keys, RegistryError};

const AIA_WAVELENGTHS: &[&str] = &[
    "94", "131", "171", "193", "211", "304", "335", "1600", "1700", "4500",
];
const HMI_MEASUREMENTS: &[&str] = &["continuum", "magnetogram"];
const EIT_WAVELENGTHS: &[&str] = &["171", "195", "284", "304"];
const EUVI_WAVELENGTHS: &[&str] = &["171", "195", "284", "304"];
const WHITE_LIGHT: &[&str] = &["white-light"];
const SWAP_WAVELENGTHS: &[&str] = &["174"];

/// Closed set of supported data servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// Lockheed Martin Solar and Astrophysics Lab (SDO/AIA)
    Lmsal,
    /// Joint Science Operations Center (SDO/AIA and SDO/HMI)
    Jsoc,
    /// SOHO mission archive (EIT, LASCO, MDI)
    Soho,
    /// STEREO Science Center (SECCHI on both spacecraft)
    Stereo,
    /// Royal Observatory of Belgium (PROBA2/SWAP)
    Rob,
}

impl ServerKind {
    /// Configuration key for this server
    pub fn key(&self) -> &'static str {
        match self {
            ServerKind::Lmsal => "lmsal",
            ServerKind::Jsoc => "jsoc",
            ServerKind::Soho => "soho",
            ServerKind::Stereo => "stereo",
            ServerKind::Rob => "rob",
        }
    }

    /// All server kinds in registry order
    pub fn all() -> [ServerKind; 5] {
        [
            ServerKind::Lmsal,
            ServerKind::Jsoc,
            ServerKind::Soho,
            ServerKind::Stereo,
            ServerKind::Rob,
        ]
    }

    /// Nicknames and the measurements published under each
    pub fn taxonomy(&self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            ServerKind::Lmsal => &[("AIA", AIA_WAVELENGTHS)],
            ServerKind::Jsoc => &[("AIA", AIA_WAVELENGTHS), ("HMI", HMI_MEASUREMENTS)],
            ServerKind::Soho => &[
                ("EIT", EIT_WAVELENGTHS),
                ("LASCO-C2", WHITE_LIGHT),
                ("LASCO-C3", WHITE_LIGHT),
                ("MDI", HMI_MEASUREMENTS),
            ],
            ServerKind::Stereo => &[
                ("EUVI-A", EUVI_WAVELENGTHS),
                ("EUVI-B", EUVI_WAVELENGTHS),
                ("COR1-A", WHITE_LIGHT),
                ("COR1-B", WHITE_LIGHT),
                ("COR2-A", WHITE_LIGHT),
                ("COR2-B", WHITE_LIGHT),
            ],
            ServerKind::Rob => &[("SWAP", SWAP_WAVELENGTHS)],
        }
    }

    /// Number of (nickname, measurement) pairs per day
    pub fn measurement_count(&self) -> usize {
        self.taxonomy().iter().map(|(_, m)| m.len()).sum()
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ServerKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        ServerKind::all()
            .into_iter()
            .find(|kind| kind.key() == key)
            .ok_or_else(|| RegistryError::UnknownServer {
                key: s.to_string(),
                valid: server_keys().join(", "),
            })
    }
}

/// A directory that may contain images for one day and measurement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateDirectory {
    /// Full location (URL or path)
    pub location: String,
    /// Day the directory covers
    pub date: NaiveDate,
    /// Instrument nickname
    pub nickname: &'static str,
    /// Measurement subdirectory
    pub measurement: &'static str,
}

/// Static description of one data server
#[derive(Debug, Clone, PartialEq)]
pub struct DataServerConfig {
    /// Server kind (selects the taxonomy)
    pub kind: ServerKind,
    /// Human-readable name used in logs
    pub name: String,
    /// Root location (URL or filesystem path)
    pub uri: String,
    /// Poll interval
    pub pause: Duration,
    /// Default lookback window for computing the start time
    pub lookback: chrono::Duration,
}

impl DataServerConfig {
    /// Create a server description
    pub fn new(
        kind: ServerKind,
        name: impl Into<String>,
        uri: impl Into<String>,
        pause: Duration,
        lookback: chrono::Duration,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            uri: uri.into(),
            pause,
            lookback,
        }
    }

    /// Point the server at a different root
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    /// Override the poll interval
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Override the lookback window
    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Configuration key of the underlying kind
    pub fn key(&self) -> &'static str {
        self.kind.key()
    }

    /// Default start time: now minus the lookback window
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time_at(Utc::now())
    }

    /// Start time relative to a fixed `now`
    pub fn start_time_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.lookback
    }

    /// Compute the directories that may hold files between `start` and `end`.
    ///
    /// Every calendar day touched by the range is included, both endpoints
    /// inclusive. Pure: no I/O is performed. An inverted range yields nothing.
    pub fn get_candidate_directories(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<CandidateDirectory> {
        if start > end {
            return Vec::new();
        }

        let root = self.uri.trim_end_matches('/');
        let last_day = end.date_naive();
        let mut directories = Vec::new();

        for day in start.date_naive().iter_days().take_while(|d| *d <= last_day) {
            for (nickname, measurements) in self.kind.taxonomy() {
                for measurement in measurements.iter() {
                    directories.push(CandidateDirectory {
                        location: format!(
                            "{root}/{nickname}/{:04}/{:02}/{:02}/{measurement}",
                            day.year(),
                            day.month(),
                            day.day()
                        ),
                        date: day,
                        nickname,
                        measurement,
                    });
                }
            }
        }

        directories
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.uri.trim().is_empty() {
            return Err(format!("Server {} has an empty uri", self.name));
        }
        if self.pause.is_zero() {
            return Err(format!("Server {} pause must be greater than zero", self.name));
        }
        if self.lookback <= chrono::Duration::zero() {
            return Err(format!(
                "Server {} lookback must be greater than zero",
                self.name
            ));
        }
        Ok(())
    }
}
