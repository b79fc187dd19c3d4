//! Shared HTTP client
//!
//! One [`reqwest::Client`] is built at startup and shared by every browser
//! and downloader so connections are pooled across servers. The client is
//! owned by the daemon and passed down explicitly.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for one listing or download
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 120;

const USER_AGENT: &str = concat!("hvpull/", env!("CARGO_PKG_VERSION"));

/// Timeouts applied to the shared client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Time allowed to establish a connection
    pub connect: Duration,
    /// Time allowed for a whole request
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            request: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Build the HTTP client shared by browsers and downloaders
pub fn build_http_client(timeouts: HttpTimeouts) -> Result<Arc<Client>, reqwest::Error> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .build()?;
    Ok(Arc::new(client))
}

/// Classification of a failed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request or read timed out
    Timeout,
    /// Connection refused, DNS failure or host unreachable
    Offline,
    /// HTTP 404
    NotFound,
    /// HTTP 5xx
    ServerError(u16),
    /// Other HTTP 4xx
    ClientError(u16),
    /// Anything else (body decode, protocol errors)
    Generic,
}

impl FailureKind {
    /// Short description used in log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Offline => "server unreachable",
            Self::NotFound => "not found",
            Self::ServerError(code) => match code {
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(_) => "client error",
            Self::Generic => "network error",
        }
    }

    /// Whether repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServerError(_) | Self::Generic)
    }
}

/// Classify a failure from an HTTP status or reqwest error.
pub fn classify_failure(
    status: Option<reqwest::StatusCode>,
    err: Option<&reqwest::Error>,
) -> FailureKind {
    if let Some(status) = status {
        if status == reqwest::StatusCode::NOT_FOUND {
            return FailureKind::NotFound;
        }
        if status.is_server_error() {
            return FailureKind::ServerError(status.as_u16());
        }
        if status.is_client_error() {
            return FailureKind::ClientError(status.as_u16());
        }
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return FailureKind::Timeout;
        }
        if err.is_connect() {
            return FailureKind::Offline;
        }
    }

    FailureKind::Generic
}
