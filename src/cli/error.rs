//! CLI error types and conversions

use crate::config::ConfigFileError;
use crate::daemon::DaemonError;
use crate::pipeline::HeaderError;
use crate::server::RegistryError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Server, browser or downloader key rejected
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Settings file rejected
    #[error("configuration error: {0}")]
    ConfigurationError(#[from] ConfigFileError),

    /// Daemon failed
    #[error("daemon error: {0}")]
    DaemonError(#[from] DaemonError),

    /// Header could not be read
    #[error("header error: {0}")]
    HeaderError(#[from] HeaderError),

    /// Metrics exporter failed to start
    #[error("metrics error: {0}")]
    MetricsError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
