//! `run` command: start the daemon

use super::{CliError, DEFAULT_CONFIG_FILE};
use crate::config::{DaemonConfig, MAX_DOWNLOADS_LIMIT};
use crate::daemon::{DaemonStats, ImageRetrievalDaemon, ServerSelection, TimeRange};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Parse and bound `--max-downloads`
fn parse_max_downloads(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("max downloads must be at least 1".to_string());
    }
    if value > MAX_DOWNLOADS_LIMIT {
        return Err(format!(
            "max downloads {value} exceeds maximum of {MAX_DOWNLOADS_LIMIT}"
        ));
    }
    Ok(value)
}

/// Arguments for `run`
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data servers to retrieve from (comma-separated)
    #[arg(short = 'd', long, default_value = "lmsal")]
    pub data_servers: String,

    /// Method for locating files on servers (http, local)
    #[arg(short = 'b', long, default_value = "http")]
    pub browse_method: String,

    /// Method for retrieving files (http/urllib, local)
    #[arg(short = 'm', long, default_value = "urllib")]
    pub download_method: String,

    /// Retrieve data observed after this time (YYYY-MM-DD HH:MM:SS, default: server lookback)
    #[arg(short = 's', long, value_name = "DATE")]
    pub start: Option<String>,

    /// Retrieve data observed before this time, then exit (default: run indefinitely)
    #[arg(short = 'e', long, value_name = "DATE")]
    pub end: Option<String>,

    /// Settings file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Concurrent downloads per server (overrides the settings file)
    #[arg(long, value_parser = parse_max_downloads)]
    pub max_downloads: Option<usize>,

    /// Serve Prometheus metrics on this address
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl RunArgs {
    /// Effective settings: file (or defaults) plus command-line overrides
    pub fn load_config(&self) -> Result<DaemonConfig, CliError> {
        let path = self
            .config_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if self.config_file.is_some() && !path.exists() {
            return Err(CliError::InvalidArgument(format!(
                "settings file {} does not exist",
                path.display()
            )));
        }

        let mut config = DaemonConfig::load_from(&path)?;
        if let Some(max) = self.max_downloads {
            config.max_downloads = max;
        }
        Ok(config)
    }

    /// Run the daemon until it stops
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<DaemonStats, CliError> {
        let selection = ServerSelection::parse(
            &self.data_servers,
            &self.browse_method,
            &self.download_method,
        )?;
        let range = TimeRange::parse(self.start.as_deref(), self.end.as_deref())?;
        let config = self.load_config()?;

        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::MetricsError(e.to_string()))?;
        }

        let mut daemon = ImageRetrievalDaemon::new(&config, &selection, shutdown)?;
        let stats = daemon.run(range).await?;

        info!(
            cycles = stats.cycles,
            downloaded = stats.downloads_completed,
            ingested = stats.images_ingested,
            quarantined = stats.images_quarantined,
            "Daemon stopped"
        );
        Ok(stats)
    }
}
