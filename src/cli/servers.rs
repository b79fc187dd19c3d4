//! CLI command for listing supported data servers

use super::OutputFormat;
use crate::config::DaemonConfig;
use crate::server::{create_server, server_keys, DataServerConfig};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Servers subcommand
#[derive(Debug, Args)]
pub struct ServersCommand {
    #[command(subcommand)]
    action: ServersAction,
}

/// Servers actions
#[derive(Debug, clap::Subcommand)]
enum ServersAction {
    /// List every registered server
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Apply `[server.<key>]` overrides from this settings file
        #[arg(short = 'c', long, value_name = "FILE")]
        config_file: Option<PathBuf>,
    },
}

fn describe(server: &DataServerConfig) -> Value {
    json!({
        "key": server.key(),
        "name": server.name,
        "uri": server.uri,
        "pause_minutes": server.pause.as_secs() / 60,
        "lookback_hours": server.lookback.num_hours(),
        "measurements": server.kind.measurement_count(),
        "instruments": server
            .kind
            .taxonomy()
            .iter()
            .map(|(nickname, _)| *nickname)
            .collect::<Vec<_>>(),
    })
}

/// Registered servers with any configured overrides applied
pub fn configured_servers(config: &DaemonConfig) -> Result<Vec<DataServerConfig>> {
    let servers = server_keys()
        .into_iter()
        .map(create_server)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to build server registry")?;
    Ok(config.apply_server_overrides(servers))
}

impl ServersCommand {
    /// Execute the servers command
    pub async fn execute(&self) -> Result<()> {
        match &self.action {
            ServersAction::List {
                format,
                config_file,
            } => self.execute_list(*format, config_file.as_ref()),
        }
    }

    fn execute_list(&self, format: OutputFormat, config_file: Option<&PathBuf>) -> Result<()> {
        let config = match config_file {
            Some(path) => DaemonConfig::load_from(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => DaemonConfig::default(),
        };
        let servers = configured_servers(&config)?;

        match format {
            OutputFormat::Json => {
                let listing: Vec<Value> = servers.iter().map(describe).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&listing)
                        .context("Failed to serialize servers to JSON")?
                );
            }
            OutputFormat::Human => {
                println!("Found {} servers:\n", servers.len());
                for server in &servers {
                    println!(
                        "{:<7} | {:<7} | every {:>4} min | lookback {:>3} h | {}",
                        server.key(),
                        server.name,
                        server.pause.as_secs() / 60,
                        server.lookback.num_hours(),
                        server.uri
                    );
                }
            }
        }

        Ok(())
    }
}
