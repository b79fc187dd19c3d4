//! `validate-config` command

use super::CliError;
use crate::config::DaemonConfig;
use clap::Parser;
use std::path::PathBuf;

/// Check a settings file and print the effective values
#[derive(Parser, Debug)]
pub struct ValidateConfigCommand {
    /// Settings file to check
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config_file: PathBuf,
}

impl ValidateConfigCommand {
    /// Load the file, returning the effective settings
    pub fn validate(&self) -> Result<DaemonConfig, CliError> {
        if !self.config_file.is_file() {
            return Err(CliError::InvalidArgument(format!(
                "{} is not a file",
                self.config_file.display()
            )));
        }
        Ok(DaemonConfig::load_from(&self.config_file)?)
    }

    /// Execute the validation command
    pub async fn execute(&self) -> Result<(), CliError> {
        let config = match self.validate() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Invalid settings file: {e}");
                return Err(e);
            }
        };

        println!("Valid settings file: {}", self.config_file.display());
        println!("  Working directory: {}", config.working_dir.display());
        println!("  Image archive:     {}", config.image_archive.display());
        println!("  Catalog:           {}", config.catalog_path().display());
        println!("  Max downloads:     {}", config.max_downloads);
        println!("  Max retries:       {}", config.max_retries);
        println!("  Batch size:        {}", config.batch_size);
        match config.poll_interval {
            Some(interval) => println!("  Poll interval:     {} min", interval.as_secs() / 60),
            None => println!("  Poll interval:     shortest server pause"),
        }
        println!("  Transcoding:       {}", if config.transcode_enabled { "on" } else { "off" });
        for (kind, overrides) in &config.servers {
            println!("  [server.{kind}] {overrides:?}");
        }
        Ok(())
    }
}
