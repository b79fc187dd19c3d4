//! CLI command implementations

pub mod error;
pub mod inspect;
pub mod run;
pub mod servers;
pub mod validate;

use clap::{Parser, Subcommand};

pub use error::CliError;
pub use inspect::InspectCommand;
pub use run::RunArgs;
pub use servers::ServersCommand;
pub use validate::ValidateConfigCommand;

/// Settings file read when `-c` is not given
pub const DEFAULT_CONFIG_FILE: &str = "settings/settings.cfg";

/// Output format for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Image retrieval daemon
#[derive(Parser, Debug)]
#[command(name = "hvpull")]
#[command(about = "Retrieves JPEG 2000 images from solar data servers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll servers and ingest new images
    Run(RunArgs),

    /// Show the supported data servers
    Servers(ServersCommand),

    /// Parse and validate a single JPEG 2000 file
    Inspect(InspectCommand),

    /// Check a settings file
    ValidateConfig(ValidateConfigCommand),
}
