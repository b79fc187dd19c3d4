//! Main entry point for the hvpull CLI

use clap::Parser;
use hvpull::cli::{Cli, Commands};
use hvpull::shutdown::{ShutdownCoordinator, SharedShutdown};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hvpull=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// SIGINT and SIGQUIT request a graceful shutdown
fn install_signal_handlers(shutdown: SharedShutdown) {
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing current batch...");
                shutdown.request_shutdown();
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::quit()) {
            Ok(mut quit) => {
                tokio::spawn(async move {
                    if quit.recv().await.is_some() {
                        tracing::warn!("SIGQUIT received, finishing current batch...");
                        shutdown.request_shutdown();
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "Could not install SIGQUIT handler"),
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownCoordinator::shared();
    install_signal_handlers(shutdown.clone());

    let result = match cli.command {
        Commands::Run(ref args) => args
            .execute(shutdown.clone())
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Servers(ref cmd) => cmd.execute().await,
        Commands::Inspect(ref cmd) => cmd.execute().await.map_err(|e| anyhow::anyhow!(e)),
        Commands::ValidateConfig(ref cmd) => cmd.execute().await.map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
