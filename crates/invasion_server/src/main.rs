//! Space Invasion - Dedicated Server

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invasion_server::ServerConfig;

#[derive(Parser)]
#[command(name = "invasion_server")]
#[command(about = "Headless authoritative server for the invasion arena")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Server configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of enemies to spawn
    #[arg(short, long, default_value = "4")]
    agents: u32,

    /// Ticks to simulate before shutting down
    #[arg(short, long, default_value = "600")]
    ticks: u64,
}

/// Filter directive used when `RUST_LOG` is unset.
fn default_log_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --verbose.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_log_level(cli.verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .init();

    tracing::info!("Starting Space Invasion dedicated server");

    let config = match cli.config.as_deref() {
        Some(path) => match ServerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    match invasion_server::run(config, cli.agents, cli.ticks).await {
        Ok(summary) => {
            tracing::info!(
                frames = summary.frames,
                state_hash = summary.state_hash,
                "Shutdown complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_lowers_default_level() {
        assert_eq!(default_log_level(false), "info");
        assert_eq!(default_log_level(true), "debug");
        assert!(tracing_subscriber::EnvFilter::try_new(default_log_level(true)).is_ok());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["invasion_server"]);
        assert!(!cli.verbose);
        assert_eq!(cli.agents, 4);
        assert_eq!(cli.ticks, 600);
        assert!(cli.config.is_none());
    }
}
