//! linkmgr Daemon - PPPoE link and display management service
//!
//! This binary runs as a system service and handles:
//! - The PPPoE link: boot start, session supervision, idle policy
//! - External display attach/detach and mode negotiation via dispd
//! - State dumps on SIGUSR1
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! Each controller runs as its own task and stops when the shared
//! `CancellationToken` is cancelled by the signal handler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use linkmgr_core::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod adapters;
mod daemon;

use daemon::DaemonService;

#[derive(Debug, Parser)]
#[command(name = "linkmgrd", version, about = "PPPoE link and display manager")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Log level from the config, raised by `-v` flags
fn log_level(configured: &str, verbose: u8) -> &str {
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// Loads the configuration; an explicit path must exist, the default may not
fn load_config(explicit: Option<&PathBuf>) -> Result<(PathBuf, Config)> {
    match explicit {
        Some(path) => {
            let config = Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok((path.clone(), config))
        }
        None => {
            let path = Config::default_path();
            let config = Config::load_or_default(&path);
            Ok((path, config))
        }
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            token.cancel();
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received SIGINT (Ctrl+C)"),
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        },
        _ = terminate.recv() => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config_path, mut config) = load_config(cli.config.as_ref())?;

    let level = log_level(&config.logging.level, cli.verbose).to_string();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(config_path = %config_path.display(), "linkmgr daemon starting (linkmgrd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            warn!(error = %e, "Invalid configuration");
        }
        warn!("Falling back to default configuration");
        config = Config::default();
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let result = DaemonService::new(config, shutdown_token).run().await;

    match &result {
        Ok(()) => info!("linkmgr daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "linkmgr daemon exiting with error"),
    }

    result
}
