//! Cantor Server - standalone headless server for Cantor.
//!
//! Runs the playback service behind the HTTP API: clients enqueue references
//! per channel and listeners tune in to each channel's relayed audio.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cantor_core::{bootstrap_services, start_server, AppState};
use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;

use crate::config::ServerConfig;

/// Cantor Server - per-channel playback queues with an HTTP relay.
#[derive(Parser, Debug)]
#[command(name = "cantor-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CANTOR_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "CANTOR_BIND_PORT")]
    port: Option<u16>,

    /// Idle grace period in milliseconds (overrides config file).
    #[arg(long, env = "CANTOR_IDLE_TIMEOUT_MS")]
    idle_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Cantor Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(ms) = args.idle_timeout_ms {
        config.idle_timeout_ms = ms;
    }

    log::info!(
        "Configuration: bind_port={}, idle_timeout_ms={}, relay_bytes_per_second={}",
        config.bind_port,
        config.idle_timeout_ms,
        config.relay_bytes_per_second
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Cancels the server's graceful-shutdown token and leaves every channel.
    services.shutdown().await;

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
