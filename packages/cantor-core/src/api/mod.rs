//! HTTP API layer.
//!
//! Thin handlers that delegate to [`PlaybackService`] and the relay. This
//! module holds the shared state and server startup; routes live in
//! [`http`].

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::config::Config;
use crate::notifier::BroadcastNotifier;
use crate::relay::RelayTransport;
use crate::service::PlaybackService;

pub mod http;

/// First port tried when no preferred port is configured.
pub const DEFAULT_PORT_START: u16 = 49500;
/// Last port tried when no preferred port is configured.
pub const DEFAULT_PORT_END: u16 = 49510;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Playback commands.
    pub service: Arc<PlaybackService>,
    /// Relay used by the listen endpoint.
    pub relay: Arc<RelayTransport>,
    /// Channel messages for the events endpoint.
    pub notifier: Arc<BroadcastNotifier>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
    /// Cancelled to stop the server.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self {
            service: Arc::clone(&services.service),
            relay: Arc::clone(&services.relay),
            notifier: Arc::clone(&services.notifier),
            config,
            shutdown: services.cancel_token.clone(),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or first free default port.
///
/// Returns once the state's shutdown token is cancelled.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(DEFAULT_PORT_START, DEFAULT_PORT_END).await?
    };

    log::info!("[Api] Server listening on http://0.0.0.0:{}", port);
    let shutdown = state.shutdown.clone();
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("[Api] Server stopped");
    Ok(())
}
