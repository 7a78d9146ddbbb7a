//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root: the single place where the
//! registry, the default adapters and the playback service are built and
//! wired together.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ResolverConfig};
use crate::error::{CantorError, CantorResult};
use crate::notifier::{BroadcastNotifier, LoggingNotifier, Notifier};
use crate::registry::SessionRegistry;
use crate::relay::RelayTransport;
use crate::resolver::{HttpResolver, Resolver};
use crate::runtime::TokioSpawner;
use crate::service::PlaybackService;
use crate::session::SessionContext;
use crate::transport::Transport;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Entry point for playback commands.
    pub service: Arc<PlaybackService>,
    /// Every channel session.
    pub registry: Arc<SessionRegistry>,
    /// Relay transport (also serves listener subscriptions).
    pub relay: Arc<RelayTransport>,
    /// Channel messages, consumed by the SSE endpoint.
    pub notifier: Arc<BroadcastNotifier>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Stops every session and signals background tasks to end.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();
        self.registry.stop_all().await;

        log::info!(
            "[Bootstrap] Shutdown complete ({} channel(s) known)",
            self.registry.len()
        );
    }
}

/// Creates the shared HTTP client for resolution and relay fetches.
///
/// Only the connect phase is bounded: relay bodies stream for the length of
/// a track. Resolution applies its own per-request timeout.
fn create_http_client(config: &ResolverConfig) -> CantorResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .user_agent(concat!("cantor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CantorError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all services with their dependencies.
///
/// Wiring order:
///
/// 1. Shared infrastructure (spawner, HTTP client, cancellation token)
/// 2. Notifier (broadcast with a logging downstream)
/// 3. Adapters (HTTP resolver, relay transport)
/// 4. Session registry (depends on transport, notifier, spawner)
/// 5. Playback service (depends on registry, resolver, notifier)
///
/// # Errors
///
/// Returns [`CantorError::Configuration`] if the configuration is invalid.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime context.
pub fn bootstrap_services(config: &Config) -> CantorResult<BootstrappedServices> {
    config.validate().map_err(CantorError::Configuration)?;

    let spawner = TokioSpawner::current();
    let http_client = create_http_client(&config.resolver)?;
    let cancel_token = CancellationToken::new();

    let notifier = Arc::new(BroadcastNotifier::new(config.event_channel_capacity));
    notifier.set_downstream(Arc::new(LoggingNotifier));

    let resolver = Arc::new(HttpResolver::new(
        http_client.clone(),
        Duration::from_secs(config.resolver.request_timeout_secs),
    ));
    let relay = Arc::new(RelayTransport::new(
        http_client,
        config.relay.clone(),
        spawner.clone(),
    ));

    let registry = Arc::new(SessionRegistry::new(SessionContext {
        transport: Arc::clone(&relay) as Arc<dyn Transport>,
        notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
        spawner: spawner.clone(),
        config: config.session.clone(),
    }));

    let service = Arc::new(PlaybackService::new(
        Arc::clone(&registry),
        resolver as Arc<dyn Resolver>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
    ));

    log::info!(
        "[Bootstrap] Services ready (idle timeout {}ms, relay {} B/s)",
        config.session.idle_timeout_ms,
        config.relay.bytes_per_second
    );

    Ok(BootstrappedServices {
        service,
        registry,
        relay,
        notifier,
        spawner,
        cancel_token,
    })
}
