//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the playback service or the
//! relay.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::AppState;
use crate::error::{CantorError, CantorResult};
use crate::service::{EnqueueRequest, EnqueueResponse};
use crate::session::{LoopStatus, SessionSnapshot};
use crate::track::ChannelKey;

/// Boxed stream type for relayed audio.
type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Identifier reported by the health endpoint.
const SERVICE_ID: &str = "cantor";

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/enqueue", post(handle_enqueue))
        .route("/api/channels", get(list_channels))
        .route("/api/channels/{key}", get(channel_status))
        .route("/api/channels/{key}/stop", post(handle_stop))
        .route("/api/channels/{key}/loop", post(handle_toggle_loop))
        .route("/api/channels/{key}/events", get(channel_events))
        .route("/channels/{key}/listen", get(listen))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "channels": state.service.registry().len(),
        "connected": state.relay.connected_count(),
    }))
}

/// POST /api/enqueue
///
/// Resolves the reference and queues it (or plays it next with `playNow`).
async fn handle_enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> CantorResult<Json<EnqueueResponse>> {
    if request.reference.trim().is_empty() {
        return Err(CantorError::InvalidRequest("reference must not be empty".into()));
    }
    log::debug!(
        "[Api] Enqueue from {} on {:?}: {}",
        request.requester,
        request.channel.as_ref().map(ChannelKey::as_str),
        request.reference
    );
    let response = state.service.enqueue(request).await?;
    Ok(Json(response))
}

async fn list_channels(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "channels": state.service.list() }))
}

async fn channel_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<SessionSnapshot> {
    Json(state.service.status(&ChannelKey::new(key)))
}

/// POST /api/channels/{key}/stop
///
/// Clears the queue and leaves the channel.
async fn handle_stop(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<serde_json::Value> {
    state.service.stop(&ChannelKey::new(key)).await;
    Json(json!({ "success": true }))
}

async fn handle_toggle_loop(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> CantorResult<Json<LoopStatus>> {
    let status = state.service.toggle_loop(&ChannelKey::new(key))?;
    Ok(Json(status))
}

/// GET /api/channels/{key}/events
///
/// Server-sent stream of the channel's notifier messages.
async fn channel_events(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let channel = ChannelKey::new(key);
    log::debug!("[Api] Events subscriber for {}", channel);

    let stream = BroadcastStream::new(state.notifier.subscribe()).filter_map(move |result| {
        let event = match result {
            Ok(message) if message.channel == channel => match Event::default()
                .event("message")
                .json_data(&message)
            {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    log::warn!("[Api] Failed to serialize channel message: {}", e);
                    None
                }
            },
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                log::warn!("[Api] Events subscriber for {} lagged by {}", channel, n);
                None
            }
        };
        futures::future::ready(event)
    });
    // Open subscriptions would otherwise hold graceful shutdown forever.
    let stream = stream.take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// GET /channels/{key}/listen
///
/// Relays the channel's audio bytes while it is connected.
async fn listen(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> CantorResult<Response> {
    let channel_key = ChannelKey::new(key);
    let channel = state
        .relay
        .channel(&channel_key)
        .ok_or_else(|| CantorError::ChannelNotFound(channel_key.to_string()))?;

    log::info!(
        "[Api] Listener joined {} ({} already listening)",
        channel_key,
        channel.listener_count()
    );

    // Lagging listeners skip ahead rather than disconnect.
    let stream: AudioStream = Box::pin(BroadcastStream::new(channel.subscribe()).filter_map(
        move |result| {
            let chunk = match result {
                Ok(chunk) => Some(Ok(chunk)),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    log::debug!("[Api] Listener on {} skipped {} chunk(s)", channel_key, n);
                    None
                }
            };
            futures::future::ready(chunk)
        },
    )
    .take_until(state.shutdown.clone().cancelled_owned()));

    Response::builder()
        .header(header::CONTENT_TYPE, channel.content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .header("icy-name", SERVICE_ID)
        .body(Body::from_stream(stream))
        .map_err(|e| CantorError::Internal(e.to_string()))
}
