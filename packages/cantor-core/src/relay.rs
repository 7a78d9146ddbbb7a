//! Default transport: relays a track's bytes to HTTP listeners.
//!
//! Connecting to a channel creates a [`RelayChannel`], a broadcast of
//! `Bytes` that `/channels/{key}/listen` subscribers read from. Playing a
//! track fetches its source with reqwest and pumps the body into the
//! broadcast, paced to the configured byte rate so listeners receive audio
//! at roughly real-time speed.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::runtime::{BoxedTask, TaskSpawner, TokioSpawner};
use crate::track::{ChannelKey, Track};
use crate::transport::{
    Completion, PlaybackOutcome, Transport, TransportError, TransportHandle, TransportResult,
};

/// Content type served when the source did not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Live byte fan-out for one connected channel.
pub struct RelayChannel {
    key: ChannelKey,
    tx: broadcast::Sender<Bytes>,
    content_type: RwLock<Option<String>>,
}

impl RelayChannel {
    fn new(key: ChannelKey, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            key,
            tx,
            content_type: RwLock::new(None),
        }
    }

    /// Returns a receiver for bytes pushed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    /// Content type of the track being relayed.
    pub fn content_type(&self) -> String {
        self.content_type
            .read()
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn push(&self, chunk: Bytes) {
        // No listeners is normal; the track keeps playing regardless.
        if let Err(e) = self.tx.send(chunk) {
            log::trace!("[Relay] {}: no listeners ({} bytes dropped)", self.key, e.0.len());
        }
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        log::debug!("[Relay] {} closed", self.key);
    }
}

/// Transport that relays tracks to HTTP listeners.
#[derive(Clone)]
pub struct RelayTransport {
    client: Client,
    config: RelayConfig,
    spawner: TokioSpawner,
    channels: Arc<DashMap<ChannelKey, Arc<RelayChannel>>>,
}

impl RelayTransport {
    pub fn new(client: Client, config: RelayConfig, spawner: TokioSpawner) -> Self {
        Self {
            client,
            config,
            spawner,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Returns the relay for a connected channel.
    pub fn channel(&self, key: &ChannelKey) -> Option<Arc<RelayChannel>> {
        self.channels.get(key).map(|c| Arc::clone(c.value()))
    }

    /// Number of currently connected channels.
    pub fn connected_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn connect(&self, channel: &ChannelKey) -> TransportResult<Arc<dyn TransportHandle>> {
        let relay = Arc::new(RelayChannel::new(
            channel.clone(),
            self.config.channel_capacity,
        ));
        if self
            .channels
            .insert(channel.clone(), Arc::clone(&relay))
            .is_some()
        {
            log::warn!("[Relay] {} was already connected; replacing", channel);
        }
        log::info!("[Relay] {} connected", channel);

        Ok(Arc::new(RelayHandle {
            relay,
            channels: Arc::clone(&self.channels),
            client: self.client.clone(),
            config: self.config.clone(),
            spawner: self.spawner.clone(),
            active: Mutex::new(None),
        }))
    }
}

/// Connection to one relay channel.
struct RelayHandle {
    relay: Arc<RelayChannel>,
    channels: Arc<DashMap<ChannelKey, Arc<RelayChannel>>>,
    client: Client,
    config: RelayConfig,
    spawner: TokioSpawner,
    /// Cancels the running pump.
    active: Mutex<Option<CancellationToken>>,
}

impl RelayHandle {
    fn cancel_active(&self) -> bool {
        match self.active.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TransportHandle for RelayHandle {
    async fn play(&self, track: &Track, completion: Completion) -> TransportResult<()> {
        self.cancel_active();

        let response = self
            .client
            .get(track.source())
            .send()
            .await
            .map_err(|e| TransportError::Play(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Play(format!("source returned HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.relay.content_type.write() = content_type;

        let cancel = CancellationToken::new();
        *self.active.lock() = Some(cancel.clone());

        let relay = Arc::clone(&self.relay);
        let chunk_size = self.config.chunk_size;
        let rate = self.config.bytes_per_second;
        let title = track.title().to_string();
        let task: BoxedTask = Box::pin(async move {
            let outcome = pump(response.bytes_stream(), &relay, &cancel, chunk_size, rate).await;
            // Marks the handle inactive once the body has ended on its own.
            cancel.cancel();
            match &outcome {
                Ok(()) => log::debug!("[Relay] {}: finished '{}'", relay.key, title),
                Err(e) => log::warn!("[Relay] {}: '{}' failed: {}", relay.key, title, e),
            }
            completion.complete(outcome);
        });
        self.spawner.spawn(task);

        log::debug!("[Relay] {}: streaming {}", self.relay.key, track.source());
        Ok(())
    }

    async fn stop(&self) {
        if self.cancel_active() {
            log::debug!("[Relay] {}: stop requested", self.relay.key);
        }
    }

    async fn disconnect(&self) {
        self.cancel_active();
        // Only remove the entry if it is still ours (a reconnect may have
        // replaced it).
        let removed = self
            .channels
            .remove_if(&self.relay.key, |_, existing| Arc::ptr_eq(existing, &self.relay));
        if removed.is_some() {
            log::info!("[Relay] {} disconnected", self.relay.key);
        }
    }

    fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

/// Forwards `source` into `relay` until it ends, fails or is cancelled.
///
/// Chunks are split to at most `chunk_size` bytes. With a non-zero
/// `bytes_per_second` the pump sleeps so that the total forwarded never runs
/// ahead of the wall clock. Cancellation counts as a normal end.
async fn pump<S, E>(
    source: S,
    relay: &RelayChannel,
    cancel: &CancellationToken,
    chunk_size: usize,
    bytes_per_second: u64,
) -> PlaybackOutcome
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut source = std::pin::pin!(source);
    let started = Instant::now();
    let mut sent: u64 = 0;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = source.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(TransportError::Stream(e.to_string())),
            None => return Ok(()),
        };

        let mut offset = 0;
        while offset < chunk.len() {
            let end = (offset + chunk_size).min(chunk.len());
            relay.push(chunk.slice(offset..end));
            sent += (end - offset) as u64;
            offset = end;

            if let Some(delay) = pacing_delay(started.elapsed(), sent, bytes_per_second) {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// How long to wait so `sent` bytes are not ahead of `elapsed` at `rate`.
fn pacing_delay(elapsed: Duration, sent: u64, bytes_per_second: u64) -> Option<Duration> {
    if bytes_per_second == 0 {
        return None;
    }
    let due = Duration::from_secs_f64(sent as f64 / bytes_per_second as f64);
    due.checked_sub(elapsed).filter(|d| !d.is_zero())
}
