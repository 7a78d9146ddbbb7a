//! User-visible channel messages.
//!
//! Sessions report errors and status through the [`Notifier`] trait. Delivery
//! is best-effort: a notifier never returns an error, and implementations
//! swallow their own failures so nothing leaks back into session state.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::track::ChannelKey;
use crate::utils::now_millis;

/// Delivers text messages to the users of a channel.
pub trait Notifier: Send + Sync {
    /// Sends `message` to `channel`. Best-effort.
    fn notify(&self, channel: &ChannelKey, message: &str);
}

/// A message addressed to a channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    pub channel: ChannelKey,
    pub message: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Writes messages to the log.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, channel: &ChannelKey, message: &str) {
        log::info!("[Notify] {}: {}", channel, message);
    }
}

/// Discards messages.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _channel: &ChannelKey, _message: &str) {}
}

/// Fans messages out over a broadcast channel (consumed by the SSE endpoint).
///
/// An optional downstream notifier also receives every message; the server
/// uses it to keep messages in the log.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ChannelMessage>,
    downstream: Arc<RwLock<Option<Arc<dyn Notifier>>>>,
}

impl BroadcastNotifier {
    /// Creates a new notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            downstream: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets a notifier that also receives every message.
    pub fn set_downstream(&self, notifier: Arc<dyn Notifier>) {
        *self.downstream.write() = Some(notifier);
    }

    /// Returns a new receiver for all channels' messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, channel: &ChannelKey, message: &str) {
        if let Some(ref downstream) = *self.downstream.read() {
            downstream.notify(channel, message);
        }
        let event = ChannelMessage {
            channel: channel.clone(),
            message: message.to_string(),
            timestamp: now_millis(),
        };
        if let Err(e) = self.tx.send(event) {
            log::trace!("[Notify] No message subscribers: {}", e);
        }
    }
}
