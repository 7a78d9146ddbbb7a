//! Transport abstraction: the thing that actually streams a track into a
//! channel.
//!
//! Sessions depend on these traits rather than a concrete implementation.
//! The server wires in [`RelayTransport`](crate::relay::RelayTransport);
//! tests use an in-memory mock.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::track::{ChannelKey, Track};

/// Errors reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not open the channel connection.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Could not start streaming a track.
    #[error("Failed to start playback: {0}")]
    Play(String),

    /// The stream failed after it started.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The transport dropped a completion without firing it.
    #[error("Playback ended without a completion report")]
    CompletionDropped,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// How a single `play` ended.
pub type PlaybackOutcome = Result<(), TransportError>;

/// Single-use completion callback handed to [`TransportHandle::play`].
///
/// Consuming `complete` is the only way to fire it, so a transport can
/// report each play at most once. Dropping it unfired is reported to the
/// session as [`TransportError::CompletionDropped`].
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<PlaybackOutcome>,
}

impl Completion {
    /// Creates a completion and the receiver the session waits on.
    pub fn new() -> (Self, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, CompletionReceiver { rx })
    }

    /// Reports how the stream ended.
    pub fn complete(self, outcome: PlaybackOutcome) {
        // Receiver gone means the session no longer cares about this play.
        let _ = self.tx.send(outcome);
    }
}

/// Receiving half of a [`Completion`].
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: oneshot::Receiver<PlaybackOutcome>,
}

impl CompletionReceiver {
    /// Waits for the transport to report the outcome.
    pub async fn wait(self) -> PlaybackOutcome {
        self.rx
            .await
            .unwrap_or(Err(TransportError::CompletionDropped))
    }
}

/// Opens channel connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to a channel, returning the handle used for playback.
    async fn connect(&self, channel: &ChannelKey) -> TransportResult<Arc<dyn TransportHandle>>;
}

/// A live connection to one channel.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Starts streaming `track`.
    ///
    /// Returns once the stream has started; `completion` is fired later,
    /// exactly once, when the stream ends naturally, fails, or is stopped.
    /// On `Err` the completion is dropped unfired.
    async fn play(&self, track: &Track, completion: Completion) -> TransportResult<()>;

    /// Stops the active stream, if any. Its completion fires.
    async fn stop(&self);

    /// Closes the connection. Any active stream is stopped first.
    async fn disconnect(&self);

    /// Whether a stream is currently active on this connection.
    fn is_active(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_delivers_outcome() {
        let (completion, receiver) = Completion::new();
        completion.complete(Err(TransportError::Stream("eof".into())));
        assert_eq!(
            receiver.wait().await,
            Err(TransportError::Stream("eof".into()))
        );
    }

    #[tokio::test]
    async fn dropped_completion_reports_error() {
        let (completion, receiver) = Completion::new();
        drop(completion);
        assert_eq!(receiver.wait().await, Err(TransportError::CompletionDropped));
    }
}
