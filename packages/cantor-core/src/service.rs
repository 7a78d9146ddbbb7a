//! Request/response facade over the registry.
//!
//! [`PlaybackService`] is what command front ends call: it resolves the
//! reference before any session is touched, then hands the track to the
//! channel's session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifier::Notifier;
use crate::registry::SessionRegistry;
use crate::resolver::{ResolveError, Resolver};
use crate::session::{LoopStatus, SessionError, SessionSnapshot};
use crate::track::{ChannelKey, Requester};

/// A request to queue or play a reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    /// Channel the requester is in. `None` means they are not in one.
    #[serde(default)]
    pub channel: Option<ChannelKey>,
    pub reference: String,
    pub requester: Requester,
    /// Play next, stopping the current track.
    #[serde(default)]
    pub play_now: bool,
}

/// Outcome of a successful enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub title: String,
    /// 1-based position in the queue at the time of the request.
    pub queue_position: usize,
}

/// Errors from [`PlaybackService::enqueue`].
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("You must be in a channel to use this command")]
    NoChannelJoined,

    #[error(transparent)]
    Resolution(#[from] ResolveError),
}

/// Entry point for playback commands.
pub struct PlaybackService {
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn Resolver>,
    notifier: Arc<dyn Notifier>,
}

impl PlaybackService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn Resolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            resolver,
            notifier,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Resolves the request's reference and queues it on the channel.
    ///
    /// Resolution failures are reported to the channel and leave every
    /// session untouched.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueResponse, EnqueueError> {
        let EnqueueRequest {
            channel,
            reference,
            requester,
            play_now,
        } = request;
        let channel = channel.ok_or(EnqueueError::NoChannelJoined)?;

        let track = match self.resolver.resolve(&reference, &requester).await {
            Ok(track) => track,
            Err(e) => {
                log::warn!("[Service] Failed to resolve '{}': {}", reference, e);
                self.notifier.notify(
                    &channel,
                    &format!("Could not load {reference} for {requester}: {e}"),
                );
                return Err(e.into());
            }
        };

        let title = track.title().to_string();
        let session = self.registry.get_or_create(&channel);
        let queue_position = session.enqueue(track, play_now).await;

        Ok(EnqueueResponse {
            title,
            queue_position,
        })
    }

    /// Stops the channel and leaves it. Unknown channels are a no-op.
    pub async fn stop(&self, channel: &ChannelKey) {
        if let Some(session) = self.registry.get(channel) {
            session.stop().await;
        }
    }

    /// Toggles looping of the channel's current track.
    pub fn toggle_loop(&self, channel: &ChannelKey) -> Result<LoopStatus, SessionError> {
        self.registry
            .get(channel)
            .ok_or(SessionError::NoActiveTrack)?
            .toggle_loop()
    }

    /// Returns the channel's state without creating a session.
    pub fn status(&self, channel: &ChannelKey) -> SessionSnapshot {
        match self.registry.get(channel) {
            Some(session) => session.snapshot(),
            None => SessionSnapshot::idle(channel.clone()),
        }
    }

    /// Returns the status of every known channel.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        self.registry
            .channels()
            .iter()
            .map(|channel| self.status(channel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::runtime::TokioSpawner;
    use crate::session::{SessionContext, SessionState};
    use crate::test_support::{MockTransport, RecordingNotifier, StaticResolver};

    struct Fixture {
        service: PlaybackService,
        transport: MockTransport,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(resolver: StaticResolver) -> Fixture {
        let transport = MockTransport::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = Arc::new(SessionRegistry::new(SessionContext {
            transport: Arc::new(transport.clone()),
            notifier: notifier.clone(),
            spawner: TokioSpawner::current(),
            config: SessionConfig::default(),
        }));
        let service = PlaybackService::new(registry, Arc::new(resolver), notifier.clone());
        Fixture {
            service,
            transport,
            notifier,
        }
    }

    fn request(channel: Option<&str>, reference: &str, play_now: bool) -> EnqueueRequest {
        EnqueueRequest {
            channel: channel.map(ChannelKey::new),
            reference: reference.to_string(),
            requester: Requester::new("alice"),
            play_now,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_returns_title_and_position() {
        let f = fixture(StaticResolver::default());

        let first = f.service.enqueue(request(Some("c"), "A", false)).await.unwrap();
        let second = f.service.enqueue(request(Some("c"), "B", false)).await.unwrap();
        let third = f.service.enqueue(request(Some("c"), "C", false)).await.unwrap();

        assert_eq!(first, EnqueueResponse { title: "A".into(), queue_position: 1 });
        // A is already playing, so B waits at the head.
        assert_eq!(second.queue_position, 1);
        assert_eq!(third.queue_position, 2);
        assert_eq!(f.transport.plays(), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_channel_is_rejected() {
        let f = fixture(StaticResolver::default());

        let err = f.service.enqueue(request(None, "A", false)).await.unwrap_err();

        assert!(matches!(err, EnqueueError::NoChannelJoined));
        assert!(f.service.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_failure_notifies_and_changes_nothing() {
        let f = fixture(StaticResolver::failing(&["broken"]));
        f.service.enqueue(request(Some("c"), "A", false)).await.unwrap();

        let err = f
            .service
            .enqueue(request(Some("c"), "broken", true))
            .await
            .unwrap_err();

        assert!(matches!(err, EnqueueError::Resolution(_)));
        assert!(f.notifier.contains("Could not load broken"));
        assert_eq!(f.transport.events(), vec!["connect", "play:A"]);
        assert!(f.service.status(&ChannelKey::new("c")).upcoming.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_failure_does_not_create_session() {
        let f = fixture(StaticResolver::failing(&["broken"]));
        let _ = f.service.enqueue(request(Some("new"), "broken", false)).await;
        assert!(f.service.registry().get(&ChannelKey::new("new")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn status_of_unknown_channel_is_idle_and_not_created() {
        let f = fixture(StaticResolver::default());

        let status = f.service.status(&ChannelKey::new("nobody"));

        assert_eq!(status.state, SessionState::Idle);
        assert!(status.current.is_none());
        assert!(f.service.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_loop_on_unknown_channel_fails() {
        let f = fixture(StaticResolver::default());
        assert_eq!(
            f.service.toggle_loop(&ChannelKey::new("nobody")),
            Err(SessionError::NoActiveTrack)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_leaves_channel_idle() {
        let f = fixture(StaticResolver::default());
        let key = ChannelKey::new("c");
        f.service.enqueue(request(Some("c"), "A", false)).await.unwrap();
        f.service.enqueue(request(Some("c"), "B", false)).await.unwrap();

        f.service.stop(&key).await;

        let status = f.service.status(&key);
        assert_eq!(status.state, SessionState::Idle);
        assert!(status.upcoming.is_empty());
        assert_eq!(f.service.list().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn channels_are_independent() {
        let f = fixture(StaticResolver::default());
        f.service.enqueue(request(Some("one"), "A", false)).await.unwrap();
        f.service.enqueue(request(Some("two"), "B", false)).await.unwrap();

        f.service.stop(&ChannelKey::new("one")).await;

        assert_eq!(f.service.status(&ChannelKey::new("one")).state, SessionState::Idle);
        assert_eq!(f.service.status(&ChannelKey::new("two")).state, SessionState::Playing);
    }
}
