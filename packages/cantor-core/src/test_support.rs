//! In-memory collaborators for unit tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::notifier::Notifier;
use crate::resolver::{ResolveError, ResolveResult, Resolver};
use crate::track::{ChannelKey, Requester, Track};
use crate::transport::{Completion, Transport, TransportError, TransportHandle, TransportResult};

pub(crate) fn track(title: &str) -> Track {
    Track::new(format!("mock://{title}"), title, Requester::new("tester"))
}

/// Lets spawned watchers and timers that are already due run.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[derive(Default)]
struct MockState {
    events: Vec<String>,
    /// Active plays as `(handle id, completion)`, oldest first.
    active: Vec<(usize, Completion)>,
    next_handle: usize,
    fail_connect: bool,
    fail_titles: HashSet<String>,
    connect_delay: Option<Duration>,
    disconnect_delay: Option<Duration>,
    /// Every handle handed out, oldest first.
    handles: Vec<Arc<MockHandle>>,
}

/// Transport that records every call and lets the test fire completions.
///
/// All handles share one state, so tests observe a single event log per
/// transport. Events are `connect`, `play:<title>`, `stop`, `disconnect`.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    /// Titles passed to `play`, in order.
    pub fn plays(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("play:").map(str::to_string))
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn fail_title(&self, title: &str) {
        self.state.lock().fail_titles.insert(title.to_string());
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    pub fn set_disconnect_delay(&self, delay: Duration) {
        self.state.lock().disconnect_delay = Some(delay);
    }

    /// The most recently connected handle.
    pub fn latest_handle(&self) -> Option<Arc<dyn TransportHandle>> {
        let handle = self.state.lock().handles.last().cloned()?;
        Some(handle as Arc<dyn TransportHandle>)
    }

    /// Fires the most recent active completion with success. Returns false
    /// if nothing was playing.
    pub fn finish_current(&self) -> bool {
        self.complete_current(Ok(()))
    }

    /// Fires the active completion with a stream error.
    pub fn fail_current(&self, reason: &str) -> bool {
        self.complete_current(Err(TransportError::Stream(reason.to_string())))
    }

    fn complete_current(&self, outcome: Result<(), TransportError>) -> bool {
        let completion = self.state.lock().active.pop();
        match completion {
            Some((_, completion)) => {
                completion.complete(outcome);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _channel: &ChannelKey) -> TransportResult<Arc<dyn TransportHandle>> {
        let (delay, fail, id) = {
            let mut state = self.state.lock();
            state.events.push("connect".to_string());
            state.next_handle += 1;
            (state.connect_delay, state.fail_connect, state.next_handle)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::Connect("mock connect failure".to_string()));
        }
        let handle = Arc::new(MockHandle {
            id,
            state: Arc::clone(&self.state),
        });
        self.state.lock().handles.push(Arc::clone(&handle));
        Ok(handle)
    }
}

struct MockHandle {
    id: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn take_active(state: &mut MockState, id: usize) -> Option<Completion> {
        let idx = state.active.iter().position(|(owner, _)| *owner == id)?;
        Some(state.active.remove(idx).1)
    }

    fn stop_active(&self, event: &str) {
        let completion = {
            let mut state = self.state.lock();
            state.events.push(event.to_string());
            Self::take_active(&mut state, self.id)
        };
        if let Some(completion) = completion {
            completion.complete(Ok(()));
        }
    }
}

#[async_trait]
impl TransportHandle for MockHandle {
    async fn play(&self, track: &Track, completion: Completion) -> TransportResult<()> {
        let mut state = self.state.lock();
        state.events.push(format!("play:{}", track.title()));
        if state.fail_titles.contains(track.title()) {
            return Err(TransportError::Play(format!("cannot play {}", track.title())));
        }
        // A new play replaces (and drops) this handle's previous one.
        Self::take_active(&mut state, self.id);
        state.active.push((self.id, completion));
        Ok(())
    }

    async fn stop(&self) {
        self.stop_active("stop");
    }

    async fn disconnect(&self) {
        let delay = self.state.lock().disconnect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.stop_active("disconnect");
    }

    fn is_active(&self) -> bool {
        self.state
            .lock()
            .active
            .iter()
            .any(|(owner, _)| *owner == self.id)
    }
}

/// Notifier that keeps every message.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<(ChannelKey, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, channel: &ChannelKey, message: &str) {
        self.messages
            .lock()
            .push((channel.clone(), message.to_string()));
    }
}

/// Resolver that turns any reference into a track titled after it.
///
/// References listed in `failing` resolve to `NoMedia`.
#[derive(Default)]
pub(crate) struct StaticResolver {
    failing: HashSet<String>,
}

impl StaticResolver {
    pub fn failing(references: &[&str]) -> Self {
        Self {
            failing: references.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, reference: &str, requester: &Requester) -> ResolveResult<Track> {
        if self.failing.contains(reference) {
            return Err(ResolveError::NoMedia(reference.to_string()));
        }
        Ok(Track::new(
            format!("mock://{reference}"),
            reference,
            requester.clone(),
        ))
    }
}

/// HTTP client that ignores proxy environment variables.
pub(crate) fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client builds")
}

/// Serves `router` on an ephemeral local port.
pub(crate) async fn serve(router: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}
