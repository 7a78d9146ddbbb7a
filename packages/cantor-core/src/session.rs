//! Per-channel playback sessions.
//!
//! A [`PlaybackSession`] owns one channel's queue, current track, loop flag,
//! transport handle and idle timer. Every mutation goes through one
//! `parking_lot::Mutex` that is never held across an `.await`; transport
//! calls happen between lock scopes and their results are committed
//! afterwards.
//!
//! # Advancing
//!
//! `advance` is the only place a track is picked and started. It runs after
//! enqueue into an idle session, after every transport completion, after a
//! failed start and after a disconnect that left tracks queued. It is
//! single-flight: a caller that finds an advance in progress sets `rerun`
//! and leaves, and the running driver loops until no rerun is pending. The
//! driver runs as its own task, so cancelling a caller cannot strand it.
//!
//! # Staleness
//!
//! - Every `play` gets a fresh play id. A completion whose id is not the
//!   active play is ignored.
//! - `stop` bumps the epoch. An advance that was connecting or starting when
//!   the epoch changed undoes its own work when it resumes.
//! - The idle timer carries an id and a cancellation token. Firing re-checks
//!   the id and the empty/non-looping condition under the lock.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::notifier::Notifier;
use crate::queue::TrackQueue;
use crate::runtime::{BoxedTask, TaskSpawner, TokioSpawner};
use crate::track::{ChannelKey, Track};
use crate::transport::{
    Completion, CompletionReceiver, PlaybackOutcome, Transport, TransportError, TransportHandle,
};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Not connected, nothing playing.
    Idle,
    /// Connecting or starting a track.
    Starting,
    /// Streaming the current track.
    Playing,
    /// Connected with nothing to play; the idle timer is armed.
    Lingering,
    /// Tearing down the transport connection.
    Disconnecting,
}

/// Errors from session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No track is currently playing to loop")]
    NoActiveTrack,
}

/// Result of toggling the loop flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStatus {
    pub looping: bool,
    /// Title of the track the flag applies to.
    pub title: String,
}

/// Point-in-time view of a session, taken under its lock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub channel: ChannelKey,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Track>,
    pub looping: bool,
    pub upcoming: Vec<Track>,
}

impl SessionSnapshot {
    /// Snapshot of a channel that has no session yet.
    pub fn idle(channel: ChannelKey) -> Self {
        Self {
            channel,
            state: SessionState::Idle,
            current: None,
            looping: false,
            upcoming: Vec::new(),
        }
    }
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionContext {
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn Notifier>,
    pub spawner: TokioSpawner,
    pub config: SessionConfig,
}

struct IdleTimer {
    id: u64,
    cancel: CancellationToken,
}

struct SessionInner {
    state: SessionState,
    queue: TrackQueue,
    current: Option<Track>,
    loop_enabled: bool,
    handle: Option<Arc<dyn TransportHandle>>,
    idle_timer: Option<IdleTimer>,
    /// Id of the play whose completion is still expected.
    active_play: Option<u64>,
    /// Stop the starting track as soon as it has started.
    preempt: bool,
    epoch: u64,
    advancing: bool,
    rerun: bool,
    next_play_id: u64,
    next_timer_id: u64,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            queue: TrackQueue::new(),
            current: None,
            loop_enabled: false,
            handle: None,
            idle_timer: None,
            active_play: None,
            preempt: false,
            epoch: 0,
            advancing: false,
            rerun: false,
            next_play_id: 1,
            next_timer_id: 1,
        }
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.cancel.cancel();
        }
    }
}

/// What an advance decided to play.
struct PlayPlan {
    track: Track,
    looped: bool,
    handle: Option<Arc<dyn TransportHandle>>,
    epoch: u64,
}

/// Follow-up work decided by `enqueue` under the lock.
enum EnqueueAction {
    Advance,
    StopActive(Arc<dyn TransportHandle>),
    Nothing,
}

/// Playback state for one channel.
pub struct PlaybackSession {
    channel: ChannelKey,
    inner: Mutex<SessionInner>,
    ctx: SessionContext,
    /// Woken when a disconnect has finished and the session is idle.
    disconnected: Notify,
}

impl PlaybackSession {
    /// Creates an idle session.
    pub fn new(channel: ChannelKey, ctx: SessionContext) -> Arc<Self> {
        Arc::new(Self {
            channel,
            inner: Mutex::new(SessionInner::new()),
            ctx,
            disconnected: Notify::new(),
        })
    }

    pub fn channel(&self) -> &ChannelKey {
        &self.channel
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Returns a consistent view of state, current track and queue.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            channel: self.channel.clone(),
            state: inner.state,
            current: inner.current.clone(),
            looping: inner.loop_enabled,
            upcoming: inner.queue.snapshot(),
        }
    }

    /// Adds a track and returns its 1-based queue position.
    ///
    /// With `play_now` the track is spliced to the front. If a stream is
    /// active it is stopped and the completion advances to the spliced
    /// track; an idle session starts it directly. Play-now also turns
    /// looping off.
    pub async fn enqueue(self: &Arc<Self>, track: Track, play_now: bool) -> usize {
        let title = track.title().to_string();
        let (position, action, loop_cleared) = {
            let mut inner = self.inner.lock();
            inner.cancel_idle_timer();

            let position = if play_now {
                inner.queue.splice_to_front(track);
                1
            } else {
                inner.queue.enqueue(track)
            };
            let loop_cleared = play_now && std::mem::take(&mut inner.loop_enabled);

            let action = match inner.state {
                SessionState::Idle | SessionState::Lingering => EnqueueAction::Advance,
                SessionState::Playing if play_now => match inner.handle.clone() {
                    Some(handle) => EnqueueAction::StopActive(handle),
                    None => EnqueueAction::Nothing,
                },
                SessionState::Starting if play_now => {
                    inner.preempt = true;
                    EnqueueAction::Nothing
                }
                _ => EnqueueAction::Nothing,
            };
            (position, action, loop_cleared)
        };

        log::debug!(
            "[Session] {}: queued '{}' at position {} (play_now={})",
            self.channel,
            title,
            position,
            play_now
        );
        if loop_cleared {
            self.ctx
                .notifier
                .notify(&self.channel, &format!("Looping disabled to play {title}"));
        }

        match action {
            EnqueueAction::Advance => self.advance().await,
            EnqueueAction::StopActive(handle) => handle.stop().await,
            EnqueueAction::Nothing => {}
        }
        position
    }

    /// Flips the loop flag for the current track.
    pub fn toggle_loop(&self) -> Result<LoopStatus, SessionError> {
        let mut inner = self.inner.lock();
        let title = inner
            .current
            .as_ref()
            .map(|t| t.title().to_string())
            .ok_or(SessionError::NoActiveTrack)?;
        inner.loop_enabled = !inner.loop_enabled;
        log::info!(
            "[Session] {}: looping {} for '{}'",
            self.channel,
            if inner.loop_enabled { "on" } else { "off" },
            title
        );
        Ok(LoopStatus {
            looping: inner.loop_enabled,
            title,
        })
    }

    /// Drops the queue, stops playback and disconnects. Idempotent.
    ///
    /// Returns once the session is `Idle`. If an idle-timeout disconnect is
    /// already in flight, waits for it to finish.
    pub async fn stop(self: &Arc<Self>) {
        let (handle, dropped, pending_disconnect) = {
            let mut inner = self.inner.lock();
            inner.loop_enabled = false;
            let dropped = inner.queue.drain();
            inner.current = None;
            inner.active_play = None;
            inner.preempt = false;
            inner.cancel_idle_timer();
            inner.epoch += 1;
            let handle = inner.handle.take();
            // Registered under the lock so the wakeup cannot be missed.
            let pending_disconnect = (handle.is_none()
                && inner.state == SessionState::Disconnecting)
                .then(|| self.disconnected.notified());
            inner.state = if handle.is_some() || pending_disconnect.is_some() {
                SessionState::Disconnecting
            } else {
                SessionState::Idle
            };
            (handle, dropped, pending_disconnect)
        };

        log::info!(
            "[Session] {}: stopped ({} queued track(s) dropped)",
            self.channel,
            dropped
        );

        if let Some(handle) = handle {
            handle.stop().await;
            handle.disconnect().await;
            self.finish_disconnect().await;
        } else if let Some(pending) = pending_disconnect {
            pending.await;
        }
    }

    /// Runs the advance driver, or asks the running one to go again.
    ///
    /// The driver is a spawned task, so dropping the caller (a disconnected
    /// HTTP client, say) never leaves `advancing` set. Callers wait for the
    /// driver they started; a caller that only requested a rerun returns at
    /// once.
    async fn advance(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.advancing {
                inner.rerun = true;
                return;
            }
            inner.advancing = true;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let session = Arc::clone(self);
        let driver: BoxedTask = Box::pin(async move {
            session.drive().await;
            let _ = done_tx.send(());
        });
        self.ctx.spawner.spawn(driver);
        let _ = done_rx.await;
    }

    /// Single-flight loop: picks and starts tracks until no rerun is
    /// pending. Only `advance` starts it.
    async fn drive(self: &Arc<Self>) {
        loop {
            if let Some(plan) = self.next_step() {
                self.start_track(plan).await;
            }

            let mut inner = self.inner.lock();
            if !inner.rerun {
                inner.advancing = false;
                break;
            }
        }
    }

    /// Decides the next track under the lock, or arms the idle timer.
    fn next_step(self: &Arc<Self>) -> Option<PlayPlan> {
        let mut inner = self.inner.lock();
        inner.rerun = false;
        if inner.state == SessionState::Disconnecting || inner.active_play.is_some() {
            return None;
        }
        inner.preempt = false;
        inner.cancel_idle_timer();

        let (next, looped) = match (inner.loop_enabled, inner.current.clone()) {
            (true, Some(current)) => (Some(current), true),
            _ => (inner.queue.dequeue(), false),
        };

        match next {
            Some(track) => {
                inner.current = Some(track.clone());
                inner.state = SessionState::Starting;
                Some(PlayPlan {
                    track,
                    looped,
                    handle: inner.handle.clone(),
                    epoch: inner.epoch,
                })
            }
            None => {
                inner.current = None;
                if inner.handle.is_some() {
                    inner.state = SessionState::Lingering;
                    self.arm_idle_timer(&mut inner);
                } else {
                    inner.state = SessionState::Idle;
                }
                None
            }
        }
    }

    async fn start_track(self: &Arc<Self>, plan: PlayPlan) {
        let PlayPlan {
            track,
            looped,
            handle,
            epoch,
        } = plan;

        let handle = match handle {
            Some(handle) => handle,
            None => match self.ctx.transport.connect(&self.channel).await {
                Ok(handle) => {
                    let stale = {
                        let mut inner = self.inner.lock();
                        if inner.epoch == epoch {
                            inner.handle = Some(Arc::clone(&handle));
                            false
                        } else {
                            true
                        }
                    };
                    if stale {
                        log::debug!("[Session] {}: stopped while connecting", self.channel);
                        handle.disconnect().await;
                        return;
                    }
                    log::info!("[Session] {}: connected", self.channel);
                    handle
                }
                Err(e) => {
                    self.on_start_failure(&track, epoch, e);
                    return;
                }
            },
        };

        let (completion, receiver) = Completion::new();
        let play_id = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return;
            }
            let id = inner.next_play_id;
            inner.next_play_id += 1;
            inner.active_play = Some(id);
            id
        };

        match handle.play(&track, completion).await {
            Ok(()) => {
                // Watching starts only once the transport owns the
                // completion; an early fire waits in the channel.
                self.spawn_completion_watcher(play_id, receiver);
                let (still_active, preempted, stale) = {
                    let mut inner = self.inner.lock();
                    let stale = inner.epoch != epoch;
                    let still_active = !stale && inner.active_play == Some(play_id);
                    if still_active {
                        inner.state = SessionState::Playing;
                    }
                    (still_active, std::mem::take(&mut inner.preempt), stale)
                };

                if stale || (still_active && preempted) {
                    handle.stop().await;
                } else if still_active && !looped {
                    log::info!("[Session] {}: playing '{}'", self.channel, track.title());
                    self.ctx
                        .notifier
                        .notify(&self.channel, &format!("Now playing: {track}"));
                }
            }
            Err(e) => {
                // A stop may have claimed the play while `play` was pending.
                let ours = {
                    let mut inner = self.inner.lock();
                    if inner.active_play == Some(play_id) {
                        inner.active_play = None;
                        true
                    } else {
                        false
                    }
                };
                if ours {
                    self.on_start_failure(&track, epoch, e);
                }
            }
        }
    }

    /// Reports a track that could not be started and schedules a skip.
    fn on_start_failure(&self, track: &Track, epoch: u64, err: TransportError) {
        let loop_cleared = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.rerun = true;
            std::mem::take(&mut inner.loop_enabled)
        };

        log::warn!(
            "[Session] {}: failed to start '{}': {}",
            self.channel,
            track.title(),
            err
        );
        self.ctx.notifier.notify(
            &self.channel,
            &format!("Playback error: could not play {}: {}", track.title(), err),
        );
        if loop_cleared {
            self.ctx
                .notifier
                .notify(&self.channel, "Looping disabled after a playback error");
        }
    }

    fn spawn_completion_watcher(self: &Arc<Self>, play_id: u64, receiver: CompletionReceiver) {
        let session = Arc::clone(self);
        let watcher: BoxedTask = Box::pin(async move {
            let outcome = receiver.wait().await;
            session.on_playback_finished(play_id, outcome).await;
        });
        self.ctx.spawner.spawn(watcher);
    }

    /// Handles a transport completion.
    async fn on_playback_finished(self: &Arc<Self>, play_id: u64, outcome: PlaybackOutcome) {
        let loop_cleared = {
            let mut inner = self.inner.lock();
            if inner.active_play != Some(play_id) {
                log::debug!(
                    "[Session] {}: ignoring stale completion for play {}",
                    self.channel,
                    play_id
                );
                return;
            }
            inner.active_play = None;
            inner.preempt = false;
            inner.state = SessionState::Starting;
            outcome.is_err() && std::mem::take(&mut inner.loop_enabled)
        };

        if let Err(e) = &outcome {
            log::warn!("[Session] {}: playback failed: {}", self.channel, e);
            self.ctx
                .notifier
                .notify(&self.channel, &format!("Playback error: {e}"));
        }
        if loop_cleared {
            self.ctx
                .notifier
                .notify(&self.channel, "Looping disabled after a playback error");
        }

        self.advance().await;
    }

    /// Arms a fresh idle timer. Caller holds the lock.
    fn arm_idle_timer(self: &Arc<Self>, inner: &mut SessionInner) {
        inner.cancel_idle_timer();
        let id = inner.next_timer_id;
        inner.next_timer_id += 1;
        let cancel = CancellationToken::new();
        inner.idle_timer = Some(IdleTimer {
            id,
            cancel: cancel.clone(),
        });

        let session = Arc::clone(self);
        let grace = self.ctx.config.idle_timeout();
        let timer: BoxedTask = Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => session.on_idle_timeout(id).await,
            }
        });
        self.ctx.spawner.spawn(timer);
    }

    async fn on_idle_timeout(self: &Arc<Self>, timer_id: u64) {
        let handle = {
            let mut inner = self.inner.lock();
            if inner.idle_timer.as_ref().map(|t| t.id) != Some(timer_id) {
                return;
            }
            inner.idle_timer = None;
            if !inner.queue.is_empty()
                || inner.current.is_some()
                || inner.active_play.is_some()
                || inner.loop_enabled
            {
                return;
            }
            let Some(handle) = inner.handle.take() else {
                return;
            };
            inner.state = SessionState::Disconnecting;
            handle
        };

        log::info!("[Session] {}: idle, disconnecting", self.channel);
        handle.disconnect().await;
        self.finish_disconnect().await;
    }

    /// Completes a disconnect and resumes if tracks arrived meanwhile.
    async fn finish_disconnect(self: &Arc<Self>) {
        let resume = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disconnecting {
                inner.state = SessionState::Idle;
            }
            inner.state == SessionState::Idle && !inner.queue.is_empty()
        };
        self.disconnected.notify_waiters();
        if resume {
            self.advance().await;
        }
    }
}
