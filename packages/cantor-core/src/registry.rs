//! Process-lifetime map of channel sessions.
//!
//! The registry is append-only: a session is created the first time a
//! channel is used and is never removed. A stopped session stays in the map
//! in its idle state, so memory grows by one idle session per channel ever
//! seen.

use std::sync::Arc;

use dashmap::DashMap;

use crate::session::{PlaybackSession, SessionContext};
use crate::track::ChannelKey;

/// Owns every [`PlaybackSession`], keyed by channel.
pub struct SessionRegistry {
    sessions: DashMap<ChannelKey, Arc<PlaybackSession>>,
    ctx: SessionContext,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions share `ctx`.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            sessions: DashMap::new(),
            ctx,
        }
    }

    /// Returns the channel's session, creating an idle one on first use.
    pub fn get_or_create(&self, channel: &ChannelKey) -> Arc<PlaybackSession> {
        if let Some(existing) = self.sessions.get(channel) {
            return Arc::clone(existing.value());
        }
        let entry = self.sessions.entry(channel.clone()).or_insert_with(|| {
            log::debug!("[Registry] Creating session for {}", channel);
            PlaybackSession::new(channel.clone(), self.ctx.clone())
        });
        Arc::clone(entry.value())
    }

    /// Returns the channel's session if it exists.
    pub fn get(&self, channel: &ChannelKey) -> Option<Arc<PlaybackSession>> {
        self.sessions.get(channel).map(|s| Arc::clone(s.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns every known channel, sorted.
    pub fn channels(&self) -> Vec<ChannelKey> {
        let mut channels: Vec<ChannelKey> =
            self.sessions.iter().map(|e| e.key().clone()).collect();
        channels.sort();
        channels
    }

    /// Stops every session. Entries stay registered.
    pub async fn stop_all(&self) {
        // Collect first so no shard lock is held across an await.
        let sessions: Vec<Arc<PlaybackSession>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        log::info!("[Registry] Stopping {} session(s)", sessions.len());
        for session in sessions {
            session.stop().await;
        }
    }
}
