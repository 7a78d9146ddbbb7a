//! Cantor Core - per-channel playback sessions.
//!
//! Each channel (a voice room, a speaker group, anything with a key) owns one
//! [`PlaybackSession`]: a FIFO queue of resolved tracks, an optional loop of
//! the current track, and a lifecycle that connects to the channel when there
//! is something to play and leaves after a short idle grace period.
//!
//! # Architecture
//!
//! - [`track`] and [`queue`]: value types and the per-session queue
//! - [`session`]: the playback state machine
//! - [`registry`]: one session per channel key
//! - [`service`]: command entry points (enqueue, stop, loop, status)
//! - [`resolver`], [`relay`], [`notifier`]: default adapters
//! - [`api`]: HTTP endpoints and server startup
//! - [`bootstrap`]: wiring for the standalone server
//!
//! # Abstraction Traits
//!
//! - [`Resolver`](resolver::Resolver): turns a user reference into a [`Track`]
//! - [`Transport`](transport::Transport): connects to a channel and streams tracks
//! - [`Notifier`](notifier::Notifier): delivers user-visible channel messages
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod notifier;
pub mod queue;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod runtime;
pub mod service;
pub mod session;
pub mod track;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::{Config, RelayConfig, ResolverConfig, SessionConfig};
pub use error::{CantorError, CantorResult, ErrorCode};
pub use notifier::{BroadcastNotifier, ChannelMessage, LoggingNotifier, Notifier, NoopNotifier};
pub use queue::TrackQueue;
pub use registry::SessionRegistry;
pub use relay::{RelayChannel, RelayTransport};
pub use resolver::{HttpResolver, ResolveError, Resolver};
pub use runtime::{BoxedTask, TaskSpawner, TokioSpawner};
pub use service::{EnqueueError, EnqueueRequest, EnqueueResponse, PlaybackService};
pub use session::{
    LoopStatus, PlaybackSession, SessionContext, SessionError, SessionSnapshot, SessionState,
};
pub use track::{ChannelKey, Requester, Track};
pub use transport::{Completion, Transport, TransportError, TransportHandle};
pub use utils::now_millis;

pub use api::{start_server, AppState, ServerError};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
