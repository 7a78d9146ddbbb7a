//! Library configuration.
//!
//! [`Config`] groups the tunables for sessions, the relay transport and the
//! HTTP resolver. Every field has a default; the server binary layers YAML,
//! environment and CLI values on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for per-channel playback sessions.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Grace period before an idle, connected session disconnects
    /// (milliseconds).
    pub idle_timeout_ms: u64,
}

impl SessionConfig {
    /// Returns the idle grace period as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 1000,
        }
    }
}

/// Configuration for the relay transport.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    /// Capacity of each channel's broadcast buffer (chunks).
    pub channel_capacity: usize,

    /// Maximum size of one forwarded chunk (bytes).
    pub chunk_size: usize,

    /// Rate at which bytes are forwarded to listeners (bytes per second).
    /// `0` forwards as fast as the source delivers.
    pub bytes_per_second: u64,
}

impl RelayConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err(
                "channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            chunk_size: 4096,
            // 192 kbit/s
            bytes_per_second: 24_000,
        }
    }
}

/// Configuration for the HTTP resolver and relay fetches.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    /// Timeout for establishing a connection to a media host (seconds).
    pub connect_timeout_secs: u64,

    /// Timeout for a resolution request (seconds).
    pub request_timeout_secs: u64,
}

impl ResolverConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be >= 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 15,
        }
    }
}

/// Configuration for Cantor.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Session configuration.
    pub session: SessionConfig,

    /// Relay transport configuration.
    pub relay: RelayConfig,

    /// Resolver configuration.
    pub resolver: ResolverConfig,

    /// Capacity of the channel message broadcast.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), String> {
        self.relay.validate()?;
        self.resolver.validate()?;
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            session: SessionConfig::default(),
            relay: RelayConfig::default(),
            resolver: ResolverConfig::default(),
            event_channel_capacity: 100,
        }
    }
}
