//! Server configuration.
//!
//! Loaded from an optional YAML file, then `CANTOR_*` environment overrides.
//! CLI flags are applied last in `main`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to. Zero scans the default range.
    /// Override: `CANTOR_BIND_PORT`
    pub bind_port: u16,

    /// Grace period before an idle channel is left, in milliseconds.
    /// Override: `CANTOR_IDLE_TIMEOUT_MS`
    pub idle_timeout_ms: u64,

    /// Relay pacing rate in bytes per second.
    /// Override: `CANTOR_RELAY_BYTES_PER_SECOND`
    pub relay_bytes_per_second: u64,

    /// Relay read size in bytes.
    pub relay_chunk_size: usize,

    /// Chunks buffered per relay listener before it lags.
    pub relay_channel_capacity: usize,

    /// Timeout for resolving a reference, in seconds.
    /// Override: `CANTOR_RESOLVE_TIMEOUT_SECS`
    pub resolve_timeout_secs: u64,

    /// Timeout for establishing outbound connections, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = cantor_core::Config::default();
        Self {
            bind_port: 49500,
            idle_timeout_ms: core.session.idle_timeout_ms,
            relay_bytes_per_second: core.relay.bytes_per_second,
            relay_chunk_size: core.relay.chunk_size,
            relay_channel_capacity: core.relay.channel_capacity,
            resolve_timeout_secs: core.resolver.request_timeout_secs,
            connect_timeout_secs: core.resolver.connect_timeout_secs,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up by variable name. Unparseable values are
    /// ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring {}: cannot parse '{}'", key, raw);
                    None
                }
            }
        }

        if let Some(port) = parse(&lookup, "CANTOR_BIND_PORT") {
            self.bind_port = port;
        }
        if let Some(ms) = parse(&lookup, "CANTOR_IDLE_TIMEOUT_MS") {
            self.idle_timeout_ms = ms;
        }
        if let Some(rate) = parse(&lookup, "CANTOR_RELAY_BYTES_PER_SECOND") {
            self.relay_bytes_per_second = rate;
        }
        if let Some(secs) = parse(&lookup, "CANTOR_RESOLVE_TIMEOUT_SECS") {
            self.resolve_timeout_secs = secs;
        }
    }

    /// Converts to cantor-core's Config type.
    pub fn to_core_config(&self) -> cantor_core::Config {
        let mut config = cantor_core::Config {
            preferred_port: self.bind_port,
            ..Default::default()
        };
        config.session.idle_timeout_ms = self.idle_timeout_ms;
        config.relay.bytes_per_second = self.relay_bytes_per_second;
        config.relay.chunk_size = self.relay_chunk_size;
        config.relay.channel_capacity = self.relay_channel_capacity;
        config.resolver.request_timeout_secs = self.resolve_timeout_secs;
        config.resolver.connect_timeout_secs = self.connect_timeout_secs;
        config
    }
}
