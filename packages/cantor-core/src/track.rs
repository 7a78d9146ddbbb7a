//! Track and identity value types.
//!
//! A [`Track`] is the unit of playback: a resolved source reference, the
//! title shown to users, and the identity of whoever asked for it. Tracks
//! are immutable once built; sessions clone them freely.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key identifying one logical channel (one playback stream per key).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ChannelKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Display identity of the user who requested a track.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Requester(String);

impl Requester {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved, playable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Reference the transport plays from (usually a direct media URL).
    source: String,
    title: String,
    requester: Requester,
}

impl Track {
    #[must_use]
    pub fn new(source: impl Into<String>, title: impl Into<String>, requester: Requester) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            requester,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (requested by {})", self.title, self.requester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_key_serializes_as_plain_string() {
        let key = ChannelKey::new("guild-42");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"guild-42\"");
    }

    #[test]
    fn track_serializes_to_camel_case() {
        let track = Track::new("http://host/a.mp3", "A", Requester::new("alice"));
        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["source"], "http://host/a.mp3");
        assert_eq!(json["title"], "A");
        assert_eq!(json["requester"], "alice");
    }

    #[test]
    fn track_display_includes_requester() {
        let track = Track::new("src", "Song", Requester::new("bob"));
        assert_eq!(track.to_string(), "Song (requested by bob)");
    }
}
