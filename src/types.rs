//! Core types for the dispatcher.

use crate::error::{PubSubError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between channel segments.
pub const SEGMENT_SEPARATOR: char = '.';

/// A non-empty channel name split into its segments.
///
/// `"a.b.c"` and `["a", "b", "c"]` describe the same channel. Segments
/// themselves may be empty (`"a..b"`); such a segment is an ordinary trie
/// key. The manager scope (the empty string) is not a `ChannelPath`; it is
/// handled by the dispatcher directly.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelPath {
    raw: String,
    segments: Vec<String>,
}

impl ChannelPath {
    /// Parse a dot-separated channel name.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(PubSubError::InvalidPath(
                "path must be a non-empty string or segment list".to_string(),
            ));
        }
        let segments = raw.split(SEGMENT_SEPARATOR).map(str::to_string).collect();
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Build a path from pre-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let raw = segments.join(".");
        if segments.is_empty() {
            return Err(PubSubError::InvalidPath(
                "path must be a non-empty string or segment list".to_string(),
            ));
        }
        Ok(Self { raw, segments })
    }

    /// The dot-joined channel name.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Debug for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelPath({})", self.raw)
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Conversion into a validated [`ChannelPath`].
///
/// Implemented for strings (split on `.`) and for segment lists, so callers
/// can build channels programmatically without joining and re-splitting.
pub trait IntoChannelPath {
    fn into_channel_path(self) -> Result<ChannelPath>;
}

impl IntoChannelPath for ChannelPath {
    fn into_channel_path(self) -> Result<ChannelPath> {
        Ok(self)
    }
}

impl IntoChannelPath for &ChannelPath {
    fn into_channel_path(self) -> Result<ChannelPath> {
        Ok(self.clone())
    }
}

impl IntoChannelPath for &str {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::parse(self)
    }
}

impl IntoChannelPath for String {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::parse(&self)
    }
}

impl IntoChannelPath for &String {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::parse(self)
    }
}

impl IntoChannelPath for Vec<String> {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::from_segments(self)
    }
}

impl IntoChannelPath for Vec<&str> {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::from_segments(self)
    }
}

impl IntoChannelPath for &[&str] {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::from_segments(self.iter().copied())
    }
}

impl<const N: usize> IntoChannelPath for [&str; N] {
    fn into_channel_path(self) -> Result<ChannelPath> {
        ChannelPath::from_segments(self)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// An event as seen by handlers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Payload.
    pub data: serde_json::Value,
    /// Channel the event was published on (not the subscription's path).
    pub path: ChannelPath,
    pub event_id: String,
    /// Set when the id was generated locally, or when supplied by the publisher.
    pub event_date: Option<Timestamp>,
    pub source: Option<String>,
    /// Recipient this event was addressed to, if any.
    pub target: Option<String>,
}
