//! Lesson segment and media source model
//!
//! A segment is one lesson sub-unit: a script allocation, an optional
//! playable media source, an optional interaction, and the auto-progress
//! flag the progression engine branches on.

use crate::ids::SegmentId;
use serde::{Deserialize, Serialize};

/// Which playback backend serves a media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process player driven directly by the host
    Native,
    /// YouTube iframe embed controlled through its message dialect
    YouTube,
    /// Vimeo player embed controlled through its message dialect
    Vimeo,
}

impl BackendKind {
    /// Stable name used in logs and session metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::YouTube => "youtube",
            BackendKind::Vimeo => "vimeo",
        }
    }
}

/// Playable media attached to a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
    /// Backend that serves this media
    pub backend: BackendKind,
    /// Backend-specific media identifier (file path, provider video id)
    pub media_id: String,
    /// Duration from lesson metadata, if known ahead of load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint_secs: Option<f64>,
}

impl MediaSource {
    /// Create a media source for the given backend
    pub fn new(backend: BackendKind, media_id: impl Into<String>) -> Self {
        Self {
            backend,
            media_id: media_id.into(),
            duration_hint_secs: None,
        }
    }

    /// Attach a known duration from lesson metadata
    pub fn with_duration_hint(mut self, secs: f64) -> Self {
        self.duration_hint_secs = Some(secs);
        self
    }
}

/// One lesson sub-unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Segment identifier
    pub id: SegmentId,
    /// Nominal presentation time allocated to the script, in seconds
    pub script_duration_secs: f64,
    /// Advance automatically when the segment completes, instead of
    /// waiting for learner confirmation
    pub auto_progress: bool,
    /// Playable media, if the segment carries any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaSource>,
    /// Whether the segment embeds an interaction document
    #[serde(default)]
    pub has_interaction: bool,
}

impl Segment {
    /// Create a script-only segment
    pub fn scripted(script_duration_secs: f64, auto_progress: bool) -> Self {
        Self {
            id: SegmentId::new(),
            script_duration_secs,
            auto_progress,
            media: None,
            has_interaction: false,
        }
    }

    /// Attach media to the segment
    pub fn with_media(mut self, media: MediaSource) -> Self {
        self.media = Some(media);
        self
    }

    /// Mark the segment as carrying an interaction document
    pub fn with_interaction(mut self) -> Self {
        self.has_interaction = true;
        self
    }
}
