//! Snapshot of the one live playback session.

use lectern_core::{BackendKind, PlaybackSessionId};
use serde::{Deserialize, Serialize};

/// Point-in-time view of the active session, as the facade last observed
/// it. `current_time_seconds` is the most recent position report, not a
/// live read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    /// Identity of this session; changes on every segment switch.
    pub session_id: PlaybackSessionId,
    /// Backend driving the media.
    pub backend: BackendKind,
    /// Backend-scoped media identifier.
    pub media_id: String,
    /// Duration in seconds; `0.0` until the backend reports ready.
    pub duration_seconds: f64,
    /// Last observed playhead position in seconds.
    pub current_time_seconds: f64,
    /// Volume normalized to `0..1`.
    pub volume: f64,
    /// Whether the backend was playing at the last report.
    pub playing: bool,
    /// Whether the backend has reported ready.
    pub ready: bool,
}
