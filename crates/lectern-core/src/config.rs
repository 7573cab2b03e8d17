//! Configuration for the channel, playback, and progression layers
//!
//! Plain structs with conservative defaults. Anything a test needs to speed
//! up (intervals, timeouts) is a field here rather than a constant buried
//! in a component.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Correlation channel tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Default deadline for `call`; per-call overrides take precedence
    pub call_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            // Generous: embedded content may still be booting its runtime
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Playback facade tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Position poll cadence for backends that do not push time updates,
    /// applied only while playing
    pub poll_interval: Duration,
    /// Time-update cadence of the native in-process backend
    pub native_tick_interval: Duration,
    /// Deadline for one request/reply exchange with a provider embed
    pub provider_query_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            // 4 Hz keeps subtitle/progress displays smooth without flooding
            // the embed bridge
            poll_interval: Duration::from_millis(250),
            native_tick_interval: Duration::from_millis(250),
            provider_query_timeout: Duration::from_secs(5),
        }
    }
}

/// Progression engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Minimum wait per segment regardless of script allocation
    pub minimum_floor: Duration,
    /// How often the engine checks the deadline against the clock
    pub sweep_interval: Duration,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            minimum_floor: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(100),
        }
    }
}

/// Aggregate configuration for a lesson runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessonRuntimeConfig {
    /// Correlation channel tuning
    pub channel: ChannelConfig,
    /// Playback facade tuning
    pub playback: PlaybackConfig,
    /// Progression engine tuning
    pub progression: ProgressionConfig,
}
