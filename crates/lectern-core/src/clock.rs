//! Monotonic clock seam
//!
//! Every time-dependent component (playback position, progression
//! deadlines) reads elapsed time through this trait instead of touching
//! `Instant` directly, so tests can drive time by hand. The trait stays
//! deliberately minimal: one monotonic reading, expressed as the duration
//! since the clock's origin.

use std::fmt;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: fmt::Debug + Send + Sync {
    /// Time elapsed since the clock's origin. Never decreases.
    fn now(&self) -> Duration;
}

/// Wall-clock backed monotonic clock
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the moment of construction
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
