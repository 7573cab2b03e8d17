//! Hand-driven time for deterministic tests.

use lectern_core::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A [`Clock`] that only moves when a test tells it to.
///
/// Starts at zero; [`advance`](ManualClock::advance) moves it forward by a
/// delta, [`set`](ManualClock::set) jumps to an absolute reading. Readings
/// never go backwards because `set` saturates at the current value.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// A clock frozen at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock frozen at the given reading.
    pub fn starting_at(origin: Duration) -> Self {
        let clock = Self::new();
        clock.set(origin);
        clock
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(duration_nanos(delta), Ordering::SeqCst);
    }

    /// Jump to an absolute reading. Ignored if it would move time backwards.
    pub fn set(&self, to: Duration) {
        self.nanos.fetch_max(duration_nanos(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
