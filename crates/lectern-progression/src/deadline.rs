//! Pausable wait-time accounting for one segment.
//!
//! A [`Deadline`] never reads a clock itself; callers pass monotonic
//! readings in, which keeps every transition a pure function and lets
//! tests drive time by hand.

use std::time::Duration;

/// A wait budget that can be paused, resumed, and extended, but never
/// shortened.
///
/// Elapsed time accrues only while the deadline is running. Pausing
/// freezes the accrued amount; resuming continues from it. Extending
/// raises the budget to the larger of the current and requested values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    allocated: Duration,
    consumed: Duration,
    /// Clock reading at the last resume; `None` while paused.
    resumed_at: Option<Duration>,
}

impl Deadline {
    /// Start a running deadline with the given budget.
    pub fn allot(allocated: Duration, now: Duration) -> Self {
        Self {
            allocated,
            consumed: Duration::ZERO,
            resumed_at: Some(now),
        }
    }

    /// Raise the budget to `target` if larger; smaller targets are ignored.
    pub fn extend_to(&mut self, target: Duration) {
        self.allocated = self.allocated.max(target);
    }

    /// Freeze elapsed-time accrual. A no-op if already paused.
    pub fn pause(&mut self, now: Duration) {
        if let Some(resumed_at) = self.resumed_at.take() {
            self.consumed += now.saturating_sub(resumed_at);
        }
    }

    /// Continue accruing elapsed time. A no-op if already running.
    pub fn resume(&mut self, now: Duration) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(now);
        }
    }

    /// Whether accrual is currently frozen.
    pub fn is_paused(&self) -> bool {
        self.resumed_at.is_none()
    }

    /// Total budget.
    pub fn allocated(&self) -> Duration {
        self.allocated
    }

    /// Time accrued against the budget as of `now`.
    pub fn elapsed(&self, now: Duration) -> Duration {
        match self.resumed_at {
            Some(resumed_at) => self.consumed + now.saturating_sub(resumed_at),
            None => self.consumed,
        }
    }

    /// Budget left as of `now`; zero once expired.
    pub fn remaining(&self, now: Duration) -> Duration {
        self.allocated.saturating_sub(self.elapsed(now))
    }

    /// Whether the budget is used up as of `now`.
    pub fn is_expired(&self, now: Duration) -> bool {
        self.elapsed(now) >= self.allocated
    }
}
