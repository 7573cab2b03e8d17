//! The segment advancement state machine.
//!
//! One segment is active at a time. Activation allots a [`Deadline`] of
//! `max(minimum floor, script allocation)`, extended once a playback
//! backend reports a longer content duration. The segment finishes when
//! the deadline expires or the content reports completion first, whichever
//! comes first; the auto-progress flag then decides between advancing
//! outright and holding for learner confirmation.
//!
//! Playback failures finish the segment the same way natural completion
//! does. A broken video must not hold the lesson hostage.

use crate::deadline::Deadline;
use lectern_core::{Clock, ProgressionConfig, Segment, SegmentId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where the engine stands for the current segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressionPhase {
    /// No segment active.
    Idle,
    /// A segment is active and its deadline may be running.
    Playing,
    /// The segment finished and the lesson moves on by itself.
    EndedAutoAdvancing,
    /// The segment finished; a confirmation gesture is required to move on.
    EndedAwaitingConfirmation,
}

/// Decisions the engine hands to whoever sequences segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressionEvent {
    /// Move to the next segment.
    Advance {
        /// The segment that finished.
        segment_id: SegmentId,
    },
    /// Hold and surface a continue control to the learner.
    AwaitConfirmation {
        /// The segment that finished.
        segment_id: SegmentId,
    },
}

#[derive(Debug)]
struct ActiveSegment {
    segment_id: SegmentId,
    auto_progress: bool,
    /// Media or an interaction still owns the wait; a script dismissal
    /// alone does not finish such a segment.
    waits_for_content: bool,
    deadline: Deadline,
}

#[derive(Debug)]
struct EngineState {
    phase: ProgressionPhase,
    segment: Option<ActiveSegment>,
}

#[derive(Debug)]
struct EngineShared {
    clock: Arc<dyn Clock>,
    config: ProgressionConfig,
    events: mpsc::UnboundedSender<ProgressionEvent>,
    state: Mutex<EngineState>,
}

/// Drives segment completion decisions from deadlines and content signals.
#[derive(Debug)]
pub struct ProgressionEngine {
    shared: Arc<EngineShared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressionEngine {
    /// Create the engine and the stream of advancement decisions.
    pub fn new(
        clock: Arc<dyn Clock>,
        config: ProgressionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(EngineShared {
            clock,
            config,
            events,
            state: Mutex::new(EngineState {
                phase: ProgressionPhase::Idle,
                segment: None,
            }),
        });
        let sweeper = tokio::spawn(EngineShared::run_sweeper(Arc::clone(&shared)));
        (
            Self {
                shared,
                sweeper: Mutex::new(Some(sweeper)),
            },
            event_rx,
        )
    }

    /// Activate a segment: allot its deadline and start waiting.
    ///
    /// The budget is the larger of the configured floor and the script
    /// allocation; a media duration hint raises it further right away.
    pub fn begin_segment(&self, segment: &Segment) {
        let now = self.shared.clock.now();
        let script = secs_to_duration(segment.script_duration_secs);
        let allocated = self.shared.config.minimum_floor.max(script);
        let mut deadline = Deadline::allot(allocated, now);
        if let Some(hint) = segment.media.as_ref().and_then(|media| media.duration_hint_secs) {
            deadline.extend_to(secs_to_duration(hint));
        }

        let mut state = self.shared.lock_state();
        tracing::debug!(
            segment_id = %segment.id,
            allocated_ms = deadline.allocated().as_millis(),
            auto_progress = segment.auto_progress,
            "segment activated"
        );
        state.segment = Some(ActiveSegment {
            segment_id: segment.id,
            auto_progress: segment.auto_progress,
            waits_for_content: segment.media.is_some() || segment.has_interaction,
            deadline,
        });
        state.phase = ProgressionPhase::Playing;
    }

    /// A backend reported the real content duration; never shrinks the wait.
    pub fn content_duration_known(&self, duration_secs: f64) {
        let mut state = self.shared.lock_state();
        if state.phase != ProgressionPhase::Playing {
            return;
        }
        if let Some(segment) = state.segment.as_mut() {
            segment.deadline.extend_to(secs_to_duration(duration_secs));
            tracing::debug!(
                segment_id = %segment.segment_id,
                allocated_ms = segment.deadline.allocated().as_millis(),
                "wait extended to content duration"
            );
        }
    }

    /// Content reported completion: media ended, an interaction marked
    /// itself complete, or playback failed beyond recovery. Finishes the
    /// segment without waiting out the deadline.
    pub fn content_finished(&self) {
        let mut state = self.shared.lock_state();
        if state.phase == ProgressionPhase::Playing {
            self.shared.finish_segment(&mut state);
        }
    }

    /// The learner paused playback; elapsed wait time freezes with it.
    pub fn playback_paused(&self) {
        let now = self.shared.clock.now();
        let mut state = self.shared.lock_state();
        if state.phase != ProgressionPhase::Playing {
            return;
        }
        if let Some(segment) = state.segment.as_mut() {
            segment.deadline.pause(now);
        }
    }

    /// Playback resumed; the remaining wait picks up where it left off.
    pub fn playback_resumed(&self) {
        let now = self.shared.clock.now();
        let mut state = self.shared.lock_state();
        if state.phase != ProgressionPhase::Playing {
            return;
        }
        if let Some(segment) = state.segment.as_mut() {
            segment.deadline.resume(now);
        }
    }

    /// The learner dismissed the script. For a segment with no media and
    /// no interaction there is nothing left to wait for, so the lesson
    /// advances immediately, deadline notwithstanding.
    pub fn script_dismissed(&self) {
        let mut state = self.shared.lock_state();
        if state.phase != ProgressionPhase::Playing {
            return;
        }
        let Some(segment) = state.segment.as_ref() else {
            return;
        };
        if segment.waits_for_content {
            return;
        }
        let segment_id = segment.segment_id;
        state.phase = ProgressionPhase::EndedAutoAdvancing;
        tracing::debug!(%segment_id, "script dismissed, advancing");
        let _ = self
            .shared
            .events
            .send(ProgressionEvent::Advance { segment_id });
    }

    /// The learner's continue gesture. Only meaningful while awaiting
    /// confirmation; repeated invocations are no-ops.
    pub fn confirm(&self) {
        let mut state = self.shared.lock_state();
        if state.phase != ProgressionPhase::EndedAwaitingConfirmation {
            return;
        }
        let Some(segment) = state.segment.take() else {
            return;
        };
        state.phase = ProgressionPhase::Idle;
        tracing::debug!(segment_id = %segment.segment_id, "advancement confirmed");
        let _ = self.shared.events.send(ProgressionEvent::Advance {
            segment_id: segment.segment_id,
        });
    }

    /// Current phase.
    pub fn phase(&self) -> ProgressionPhase {
        self.shared.lock_state().phase
    }

    /// Wait left for the active segment, if one is playing.
    pub fn remaining_wait(&self) -> Option<Duration> {
        let now = self.shared.clock.now();
        let state = self.shared.lock_state();
        if state.phase != ProgressionPhase::Playing {
            return None;
        }
        state
            .segment
            .as_ref()
            .map(|segment| segment.deadline.remaining(now))
    }

    /// Stop the deadline sweeper. Idempotent.
    pub fn close(&self) {
        if let Some(sweeper) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.abort();
        }
    }
}

impl Drop for ProgressionEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl EngineShared {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_sweeper(shared: Arc<EngineShared>) {
        loop {
            tokio::time::sleep(shared.config.sweep_interval).await;
            shared.sweep();
        }
    }

    fn sweep(&self) {
        let mut state = self.lock_state();
        if state.phase != ProgressionPhase::Playing {
            return;
        }
        let now = self.clock.now();
        let expired = state
            .segment
            .as_ref()
            .is_some_and(|segment| segment.deadline.is_expired(now));
        if expired {
            self.finish_segment(&mut state);
        }
    }

    fn finish_segment(&self, state: &mut EngineState) {
        let Some(segment) = state.segment.as_ref() else {
            return;
        };
        let segment_id = segment.segment_id;
        if segment.auto_progress {
            state.phase = ProgressionPhase::EndedAutoAdvancing;
            tracing::debug!(%segment_id, "segment finished, advancing");
            let _ = self.events.send(ProgressionEvent::Advance { segment_id });
        } else {
            state.phase = ProgressionPhase::EndedAwaitingConfirmation;
            tracing::debug!(%segment_id, "segment finished, awaiting confirmation");
            let _ = self
                .events
                .send(ProgressionEvent::AwaitConfirmation { segment_id });
        }
    }
}

/// Seconds from content metadata are untrusted; anything non-finite or
/// non-positive becomes a zero duration.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_core::{BackendKind, MediaSource};
    use lectern_testkit::ManualClock;

    fn test_config() -> ProgressionConfig {
        ProgressionConfig {
            minimum_floor: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(10),
        }
    }

    fn engine() -> (
        ProgressionEngine,
        Arc<ManualClock>,
        mpsc::UnboundedReceiver<ProgressionEvent>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let (engine, events) =
            ProgressionEngine::new(Arc::clone(&clock) as Arc<dyn Clock>, test_config());
        (engine, clock, events)
    }

    async fn next_event(
        events: &mut mpsc::UnboundedReceiver<ProgressionEvent>,
    ) -> ProgressionEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event within deadline")
            .expect("event stream open")
    }

    async fn assert_silent(events: &mut mpsc::UnboundedReceiver<ProgressionEvent>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err(), "engine moved too early");
    }

    #[tokio::test]
    async fn script_only_segment_auto_advances_when_its_time_elapses() {
        let (engine, clock, mut events) = engine();
        let segment = Segment::scripted(10.0, true);
        engine.begin_segment(&segment);
        assert_eq!(engine.phase(), ProgressionPhase::Playing);

        clock.advance(Duration::from_millis(9_900));
        assert_silent(&mut events).await;

        clock.advance(Duration::from_millis(100));
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::Advance {
                segment_id: segment.id
            }
        );
        assert_eq!(engine.phase(), ProgressionPhase::EndedAutoAdvancing);
    }

    #[tokio::test]
    async fn media_duration_extends_the_wait_and_confirmation_gates_advance() {
        let (engine, clock, mut events) = engine();
        let segment = Segment::scripted(10.0, false)
            .with_media(MediaSource::new(BackendKind::Vimeo, "90210"));
        engine.begin_segment(&segment);
        engine.content_duration_known(45.0);

        clock.advance(Duration::from_secs(10));
        assert_silent(&mut events).await;

        clock.advance(Duration::from_secs(35));
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::AwaitConfirmation {
                segment_id: segment.id
            }
        );
        assert_eq!(engine.phase(), ProgressionPhase::EndedAwaitingConfirmation);

        // Time passing changes nothing while confirmation is pending.
        clock.advance(Duration::from_secs(600));
        assert_silent(&mut events).await;

        engine.confirm();
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::Advance {
                segment_id: segment.id
            }
        );
        assert_eq!(engine.phase(), ProgressionPhase::Idle);

        // Repeated confirmation is a no-op.
        engine.confirm();
        assert_silent(&mut events).await;
    }

    #[tokio::test]
    async fn pausing_freezes_the_remaining_wait() {
        let (engine, clock, mut events) = engine();
        let segment = Segment::scripted(10.0, true);
        engine.begin_segment(&segment);

        clock.advance(Duration::from_secs(6));
        engine.playback_paused();

        clock.advance(Duration::from_secs(300));
        assert_silent(&mut events).await;
        assert_eq!(engine.remaining_wait(), Some(Duration::from_secs(4)));

        engine.playback_resumed();
        clock.advance(Duration::from_millis(3_900));
        assert_silent(&mut events).await;

        clock.advance(Duration::from_millis(100));
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::Advance {
                segment_id: segment.id
            }
        );
    }

    #[tokio::test]
    async fn content_finishing_early_beats_the_deadline() {
        let (engine, clock, mut events) = engine();
        let segment = Segment::scripted(30.0, true);
        engine.begin_segment(&segment);

        clock.advance(Duration::from_secs(2));
        engine.content_finished();
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::Advance {
                segment_id: segment.id
            }
        );

        // The sweeper must not finish the segment a second time.
        clock.advance(Duration::from_secs(60));
        assert_silent(&mut events).await;
    }

    #[tokio::test]
    async fn short_scripts_still_wait_the_floor() {
        let (engine, clock, mut events) = engine();
        let segment = Segment::scripted(2.0, true);
        engine.begin_segment(&segment);

        clock.advance(Duration::from_millis(2_100));
        assert_silent(&mut events).await;

        clock.advance(Duration::from_millis(2_900));
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::Advance {
                segment_id: segment.id
            }
        );
    }

    #[tokio::test]
    async fn dismissing_the_script_advances_only_content_free_segments() {
        let (engine, _clock, mut events) = engine();

        let with_media = Segment::scripted(10.0, false)
            .with_media(MediaSource::new(BackendKind::Native, "clip.mp4"));
        engine.begin_segment(&with_media);
        engine.script_dismissed();
        assert_silent(&mut events).await;
        assert_eq!(engine.phase(), ProgressionPhase::Playing);

        let script_only = Segment::scripted(10.0, false);
        engine.begin_segment(&script_only);
        engine.script_dismissed();
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::Advance {
                segment_id: script_only.id
            }
        );
    }

    #[tokio::test]
    async fn stale_signals_after_finish_are_ignored() {
        let (engine, clock, mut events) = engine();
        let segment = Segment::scripted(5.0, false);
        engine.begin_segment(&segment);

        clock.advance(Duration::from_secs(5));
        assert_eq!(
            next_event(&mut events).await,
            ProgressionEvent::AwaitConfirmation {
                segment_id: segment.id
            }
        );

        engine.content_finished();
        engine.playback_paused();
        engine.content_duration_known(90.0);
        assert_silent(&mut events).await;
        assert_eq!(engine.phase(), ProgressionPhase::EndedAwaitingConfirmation);
    }
}
