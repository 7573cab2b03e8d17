//! In-process native playback backend.
//!
//! The native backend owns no external embed; it advances a playhead against
//! the injected clock and reports its own time updates, which is why the
//! facade never polls it. Duration comes from the source's metadata hint,
//! the same way a media element learns it from loaded metadata.

use crate::adapter::{AdapterEvent, PlayerAdapter};
use async_trait::async_trait;
use lectern_core::{BackendKind, Clock, LecternError, MediaSource, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct NativeState {
    loaded: bool,
    duration: f64,
    /// Position accumulated up to the last play/pause/seek transition.
    base: f64,
    /// Clock reading when playback last started; `Some` exactly while playing.
    playing_since: Option<Duration>,
    ended: bool,
    volume: f64,
    shutdown: bool,
}

impl NativeState {
    fn position(&self, now: Duration) -> f64 {
        let position = match self.playing_since {
            Some(started) => self.base + now.saturating_sub(started).as_secs_f64(),
            None => self.base,
        };
        position.min(self.duration)
    }
}

/// Clock-driven native player.
#[derive(Debug)]
pub struct NativeAdapter {
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    events: mpsc::UnboundedSender<AdapterEvent>,
    state: Arc<Mutex<NativeState>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl NativeAdapter {
    /// Create an idle player; media arrives with `load`.
    pub fn new(
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) -> Self {
        Self {
            clock,
            tick_interval,
            events,
            state: Arc::new(Mutex::new(NativeState::default())),
            ticker: Mutex::new(None),
        }
    }

    fn emit(&self, event: AdapterEvent) {
        let _ = self.events.send(event);
    }

    /// Periodically report the playhead and catch the end of the media.
    /// Runs for the life of the adapter; play state is checked per tick.
    async fn run_ticker(
        state: Arc<Mutex<NativeState>>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) {
        loop {
            tokio::time::sleep(tick_interval).await;
            let (position, finished) = {
                let mut state = state.lock().await;
                if state.shutdown {
                    break;
                }
                if state.playing_since.is_none() {
                    continue;
                }
                let position = state.position(clock.now());
                if position >= state.duration {
                    // One Ended per run of the media; the playhead stays at
                    // the end until a play or seek rewinds it.
                    state.base = state.duration;
                    state.playing_since = None;
                    state.ended = true;
                    (state.duration, true)
                } else {
                    (position, false)
                }
            };
            let _ = events.send(AdapterEvent::TimeUpdate { seconds: position });
            if finished {
                let _ = events.send(AdapterEvent::Ended);
            }
        }
    }
}

#[async_trait]
impl PlayerAdapter for NativeAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Native
    }

    fn drives_time_updates(&self) -> bool {
        true
    }

    async fn load(&self, source: &MediaSource) -> Result<()> {
        let duration = source
            .duration_hint_secs
            .filter(|d| *d > 0.0)
            .ok_or_else(|| {
                LecternError::backend("native source carries no duration metadata")
            })?;

        {
            let mut state = self.state.lock().await;
            state.loaded = true;
            state.duration = duration;
            state.base = 0.0;
            state.playing_since = None;
            state.ended = false;
        }

        let ticker = tokio::spawn(Self::run_ticker(
            Arc::clone(&self.state),
            Arc::clone(&self.clock),
            self.tick_interval,
            self.events.clone(),
        ));
        *self.ticker.lock().await = Some(ticker);

        self.emit(AdapterEvent::Loaded { duration });
        Ok(())
    }

    async fn play(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            return Err(LecternError::backend("native player has no media loaded"));
        }
        if state.playing_since.is_some() {
            return Ok(true);
        }
        // Playing again after the end restarts from the beginning, matching
        // media element behavior.
        if state.ended {
            state.base = 0.0;
            state.ended = false;
        }
        state.playing_since = Some(self.clock.now());
        drop(state);
        self.emit(AdapterEvent::Play);
        Ok(true)
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.playing_since.is_none() {
            return Ok(());
        }
        state.base = state.position(self.clock.now());
        state.playing_since = None;
        drop(state);
        self.emit(AdapterEvent::Pause);
        Ok(())
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        let position = {
            let mut state = self.state.lock().await;
            if !state.loaded {
                return Err(LecternError::backend("native player has no media loaded"));
            }
            let target = seconds.clamp(0.0, state.duration);
            if target < state.duration {
                state.ended = false;
            }
            state.base = target;
            if state.playing_since.is_some() {
                state.playing_since = Some(self.clock.now());
            }
            target
        };
        self.emit(AdapterEvent::TimeUpdate { seconds: position });
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.state.lock().await.volume = volume;
        Ok(())
    }

    async fn current_time(&self) -> Result<f64> {
        let state = self.state.lock().await;
        Ok(state.position(self.clock.now()))
    }

    async fn duration(&self) -> Result<f64> {
        Ok(self.state.lock().await.duration)
    }

    async fn is_playing(&self) -> Result<bool> {
        Ok(self.state.lock().await.playing_since.is_some())
    }

    async fn shutdown(&self) {
        self.state.lock().await.shutdown = true;
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_testkit::ManualClock;

    fn harness() -> (
        NativeAdapter,
        Arc<ManualClock>,
        mpsc::UnboundedReceiver<AdapterEvent>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let (events, event_rx) = mpsc::unbounded_channel();
        let adapter = NativeAdapter::new(
            Arc::clone(&clock) as Arc<dyn Clock>,
            Duration::from_millis(10),
            events,
        );
        (adapter, clock, event_rx)
    }

    fn source(duration: f64) -> MediaSource {
        MediaSource::new(BackendKind::Native, "intro-take-3").with_duration_hint(duration)
    }

    fn close_to(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-9
    }

    #[tokio::test]
    async fn load_requires_duration_metadata() {
        let (adapter, _clock, _events) = harness();
        let bare = MediaSource::new(BackendKind::Native, "no-metadata");
        let err = adapter.load(&bare).await.unwrap_err();
        assert!(err.is_backend(), "expected backend error, got {err}");
    }

    #[tokio::test]
    async fn position_follows_the_clock_only_while_playing() {
        let (adapter, clock, _events) = harness();
        adapter.load(&source(10.0)).await.expect("load");

        assert!(adapter.play().await.expect("play"));
        clock.advance(Duration::from_secs(3));
        assert!(close_to(adapter.current_time().await.expect("time"), 3.0));

        adapter.pause().await.expect("pause");
        clock.advance(Duration::from_secs(5));
        assert!(close_to(adapter.current_time().await.expect("time"), 3.0));
        assert!(!adapter.is_playing().await.expect("is_playing"));

        assert!(adapter.play().await.expect("play"));
        clock.advance(Duration::from_secs(2));
        assert!(close_to(adapter.current_time().await.expect("time"), 5.0));

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn seek_moves_the_playhead() {
        let (adapter, clock, _events) = harness();
        adapter.load(&source(20.0)).await.expect("load");

        adapter.seek(7.5).await.expect("seek");
        assert!(close_to(adapter.current_time().await.expect("time"), 7.5));

        // Seeking while playing restarts the elapsed measurement.
        adapter.play().await.expect("play");
        clock.advance(Duration::from_secs(1));
        adapter.seek(2.0).await.expect("seek");
        clock.advance(Duration::from_secs(1));
        assert!(close_to(adapter.current_time().await.expect("time"), 3.0));

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn running_past_the_end_emits_ended_once() {
        let (adapter, clock, mut events) = harness();
        adapter.load(&source(2.0)).await.expect("load");
        adapter.play().await.expect("play");

        clock.advance(Duration::from_secs(5));
        // Give the ticker a few wall-clock intervals to notice.
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!adapter.is_playing().await.expect("is_playing"));
        assert!(close_to(adapter.current_time().await.expect("time"), 2.0));

        let mut ended = 0;
        while let Ok(event) = events.try_recv() {
            if event == AdapterEvent::Ended {
                ended += 1;
            }
        }
        assert_eq!(ended, 1, "expected exactly one ended event");

        // Idle time after the end must not produce another one.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());

        adapter.shutdown().await;
    }

    #[tokio::test]
    async fn play_after_the_end_restarts_from_zero() {
        let (adapter, clock, _events) = harness();
        adapter.load(&source(2.0)).await.expect("load");
        adapter.play().await.expect("play");

        clock.advance(Duration::from_secs(3));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(close_to(adapter.current_time().await.expect("time"), 2.0));

        assert!(adapter.play().await.expect("play"));
        assert!(close_to(adapter.current_time().await.expect("time"), 0.0));
        clock.advance(Duration::from_secs(1));
        assert!(close_to(adapter.current_time().await.expect("time"), 1.0));

        adapter.shutdown().await;
    }
}
