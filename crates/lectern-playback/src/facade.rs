//! The single playback surface the rest of the system talks to.
//!
//! [`PlaybackService`] owns at most one live [`ActiveSession`] at a time.
//! Activating a new source always pauses and releases the previous backend
//! before the next one loads, so two backends never drive output
//! simultaneously.
//!
//! Control calls issued before the backend reports ready are never dropped:
//! they are queued FIFO with their responders and replayed exactly once when
//! readiness arrives, each caller receiving the real outcome. After the
//! session is ready, calls go straight to the adapter, serialized by the
//! session lock.
//!
//! For backends that do not push time updates, a poll task samples the
//! position at the configured cadence while playing and stops on pause,
//! end, or failure. A poll that would overlap a control call in flight is
//! skipped, never queued.

use crate::adapter::{build_adapter, AdapterEvent, EmbedConnector, PlayerAdapter};
use crate::session::PlaybackSession;
use lectern_core::{
    BackendKind, Clock, LecternError, MediaSource, PlaybackConfig, PlaybackSessionId, Result,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Normalized playback notifications, tagged with the session they belong
/// to so consumers can discard events from a superseded segment.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The backend is ready and reported its duration.
    SessionReady {
        session_id: PlaybackSessionId,
        duration: f64,
    },
    /// Playback started or resumed.
    Started { session_id: PlaybackSessionId },
    /// Playback paused.
    Paused { session_id: PlaybackSessionId },
    /// Fresh playhead position while playing.
    Tick {
        session_id: PlaybackSessionId,
        seconds: f64,
    },
    /// The media ran to its end.
    Ended { session_id: PlaybackSessionId },
    /// The backend failed; the session will not progress on its own.
    Failed {
        session_id: PlaybackSessionId,
        message: String,
    },
}

/// A control call waiting for the backend to become ready.
enum PendingCommand {
    Play,
    Pause,
    Seek(f64),
    SetVolume(f64),
    CurrentTime,
    Duration,
    IsPlaying,
}

enum CommandOutcome {
    Done,
    Started(bool),
    Seconds(f64),
    Flag(bool),
}

struct DeferredCommand {
    command: PendingCommand,
    responder: oneshot::Sender<Result<CommandOutcome>>,
}

struct ActiveSession {
    session_id: PlaybackSessionId,
    /// Monotonic activation counter; events carrying a stale epoch are
    /// discarded instead of mutating the replacement session.
    epoch: u64,
    backend: BackendKind,
    media_id: String,
    adapter: Arc<dyn PlayerAdapter>,
    ready: bool,
    duration: f64,
    volume: f64,
    playing: bool,
    last_known_time: f64,
    queued: VecDeque<DeferredCommand>,
    router: JoinHandle<()>,
    poller: Option<JoinHandle<()>>,
}

struct FacadeShared {
    clock: Arc<dyn Clock>,
    config: PlaybackConfig,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    active: Mutex<Option<ActiveSession>>,
    epochs: AtomicU64,
}

/// Unified playback control over whichever backend the current segment
/// needs.
pub struct PlaybackService {
    shared: Arc<FacadeShared>,
    connector: Arc<dyn EmbedConnector>,
}

impl PlaybackService {
    /// Create the service and the stream of normalized playback events.
    pub fn new(
        connector: Arc<dyn EmbedConnector>,
        clock: Arc<dyn Clock>,
        config: PlaybackConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let service = Self {
            shared: Arc::new(FacadeShared {
                clock,
                config,
                events,
                active: Mutex::new(None),
                epochs: AtomicU64::new(0),
            }),
            connector,
        };
        (service, event_rx)
    }

    /// Activate playback for a media source, replacing any previous session.
    ///
    /// The previous backend is paused and released to completion before the
    /// new one is constructed; its queued calls are cancelled.
    pub async fn activate(&self, source: &MediaSource) -> Result<PlaybackSessionId> {
        let mut active = self.shared.active.lock().await;
        if let Some(previous) = active.take() {
            teardown_session(previous).await;
        }

        let epoch = self.shared.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = PlaybackSessionId::new();
        let (adapter_events, adapter_event_rx) = mpsc::unbounded_channel();
        let adapter = build_adapter(
            source,
            self.connector.as_ref(),
            Arc::clone(&self.shared.clock),
            &self.shared.config,
            adapter_events,
        )
        .await?;

        let router = tokio::spawn(FacadeShared::route_adapter_events(
            Arc::clone(&self.shared),
            epoch,
            adapter_event_rx,
        ));

        if let Err(err) = adapter.load(source).await {
            router.abort();
            adapter.shutdown().await;
            return Err(err);
        }

        tracing::debug!(
            %session_id,
            backend = source.backend.as_str(),
            media_id = %source.media_id,
            "playback session activated"
        );
        *active = Some(ActiveSession {
            session_id,
            epoch,
            backend: source.backend,
            media_id: source.media_id.clone(),
            adapter,
            ready: false,
            duration: 0.0,
            volume: 1.0,
            playing: false,
            last_known_time: 0.0,
            queued: VecDeque::new(),
            router,
            poller: None,
        });
        Ok(session_id)
    }

    /// Pause and release the current session, if any.
    pub async fn deactivate(&self) {
        let mut active = self.shared.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::debug!(session_id = %previous.session_id, "playback session deactivated");
            teardown_session(previous).await;
        }
    }

    /// Start or resume playback. Returns whether playback actually started.
    pub async fn play(&self) -> Result<bool> {
        match self.command(PendingCommand::Play).await? {
            CommandOutcome::Started(started) => Ok(started),
            _ => Err(LecternError::internal("mismatched play outcome")),
        }
    }

    /// Pause playback.
    pub async fn pause(&self) -> Result<()> {
        self.command(PendingCommand::Pause).await.map(|_| ())
    }

    /// Move the playhead; the target is clamped to `[0, duration]`.
    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.command(PendingCommand::Seek(seconds)).await.map(|_| ())
    }

    /// Set volume; the value is clamped to `0..1` before the backend sees it.
    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        self.command(PendingCommand::SetVolume(volume))
            .await
            .map(|_| ())
    }

    /// Current playhead position in seconds.
    pub async fn current_time(&self) -> Result<f64> {
        match self.command(PendingCommand::CurrentTime).await? {
            CommandOutcome::Seconds(seconds) => Ok(seconds),
            _ => Err(LecternError::internal("mismatched position outcome")),
        }
    }

    /// Media duration in seconds.
    pub async fn duration(&self) -> Result<f64> {
        match self.command(PendingCommand::Duration).await? {
            CommandOutcome::Seconds(seconds) => Ok(seconds),
            _ => Err(LecternError::internal("mismatched duration outcome")),
        }
    }

    /// Whether the backend is currently playing.
    pub async fn is_playing(&self) -> Result<bool> {
        match self.command(PendingCommand::IsPlaying).await? {
            CommandOutcome::Flag(playing) => Ok(playing),
            _ => Err(LecternError::internal("mismatched playing outcome")),
        }
    }

    /// Snapshot of the active session, if one exists.
    pub async fn snapshot(&self) -> Option<PlaybackSession> {
        let active = self.shared.active.lock().await;
        active.as_ref().map(|session| PlaybackSession {
            session_id: session.session_id,
            backend: session.backend,
            media_id: session.media_id.clone(),
            duration_seconds: session.duration,
            current_time_seconds: session.last_known_time,
            volume: session.volume,
            playing: session.playing,
            ready: session.ready,
        })
    }

    /// Route one control call: straight to the adapter once ready, queued
    /// with a responder before that.
    async fn command(&self, command: PendingCommand) -> Result<CommandOutcome> {
        let mut active = self.shared.active.lock().await;
        let Some(session) = active.as_mut() else {
            return Err(LecternError::capability_unavailable(
                "no active playback session",
            ));
        };

        if !session.ready {
            let (responder, outcome) = oneshot::channel();
            session.queued.push_back(DeferredCommand { command, responder });
            tracing::debug!(
                session_id = %session.session_id,
                depth = session.queued.len(),
                "control call deferred until ready"
            );
            drop(active);
            return match outcome.await {
                Ok(result) => result,
                Err(_) => Err(LecternError::cancelled("playback session torn down")),
            };
        }

        execute_command(session, command).await
    }
}

impl std::fmt::Debug for PlaybackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackService")
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

impl FacadeShared {
    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    /// Translate adapter events into session state and normalized events.
    /// Runs once per session; the epoch filter drops anything that arrives
    /// after the session was replaced.
    async fn route_adapter_events(
        shared: Arc<FacadeShared>,
        epoch: u64,
        mut adapter_events: mpsc::UnboundedReceiver<AdapterEvent>,
    ) {
        while let Some(event) = adapter_events.recv().await {
            let mut active = shared.active.lock().await;
            let Some(session) = active.as_mut().filter(|s| s.epoch == epoch) else {
                tracing::debug!("adapter event from superseded session dropped");
                continue;
            };
            match event {
                AdapterEvent::Loaded { duration } => {
                    session.ready = true;
                    session.duration = duration;
                    shared.emit(PlaybackEvent::SessionReady {
                        session_id: session.session_id,
                        duration,
                    });
                    // Replay under the session lock: every deferred call runs
                    // exactly once, in issue order, before any new control
                    // call can slip in.
                    let deferred: Vec<DeferredCommand> = session.queued.drain(..).collect();
                    if !deferred.is_empty() {
                        tracing::debug!(
                            session_id = %session.session_id,
                            count = deferred.len(),
                            "replaying deferred control calls"
                        );
                    }
                    for entry in deferred {
                        let outcome = execute_command(session, entry.command).await;
                        let _ = entry.responder.send(outcome);
                    }
                }
                AdapterEvent::Play => {
                    session.playing = true;
                    Self::start_poller_if_needed(&shared, session);
                    shared.emit(PlaybackEvent::Started {
                        session_id: session.session_id,
                    });
                }
                AdapterEvent::Pause => {
                    session.playing = false;
                    stop_poller(session);
                    shared.emit(PlaybackEvent::Paused {
                        session_id: session.session_id,
                    });
                }
                AdapterEvent::Ended => {
                    session.playing = false;
                    session.last_known_time = session.duration;
                    stop_poller(session);
                    shared.emit(PlaybackEvent::Ended {
                        session_id: session.session_id,
                    });
                }
                AdapterEvent::TimeUpdate { seconds } => {
                    session.last_known_time = seconds;
                    shared.emit(PlaybackEvent::Tick {
                        session_id: session.session_id,
                        seconds,
                    });
                }
                AdapterEvent::Error { message } => {
                    session.playing = false;
                    stop_poller(session);
                    shared.emit(PlaybackEvent::Failed {
                        session_id: session.session_id,
                        message,
                    });
                }
            }
        }
    }

    fn start_poller_if_needed(shared: &Arc<FacadeShared>, session: &mut ActiveSession) {
        if session.adapter.drives_time_updates() || session.poller.is_some() {
            return;
        }
        let poller = tokio::spawn(Self::run_poller(
            Arc::clone(shared),
            session.epoch,
            Arc::clone(&session.adapter),
        ));
        session.poller = Some(poller);
    }

    /// Sample the position while playing. The query runs with the session
    /// lock released so control calls are never starved; the result is only
    /// applied if the same session is still live. A wakeup that finds the
    /// session busy skips its poll instead of queueing behind it.
    async fn run_poller(
        shared: Arc<FacadeShared>,
        epoch: u64,
        adapter: Arc<dyn PlayerAdapter>,
    ) {
        loop {
            tokio::time::sleep(shared.config.poll_interval).await;
            {
                let Ok(active) = shared.active.try_lock() else {
                    continue;
                };
                let live = active
                    .as_ref()
                    .is_some_and(|s| s.epoch == epoch && s.playing);
                if !live {
                    break;
                }
            }

            match adapter.current_time().await {
                Ok(seconds) => {
                    let mut active = shared.active.lock().await;
                    let Some(session) = active.as_mut().filter(|s| s.epoch == epoch) else {
                        break;
                    };
                    if !session.playing {
                        continue;
                    }
                    session.last_known_time = seconds;
                    shared.emit(PlaybackEvent::Tick {
                        session_id: session.session_id,
                        seconds,
                    });
                }
                Err(err) => tracing::debug!(error = %err, "position poll failed"),
            }
        }
    }
}

async fn execute_command(
    session: &mut ActiveSession,
    command: PendingCommand,
) -> Result<CommandOutcome> {
    match command {
        PendingCommand::Play => session.adapter.play().await.map(CommandOutcome::Started),
        PendingCommand::Pause => session.adapter.pause().await.map(|()| CommandOutcome::Done),
        PendingCommand::Seek(seconds) => {
            let clamped = seconds.clamp(0.0, session.duration);
            session.adapter.seek(clamped).await?;
            session.last_known_time = clamped;
            Ok(CommandOutcome::Done)
        }
        PendingCommand::SetVolume(volume) => {
            let clamped = volume.clamp(0.0, 1.0);
            session.adapter.set_volume(clamped).await?;
            session.volume = clamped;
            Ok(CommandOutcome::Done)
        }
        PendingCommand::CurrentTime => {
            let seconds = session.adapter.current_time().await?;
            session.last_known_time = seconds;
            Ok(CommandOutcome::Seconds(seconds))
        }
        PendingCommand::Duration => session.adapter.duration().await.map(CommandOutcome::Seconds),
        PendingCommand::IsPlaying => session.adapter.is_playing().await.map(CommandOutcome::Flag),
    }
}

/// Pause first so no two backends ever drive output at once, then release
/// the adapter and cancel whatever was still queued.
async fn teardown_session(mut session: ActiveSession) {
    stop_poller(&mut session);
    if let Err(err) = session.adapter.pause().await {
        tracing::debug!(error = %err, "pause during teardown failed");
    }
    session.adapter.shutdown().await;
    session.router.abort();
    for deferred in session.queued.drain(..) {
        let _ = deferred
            .responder
            .send(Err(LecternError::cancelled("playback session replaced")));
    }
}

fn stop_poller(session: &mut ActiveSession) {
    if let Some(poller) = session.poller.take() {
        poller.abort();
    }
}
