//! The lesson runtime: one object owning a session end to end.
//!
//! [`LessonRuntime::start`] binds the correlation channel over the content
//! port, wires every request handler, and starts the pump that feeds
//! playback state into the progression engine. From then on three event
//! flows run concurrently:
//!
//! - content requests arrive over the channel and are answered by the
//!   registered handlers,
//! - playback events update the engine and are echoed to content
//!   subscribers on [`PLAYBACK_TOPIC`],
//! - progression decisions stream out of the receiver returned from
//!   `start` for the embedding application to act on.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lectern_channel::{CorrelationChannel, MessagePort};
use lectern_core::payload::empty;
use lectern_core::{
    Clock, LessonRuntimeConfig, MessageKind, Payload, PlaybackSessionId, Result, Segment,
};
use lectern_playback::{EmbedConnector, PlaybackEvent, PlaybackService, PlaybackSession};
use lectern_progression::{ProgressionEngine, ProgressionEvent, ProgressionPhase};

use crate::capability::{ChatSurface, ProgressStore};
use crate::handlers::{register_handlers, HandlerContext};
use crate::state::SessionState;

/// Topic on which playback state changes are pushed to content subscribers.
///
/// Content that wants to follow host-driven media subscribes to this topic
/// and receives payloads of the form `{"event": "play", "sessionId": ...}`
/// with `duration`, `seconds`, or `message` attached where relevant.
pub const PLAYBACK_TOPIC: &str = "playback";

/// Host-side dependencies the embedding application supplies.
pub struct HostCapabilities {
    /// Opens provider embeds for the playback facade.
    pub connector: Arc<dyn EmbedConnector>,
    /// Persistence for learner progress and interaction data.
    pub store: Arc<dyn ProgressStore>,
    /// Chat and overlay surface of the surrounding UI.
    pub chat: Arc<dyn ChatSurface>,
    /// Time source shared by every component.
    pub clock: Arc<dyn Clock>,
}

/// A running lesson session.
///
/// Dropping the runtime stops every background task; [`shutdown`] is the
/// orderly variant that also pauses and releases the active media backend
/// before the channel goes away.
///
/// [`shutdown`]: LessonRuntime::shutdown
pub struct LessonRuntime {
    channel: Arc<CorrelationChannel>,
    playback: Arc<PlaybackService>,
    engine: Arc<ProgressionEngine>,
    state: SessionState,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl LessonRuntime {
    /// Bind the runtime over the port that reaches embedded content.
    ///
    /// Every handler is registered before the `ready` handshake leaves, so
    /// content may start calling the moment it sees the event. The returned
    /// receiver carries progression decisions; the embedding application
    /// reacts to them by calling [`activate_segment`] for the next segment
    /// or by surfacing a continue control and calling [`confirm_continue`].
    ///
    /// [`activate_segment`]: LessonRuntime::activate_segment
    /// [`confirm_continue`]: LessonRuntime::confirm_continue
    pub async fn start<P: MessagePort + 'static>(
        port: P,
        capabilities: HostCapabilities,
        config: LessonRuntimeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProgressionEvent>)> {
        let HostCapabilities {
            connector,
            store,
            chat,
            clock,
        } = capabilities;

        let channel = Arc::new(CorrelationChannel::bind(port, config.channel));
        let (playback, playback_events) =
            PlaybackService::new(connector, Arc::clone(&clock), config.playback);
        let playback = Arc::new(playback);
        let (engine, decisions) = ProgressionEngine::new(clock, config.progression);
        let engine = Arc::new(engine);
        let state = SessionState::new();

        register_handlers(
            &channel,
            &HandlerContext {
                playback: Arc::clone(&playback),
                engine: Arc::clone(&engine),
                store,
                chat,
                state: state.clone(),
            },
        );

        let pump = tokio::spawn(pump_playback(
            Arc::clone(&engine),
            Arc::downgrade(&channel),
            playback_events,
        ));

        channel.emit(MessageKind::Ready, empty()).await?;
        tracing::info!("lesson runtime started");

        Ok((
            Self {
                channel,
                playback,
                engine,
                state,
                pump: StdMutex::new(Some(pump)),
            },
            decisions,
        ))
    }

    /// Begin a segment: start its wait allocation and, when it carries
    /// media, activate the matching playback backend.
    ///
    /// Returns the playback session id for media segments. A media source
    /// that fails to load does not wedge the lesson: the failure is treated
    /// like a backend failure mid-session, completing the segment, and the
    /// error is returned for the application to surface.
    pub async fn activate_segment(&self, segment: &Segment) -> Result<Option<PlaybackSessionId>> {
        tracing::info!(segment_id = %segment.id, "activating segment");
        self.engine.begin_segment(segment);

        match segment.media.as_ref() {
            Some(media) => match self.playback.activate(media).await {
                Ok(session_id) => Ok(Some(session_id)),
                Err(err) => {
                    tracing::warn!(error = %err, "segment media failed to activate");
                    self.engine.content_finished();
                    Err(err)
                }
            },
            None => {
                self.playback.deactivate().await;
                Ok(None)
            }
        }
    }

    /// Advance past a segment that ended awaiting learner confirmation.
    pub fn confirm_continue(&self) {
        self.engine.confirm();
    }

    /// Record that the learner dismissed the script panel.
    pub fn dismiss_script(&self) {
        self.engine.script_dismissed();
    }

    /// Playback control surface, for host transport controls.
    pub fn playback(&self) -> &PlaybackService {
        &self.playback
    }

    /// Current progression phase.
    pub fn phase(&self) -> ProgressionPhase {
        self.engine.phase()
    }

    /// Remaining wait on the active segment, while one is playing.
    pub fn remaining_wait(&self) -> Option<Duration> {
        self.engine.remaining_wait()
    }

    /// Shared session state map, also reachable from content via
    /// `update-state` / `get-state`.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Snapshot of the active playback session, if any.
    pub async fn playback_snapshot(&self) -> Option<PlaybackSession> {
        self.playback.snapshot().await
    }

    /// Push an event to every content subscriber of `topic`, returning the
    /// number of subscriptions it reached.
    pub async fn publish(&self, topic: &str, payload: Payload) -> Result<usize> {
        self.channel.push_to_subscribers(topic, payload).await
    }

    /// Tear the session down in order: media first, then pacing, then the
    /// channel. In-flight content calls resolve with a cancellation error.
    pub async fn shutdown(&self) {
        self.playback.deactivate().await;
        self.engine.close();
        if let Some(pump) = self.lock_pump().take() {
            pump.abort();
        }
        self.channel.close();
        tracing::info!("lesson runtime shut down");
    }

    fn lock_pump(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LessonRuntime {
    fn drop(&mut self) {
        self.engine.close();
        if let Some(pump) = self.lock_pump().take() {
            pump.abort();
        }
        self.channel.close();
        // Drop cannot await the media teardown; finish it on the runtime
        // if one is still around. `shutdown` is the orderly path.
        let playback = Arc::clone(&self.playback);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { playback.deactivate().await });
        }
    }
}

/// Feed playback state into the engine and echo it to content subscribers.
async fn pump_playback(
    engine: Arc<ProgressionEngine>,
    channel: Weak<CorrelationChannel>,
    mut events: mpsc::UnboundedReceiver<PlaybackEvent>,
) {
    while let Some(event) = events.recv().await {
        let echo = playback_echo(&event);
        match &event {
            PlaybackEvent::SessionReady { duration, .. } => {
                engine.content_duration_known(*duration);
            }
            PlaybackEvent::Started { .. } => engine.playback_resumed(),
            PlaybackEvent::Paused { .. } => engine.playback_paused(),
            PlaybackEvent::Tick { .. } => {}
            PlaybackEvent::Ended { .. } => engine.content_finished(),
            PlaybackEvent::Failed {
                session_id,
                message,
            } => {
                tracing::warn!(
                    session_id = %session_id,
                    message = %message,
                    "playback failed; completing segment"
                );
                engine.content_finished();
            }
        }

        if let Some(channel) = channel.upgrade() {
            if let Err(err) = channel.push_to_subscribers(PLAYBACK_TOPIC, echo).await {
                tracing::debug!(error = %err, "playback echo not delivered");
            }
        }
    }
}

fn playback_echo(event: &PlaybackEvent) -> Payload {
    let (name, session_id) = match event {
        PlaybackEvent::SessionReady { session_id, .. } => ("ready", session_id),
        PlaybackEvent::Started { session_id } => ("play", session_id),
        PlaybackEvent::Paused { session_id } => ("pause", session_id),
        PlaybackEvent::Tick { session_id, .. } => ("timeupdate", session_id),
        PlaybackEvent::Ended { session_id } => ("ended", session_id),
        PlaybackEvent::Failed { session_id, .. } => ("error", session_id),
    };

    let mut payload = Payload::new();
    payload.insert("event".into(), Value::String(name.into()));
    payload.insert("sessionId".into(), Value::String(session_id.to_string()));
    match event {
        PlaybackEvent::SessionReady { duration, .. } => {
            payload.insert("duration".into(), Value::from(*duration));
        }
        PlaybackEvent::Tick { seconds, .. } => {
            payload.insert("seconds".into(), Value::from(*seconds));
        }
        PlaybackEvent::Failed { message, .. } => {
            payload.insert("message".into(), Value::String(message.clone()));
        }
        _ => {}
    }
    payload
}
