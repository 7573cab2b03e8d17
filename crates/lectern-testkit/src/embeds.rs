//! Scripted embed players.
//!
//! Each [`FakeEmbeddedPlayer`] sits on the far side of an in-process port
//! and speaks one of the real provider dialects: the widget protocol
//! (`listening`/`command` out, `onReady`/`infoDelivery`/`onStateChange`
//! back) or player.js (`{"method", "value"}` both ways plus registered
//! events). Tests drive readiness, positions, completion, and failures by
//! hand, and can inspect every control frame the embed received as a
//! dialect-independent [`RecordedCommand`].
//!
//! [`FakeConnector`] hands these embeds to the playback facade in place of
//! real iframes.

use async_trait::async_trait;
use lectern_channel::{InProcessPort, MessagePort};
use lectern_core::{BackendKind, LecternError, Result};
use lectern_playback::EmbedConnector;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Control frame the embed received, normalized across dialects.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Play,
    Pause,
    Seek(f64),
    /// Volume as `0..1` regardless of the dialect's native scale.
    SetVolume(f64),
    Stop,
}

#[derive(Debug)]
struct PlayerShared {
    backend: BackendKind,
    media_id: String,
    duration: f64,
    auto_ready: bool,
    port: InProcessPort,
    announced: AtomicBool,
    commands: Mutex<Vec<RecordedCommand>>,
    position: Mutex<f64>,
}

/// A scripted embed on the far side of a message port.
#[derive(Debug)]
pub struct FakeEmbeddedPlayer {
    shared: Arc<PlayerShared>,
}

impl FakeEmbeddedPlayer {
    fn spawn(
        backend: BackendKind,
        media_id: String,
        duration: f64,
        auto_ready: bool,
        port: InProcessPort,
    ) -> Arc<Self> {
        let shared = Arc::new(PlayerShared {
            backend,
            media_id,
            duration,
            auto_ready,
            port,
            announced: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
            position: Mutex::new(0.0),
        });
        tokio::spawn(PlayerShared::run(Arc::clone(&shared)));
        Arc::new(Self { shared })
    }

    /// Which dialect this embed speaks.
    pub fn backend(&self) -> BackendKind {
        self.shared.backend
    }

    /// The media the embed was opened for.
    pub fn media_id(&self) -> &str {
        &self.shared.media_id
    }

    /// Announce readiness by hand. A no-op if already announced, so it
    /// composes with auto-announcing embeds.
    pub async fn announce_ready(&self) {
        match self.shared.backend {
            BackendKind::YouTube => self.shared.announce_widget_ready().await,
            BackendKind::Vimeo => self.shared.announce_player_js_ready().await,
            BackendKind::Native => {}
        }
    }

    /// Move the embed's playhead. The widget dialect pushes a snapshot;
    /// player.js embeds surface the new position on the next query.
    pub async fn push_position(&self, seconds: f64) {
        *self.shared.lock_position() = seconds;
        if self.shared.backend == BackendKind::YouTube {
            self.shared
                .reply(json!({
                    "event": "infoDelivery",
                    "info": {"currentTime": seconds},
                }))
                .await;
        }
    }

    /// Announce that the media ran to its end.
    pub async fn finish(&self) {
        *self.shared.lock_position() = self.shared.duration;
        match self.shared.backend {
            BackendKind::YouTube => {
                self.shared
                    .reply(json!({"event": "onStateChange", "info": 0}))
                    .await;
            }
            BackendKind::Vimeo => self.shared.reply(json!({"event": "finish"})).await,
            BackendKind::Native => {}
        }
    }

    /// Announce a playback failure. The widget dialect carries numeric
    /// codes, so `message` only reaches player.js consumers verbatim.
    pub async fn fail(&self, message: &str) {
        match self.shared.backend {
            BackendKind::YouTube => {
                self.shared
                    .reply(json!({"event": "onError", "info": 5}))
                    .await;
            }
            BackendKind::Vimeo => {
                self.shared
                    .reply(json!({"event": "error", "data": {"message": message}}))
                    .await;
            }
            BackendKind::Native => {}
        }
    }

    /// Every control frame received so far, oldest first.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.shared.lock_commands().clone()
    }

    /// Wait until the embed has received at least `count` control frames.
    ///
    /// # Panics
    /// Panics if the count is not reached within two seconds.
    pub async fn wait_for_commands(&self, count: usize) -> Vec<RecordedCommand> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let commands = self.commands();
            if commands.len() >= count {
                return commands;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("embed saw {} commands, wanted {count}", commands.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl PlayerShared {
    async fn run(shared: Arc<PlayerShared>) {
        while let Some(frame) = shared.port.recv().await {
            let Ok(message) = serde_json::from_str::<Value>(&frame) else {
                tracing::debug!("fake embed ignoring unparseable frame");
                continue;
            };
            match shared.backend {
                BackendKind::YouTube => shared.handle_widget_frame(&message).await,
                BackendKind::Vimeo => shared.handle_player_js_frame(&message).await,
                BackendKind::Native => {}
            }
        }
    }

    fn lock_commands(&self) -> MutexGuard<'_, Vec<RecordedCommand>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_position(&self) -> MutexGuard<'_, f64> {
        self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, command: RecordedCommand) {
        self.lock_commands().push(command);
    }

    async fn reply(&self, frame: Value) {
        if let Err(err) = self.port.send(frame.to_string()).await {
            tracing::debug!(error = %err, "fake embed reply not delivered");
        }
    }

    async fn handle_widget_frame(&self, message: &Value) {
        match message.get("event").and_then(Value::as_str) {
            Some("listening") => {
                if self.auto_ready {
                    self.announce_widget_ready().await;
                }
            }
            Some("command") => {
                let first_arg = message
                    .get("args")
                    .and_then(Value::as_array)
                    .and_then(|args| args.first());
                match message.get("func").and_then(Value::as_str) {
                    Some("playVideo") => {
                        self.record(RecordedCommand::Play);
                        self.reply(json!({"event": "onStateChange", "info": 1}))
                            .await;
                    }
                    Some("pauseVideo") => {
                        self.record(RecordedCommand::Pause);
                        self.reply(json!({"event": "onStateChange", "info": 2}))
                            .await;
                    }
                    Some("seekTo") => {
                        if let Some(seconds) = first_arg.and_then(Value::as_f64) {
                            self.record(RecordedCommand::Seek(seconds));
                            *self.lock_position() = seconds;
                        }
                    }
                    Some("setVolume") => {
                        if let Some(level) = first_arg.and_then(Value::as_f64) {
                            self.record(RecordedCommand::SetVolume(level / 100.0));
                        }
                    }
                    Some("stopVideo") => self.record(RecordedCommand::Stop),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    async fn announce_widget_ready(&self) {
        if self.announced.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reply(json!({"event": "onReady", "info": {}})).await;
        let position = *self.lock_position();
        self.reply(json!({
            "event": "infoDelivery",
            "info": {
                "currentTime": position,
                "duration": self.duration,
                "playerState": 2,
            },
        }))
        .await;
    }

    async fn handle_player_js_frame(&self, message: &Value) {
        let value = message.get("value");
        match message.get("method").and_then(Value::as_str) {
            Some("addEventListener") => {
                if value == Some(&json!("ready")) && self.auto_ready {
                    self.announce_player_js_ready().await;
                }
            }
            Some("play") => {
                self.record(RecordedCommand::Play);
                self.reply(json!({"event": "play", "data": {}})).await;
            }
            Some("pause") => {
                self.record(RecordedCommand::Pause);
                self.reply(json!({"event": "pause"})).await;
            }
            Some("setCurrentTime") => {
                if let Some(seconds) = value.and_then(Value::as_f64) {
                    self.record(RecordedCommand::Seek(seconds));
                    *self.lock_position() = seconds;
                }
            }
            Some("setVolume") => {
                if let Some(level) = value.and_then(Value::as_f64) {
                    self.record(RecordedCommand::SetVolume(level));
                }
            }
            Some("getCurrentTime") => {
                let position = *self.lock_position();
                self.reply(json!({"method": "getCurrentTime", "value": position}))
                    .await;
            }
            Some("getDuration") => {
                self.reply(json!({"method": "getDuration", "value": self.duration}))
                    .await;
            }
            Some("unload") => self.record(RecordedCommand::Stop),
            _ => {}
        }
    }

    async fn announce_player_js_ready(&self) {
        if self.announced.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reply(json!({"event": "ready"})).await;
    }
}

/// Opens scripted embeds instead of real iframes.
///
/// Every embed the facade asks for is recorded; tests reach the live ones
/// through [`latest_player`](FakeConnector::latest_player) to drive
/// readiness and state by hand.
#[derive(Debug)]
pub struct FakeConnector {
    auto_ready: bool,
    default_duration: f64,
    durations: Mutex<HashMap<String, f64>>,
    players: Mutex<Vec<Arc<FakeEmbeddedPlayer>>>,
}

impl FakeConnector {
    /// Embeds announce readiness as soon as the adapter attaches.
    pub fn new() -> Self {
        Self {
            auto_ready: true,
            default_duration: 120.0,
            durations: Mutex::new(HashMap::new()),
            players: Mutex::new(Vec::new()),
        }
    }

    /// Embeds stay silent until the test calls
    /// [`FakeEmbeddedPlayer::announce_ready`].
    pub fn holding_ready() -> Self {
        Self {
            auto_ready: false,
            ..Self::new()
        }
    }

    /// Duration a given media id will report.
    pub fn set_duration(&self, media_id: impl Into<String>, duration: f64) {
        self.lock_durations().insert(media_id.into(), duration);
    }

    /// Every embed opened so far, oldest first.
    pub fn players(&self) -> Vec<Arc<FakeEmbeddedPlayer>> {
        self.lock_players().clone()
    }

    /// The most recently opened embed.
    ///
    /// # Panics
    /// Panics if no embed has been opened yet.
    pub fn latest_player(&self) -> Arc<FakeEmbeddedPlayer> {
        self.lock_players()
            .last()
            .cloned()
            .expect("no embed opened yet")
    }

    fn lock_durations(&self) -> MutexGuard<'_, HashMap<String, f64>> {
        self.durations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_players(&self) -> MutexGuard<'_, Vec<Arc<FakeEmbeddedPlayer>>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbedConnector for FakeConnector {
    async fn open_embed(
        &self,
        backend: BackendKind,
        media_id: &str,
    ) -> Result<Box<dyn MessagePort>> {
        if backend == BackendKind::Native {
            return Err(LecternError::internal("native playback opens no embed"));
        }
        let duration = self
            .lock_durations()
            .get(media_id)
            .copied()
            .unwrap_or(self.default_duration);
        let (host_port, embed_port) = InProcessPort::pair();
        let player = FakeEmbeddedPlayer::spawn(
            backend,
            media_id.to_string(),
            duration,
            self.auto_ready,
            embed_port,
        );
        self.lock_players().push(player);
        Ok(Box::new(host_port))
    }
}
