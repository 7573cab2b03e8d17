//! YouTube iframe widget dialect.
//!
//! The embed speaks the widget postMessage protocol: the host announces
//! itself with a `listening` frame, then issues `command` frames naming a
//! player function. The embed replies with `onReady`, periodic
//! `infoDelivery` snapshots (current time, duration, player state), discrete
//! `onStateChange` transitions, and numeric `onError` codes.
//!
//! Positions are answered from the latest `infoDelivery` snapshot; the
//! facade's poll cadence decides how often that cache is sampled. Volume is
//! scaled from the normalized `0..1` to the widget's `0..100`.

use crate::adapter::{AdapterEvent, PlayerAdapter};
use async_trait::async_trait;
use lectern_channel::MessagePort;
use lectern_core::{BackendKind, MediaSource, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Widget frame id; a host page with several embeds would count upward.
const WIDGET_ID: u32 = 1;
const WIDGET_CHANNEL: &str = "widget";

/// Player states reported by `onStateChange` and `infoDelivery`.
const STATE_ENDED: i64 = 0;
const STATE_PLAYING: i64 = 1;
const STATE_PAUSED: i64 = 2;

#[derive(Debug, Default)]
struct YouTubeState {
    ready: bool,
    loaded_reported: bool,
    duration: f64,
    current_time: f64,
    playing: bool,
}

#[derive(Debug)]
struct YouTubeShared {
    port: Arc<dyn MessagePort>,
    events: mpsc::UnboundedSender<AdapterEvent>,
    state: Mutex<YouTubeState>,
}

/// Adapter for a YouTube embed, one per iframe.
#[derive(Debug)]
pub struct YouTubeAdapter {
    shared: Arc<YouTubeShared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl YouTubeAdapter {
    /// Attach to an embed's message port and start consuming its frames.
    pub fn connect(
        port: Arc<dyn MessagePort>,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) -> Self {
        let shared = Arc::new(YouTubeShared {
            port,
            events,
            state: Mutex::new(YouTubeState::default()),
        });
        let pump = tokio::spawn(YouTubeShared::run_pump(Arc::clone(&shared)));
        Self {
            shared,
            pump: Mutex::new(Some(pump)),
        }
    }

    async fn send_command(&self, func: &str, args: Vec<Value>) -> Result<()> {
        let frame = json!({
            "event": "command",
            "func": func,
            "args": args,
            "id": WIDGET_ID,
            "channel": WIDGET_CHANNEL,
        });
        self.shared.port.send(frame.to_string()).await
    }
}

impl YouTubeShared {
    async fn run_pump(shared: Arc<YouTubeShared>) {
        while let Some(frame) = shared.port.recv().await {
            let Ok(message) = serde_json::from_str::<Value>(&frame) else {
                tracing::debug!("dropping unparseable embed frame");
                continue;
            };
            let Some(event) = message.get("event").and_then(Value::as_str) else {
                tracing::debug!("dropping embed frame without event");
                continue;
            };
            match event {
                "onReady" => shared.on_ready(message.get("info")).await,
                "infoDelivery" => shared.on_info(message.get("info")).await,
                "onStateChange" => {
                    shared
                        .on_state_change(message.get("info").and_then(Value::as_i64))
                        .await;
                }
                "onError" => {
                    shared
                        .on_error(message.get("info").and_then(Value::as_i64))
                        .await;
                }
                other => tracing::trace!(event = other, "unhandled embed event"),
            }
        }
        tracing::debug!("embed port closed");
    }

    async fn on_ready(&self, info: Option<&Value>) {
        let mut state = self.state.lock().await;
        state.ready = true;
        absorb_info(&mut state, info);
        self.maybe_report_loaded(&mut state);
    }

    async fn on_info(&self, info: Option<&Value>) {
        let mut state = self.state.lock().await;
        absorb_info(&mut state, info);
        self.maybe_report_loaded(&mut state);
    }

    /// Readiness surfaces once the embed is up and the duration is known;
    /// either frame may deliver the last missing piece.
    fn maybe_report_loaded(&self, state: &mut YouTubeState) {
        if state.ready && state.duration > 0.0 && !state.loaded_reported {
            state.loaded_reported = true;
            let _ = self.events.send(AdapterEvent::Loaded {
                duration: state.duration,
            });
        }
    }

    async fn on_state_change(&self, code: Option<i64>) {
        let Some(code) = code else { return };
        let event = {
            let mut state = self.state.lock().await;
            match code {
                STATE_PLAYING => {
                    state.playing = true;
                    Some(AdapterEvent::Play)
                }
                STATE_PAUSED => {
                    state.playing = false;
                    Some(AdapterEvent::Pause)
                }
                STATE_ENDED => {
                    state.playing = false;
                    state.current_time = state.duration;
                    Some(AdapterEvent::Ended)
                }
                // Unstarted, buffering, cued: internal transitions.
                _ => None,
            }
        };
        if let Some(event) = event {
            let _ = self.events.send(event);
        }
    }

    async fn on_error(&self, code: Option<i64>) {
        let message = match code {
            Some(2) => "invalid media parameter".to_string(),
            Some(5) => "media cannot play in this player".to_string(),
            Some(100) => "media not found".to_string(),
            Some(101) | Some(150) => "embedding disabled for this media".to_string(),
            Some(other) => format!("provider error code {other}"),
            None => "provider error".to_string(),
        };
        self.state.lock().await.playing = false;
        let _ = self.events.send(AdapterEvent::Error { message });
    }
}

/// Pull whatever fields an info snapshot carries into the cache.
fn absorb_info(state: &mut YouTubeState, info: Option<&Value>) {
    let Some(info) = info else { return };
    if let Some(current_time) = info.get("currentTime").and_then(Value::as_f64) {
        state.current_time = current_time;
    }
    if let Some(duration) = info.get("duration").and_then(Value::as_f64) {
        state.duration = duration;
    }
    if let Some(player_state) = info.get("playerState").and_then(Value::as_i64) {
        state.playing = player_state == STATE_PLAYING;
    }
}

#[async_trait]
impl PlayerAdapter for YouTubeAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::YouTube
    }

    fn drives_time_updates(&self) -> bool {
        false
    }

    /// The embed URL already names the media; loading means opening the
    /// widget event stream.
    async fn load(&self, _source: &MediaSource) -> Result<()> {
        let frame = json!({
            "event": "listening",
            "id": WIDGET_ID,
            "channel": WIDGET_CHANNEL,
        });
        self.shared.port.send(frame.to_string()).await
    }

    async fn play(&self) -> Result<bool> {
        self.send_command("playVideo", vec![]).await?;
        Ok(true)
    }

    async fn pause(&self) -> Result<()> {
        self.send_command("pauseVideo", vec![]).await
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.send_command("seekTo", vec![json!(seconds), json!(true)])
            .await
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        let scaled = (volume.clamp(0.0, 1.0) * 100.0).round() as u32;
        self.send_command("setVolume", vec![json!(scaled)]).await
    }

    async fn current_time(&self) -> Result<f64> {
        Ok(self.shared.state.lock().await.current_time)
    }

    async fn duration(&self) -> Result<f64> {
        Ok(self.shared.state.lock().await.duration)
    }

    async fn is_playing(&self) -> Result<bool> {
        Ok(self.shared.state.lock().await.playing)
    }

    async fn shutdown(&self) {
        if let Err(err) = self.send_command("stopVideo", vec![]).await {
            tracing::debug!(error = %err, "stop command not delivered during shutdown");
        }
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectern_channel::InProcessPort;
    use std::time::Duration;

    struct Harness {
        adapter: YouTubeAdapter,
        embed: InProcessPort,
        events: mpsc::UnboundedReceiver<AdapterEvent>,
    }

    fn harness() -> Harness {
        let (adapter_port, embed) = InProcessPort::pair();
        let (events_tx, events) = mpsc::unbounded_channel();
        let adapter = YouTubeAdapter::connect(Arc::new(adapter_port), events_tx);
        Harness {
            adapter,
            embed,
            events,
        }
    }

    async fn embed_sends(embed: &InProcessPort, frame: Value) {
        embed.send(frame.to_string()).await.expect("embed send");
    }

    async fn host_frame(embed: &InProcessPort) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(1), embed.recv())
            .await
            .expect("host frame within deadline")
            .expect("port open");
        serde_json::from_str(&frame).expect("json frame")
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<AdapterEvent>) -> AdapterEvent {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event within deadline")
            .expect("event stream open")
    }

    #[tokio::test]
    async fn load_opens_the_widget_event_stream() {
        let h = harness();
        let source = MediaSource::new(BackendKind::YouTube, "dQw4w9WgXcQ");
        h.adapter.load(&source).await.expect("load");

        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["event"], json!("listening"));
        assert_eq!(frame["channel"], json!("widget"));
    }

    #[tokio::test]
    async fn ready_plus_duration_reports_loaded_once() {
        let mut h = harness();

        embed_sends(&h.embed, json!({"event": "onReady", "info": {}})).await;
        embed_sends(
            &h.embed,
            json!({"event": "infoDelivery", "info": {"currentTime": 0.0, "duration": 93.4}}),
        )
        .await;

        assert_eq!(
            next_event(&mut h.events).await,
            AdapterEvent::Loaded { duration: 93.4 }
        );

        // Further snapshots refresh the cache without another Loaded.
        embed_sends(
            &h.embed,
            json!({"event": "infoDelivery", "info": {"currentTime": 1.5, "duration": 93.4}}),
        )
        .await;
        let time = h.adapter.current_time().await.expect("current_time");
        assert!((time - 1.5).abs() < 1e-9);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn commands_speak_the_widget_dialect() {
        let h = harness();

        assert!(h.adapter.play().await.expect("play"));
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["event"], json!("command"));
        assert_eq!(frame["func"], json!("playVideo"));

        h.adapter.seek(12.5).await.expect("seek");
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["func"], json!("seekTo"));
        assert_eq!(frame["args"], json!([12.5, true]));

        h.adapter.set_volume(0.8).await.expect("set_volume");
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["func"], json!("setVolume"));
        assert_eq!(frame["args"], json!([80]));

        h.adapter.pause().await.expect("pause");
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["func"], json!("pauseVideo"));
    }

    #[tokio::test]
    async fn state_changes_become_normalized_events() {
        let mut h = harness();

        embed_sends(&h.embed, json!({"event": "onStateChange", "info": 1})).await;
        assert_eq!(next_event(&mut h.events).await, AdapterEvent::Play);
        assert!(h.adapter.is_playing().await.expect("is_playing"));

        embed_sends(&h.embed, json!({"event": "onStateChange", "info": 2})).await;
        assert_eq!(next_event(&mut h.events).await, AdapterEvent::Pause);
        assert!(!h.adapter.is_playing().await.expect("is_playing"));

        embed_sends(
            &h.embed,
            json!({"event": "infoDelivery", "info": {"duration": 10.0}}),
        )
        .await;
        embed_sends(&h.embed, json!({"event": "onStateChange", "info": 0})).await;
        assert_eq!(next_event(&mut h.events).await, AdapterEvent::Ended);
        let time = h.adapter.current_time().await.expect("current_time");
        assert!((time - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn error_codes_map_to_messages() {
        let mut h = harness();

        embed_sends(&h.embed, json!({"event": "onError", "info": 150})).await;
        match next_event(&mut h.events).await {
            AdapterEvent::Error { message } => {
                assert!(message.contains("embedding disabled"), "got: {message}");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_frames_are_ignored() {
        let mut h = harness();

        h.embed.send("][not json".to_string()).await.expect("send");
        embed_sends(&h.embed, json!({"no_event": true})).await;
        embed_sends(&h.embed, json!({"event": "onApiChange"})).await;

        embed_sends(&h.embed, json!({"event": "onReady"})).await;
        embed_sends(
            &h.embed,
            json!({"event": "infoDelivery", "info": {"duration": 5.0}}),
        )
        .await;
        assert_eq!(
            next_event(&mut h.events).await,
            AdapterEvent::Loaded { duration: 5.0 }
        );
    }
}
