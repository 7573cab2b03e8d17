//! Vimeo player.js dialect.
//!
//! The embed exchanges two frame shapes: `{"method": …, "value": …}` for
//! host-issued commands and their replies, and `{"event": …, "data": …}`
//! for notifications the host registered with `addEventListener`. Replies
//! carry no correlation id; they echo the method name, so queries are
//! paired with replies FIFO per method.
//!
//! Volume is already `0..1` in this dialect, so it passes through
//! unscaled. Positions are a real request/reply round trip, unlike the
//! snapshot cache the other provider pushes.

use crate::adapter::{AdapterEvent, PlayerAdapter};
use async_trait::async_trait;
use lectern_channel::MessagePort;
use lectern_core::{BackendKind, LecternError, MediaSource, Result};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Notifications the adapter subscribes to on ready. Positions are polled,
/// so `timeupdate` is deliberately not among them.
const LISTENED_EVENTS: [&str; 4] = ["play", "pause", "finish", "error"];

/// How many duration requests the ready handler issues before giving up.
const READY_DURATION_ATTEMPTS: u32 = 3;

#[derive(Debug, Default)]
struct VimeoState {
    ready: bool,
    loaded_reported: bool,
    duration: f64,
    playing: bool,
}

#[derive(Debug)]
struct VimeoShared {
    port: Arc<dyn MessagePort>,
    events: mpsc::UnboundedSender<AdapterEvent>,
    state: Mutex<VimeoState>,
    /// Outstanding query responders, FIFO per method name.
    pending: Mutex<HashMap<String, VecDeque<oneshot::Sender<Value>>>>,
    query_timeout: Duration,
}

/// Adapter for a Vimeo embed, one per iframe.
#[derive(Debug)]
pub struct VimeoAdapter {
    shared: Arc<VimeoShared>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl VimeoAdapter {
    /// Attach to an embed's message port and start consuming its frames.
    pub fn connect(
        port: Arc<dyn MessagePort>,
        events: mpsc::UnboundedSender<AdapterEvent>,
        query_timeout: Duration,
    ) -> Self {
        let shared = Arc::new(VimeoShared {
            port,
            events,
            state: Mutex::new(VimeoState::default()),
            pending: Mutex::new(HashMap::new()),
            query_timeout,
        });
        let pump = tokio::spawn(VimeoShared::run_pump(Arc::clone(&shared)));
        Self {
            shared,
            pump: Mutex::new(Some(pump)),
        }
    }
}

impl VimeoShared {
    async fn run_pump(shared: Arc<VimeoShared>) {
        while let Some(frame) = shared.port.recv().await {
            let Ok(message) = serde_json::from_str::<Value>(&frame) else {
                tracing::debug!("dropping unparseable embed frame");
                continue;
            };
            if let Some(event) = message.get("event").and_then(Value::as_str) {
                Self::on_event(&shared, event, message.get("data")).await;
            } else if let Some(method) = message.get("method").and_then(Value::as_str) {
                shared.resolve_query(method, message.get("value")).await;
            } else {
                tracing::debug!("dropping embed frame without event or method");
            }
        }
        tracing::debug!("embed port closed");
    }

    async fn on_event(shared: &Arc<VimeoShared>, event: &str, data: Option<&Value>) {
        match event {
            "ready" => Self::on_ready(shared).await,
            "play" => {
                shared.state.lock().await.playing = true;
                let _ = shared.events.send(AdapterEvent::Play);
            }
            "pause" => {
                shared.state.lock().await.playing = false;
                let _ = shared.events.send(AdapterEvent::Pause);
            }
            "finish" => {
                shared.state.lock().await.playing = false;
                let _ = shared.events.send(AdapterEvent::Ended);
            }
            "error" => {
                let message = data
                    .and_then(|d| d.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("provider error")
                    .to_string();
                shared.state.lock().await.playing = false;
                let _ = shared.events.send(AdapterEvent::Error { message });
            }
            other => tracing::trace!(event = other, "unhandled embed event"),
        }
    }

    /// First `ready` wires up listeners and asks for the duration, which in
    /// turn produces the Loaded report; a missed reply is asked again.
    /// Duplicate readies are ignored.
    async fn on_ready(shared: &Arc<VimeoShared>) {
        {
            let mut state = shared.state.lock().await;
            if state.ready {
                return;
            }
            state.ready = true;
        }

        for event in LISTENED_EVENTS {
            let frame = json!({"method": "addEventListener", "value": event});
            if let Err(err) = shared.port.send(frame.to_string()).await {
                tracing::debug!(error = %err, event, "listener registration not delivered");
            }
        }

        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            for attempt in 1..=READY_DURATION_ATTEMPTS {
                match shared.query("getDuration").await {
                    Ok(value) => {
                        match value.as_f64().filter(|d| *d > 0.0) {
                            Some(duration) => shared.note_duration(duration).await,
                            None => tracing::debug!(?value, "unusable duration reply"),
                        }
                        return;
                    }
                    Err(err) if err.is_timeout() => {
                        tracing::debug!(attempt, "duration request unanswered");
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "duration request not delivered");
                        return;
                    }
                }
            }
            tracing::warn!("embed never reported a duration");
        });
    }

    /// Record a reported duration and emit the one-time Loaded report.
    async fn note_duration(&self, duration: f64) {
        if duration <= 0.0 {
            return;
        }
        let mut state = self.state.lock().await;
        state.duration = duration;
        if !state.loaded_reported {
            state.loaded_reported = true;
            let _ = self.events.send(AdapterEvent::Loaded { duration });
        }
    }

    async fn register_query(&self, method: &str) -> oneshot::Receiver<Value> {
        let (responder, reply) = oneshot::channel();
        self.pending
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push_back(responder);
        reply
    }

    async fn resolve_query(&self, method: &str, value: Option<&Value>) {
        let responder = {
            let mut pending = self.pending.lock().await;
            match pending.get_mut(method) {
                Some(queue) => queue.pop_front(),
                None => None,
            }
        };
        match responder {
            Some(responder) => {
                let _ = responder.send(value.cloned().unwrap_or(Value::Null));
            }
            None => tracing::debug!(method, "unsolicited method reply dropped"),
        }
    }

    /// One request/reply round trip. On timeout every responder for the
    /// method is discarded so a late reply cannot pair with a newer query.
    async fn query(&self, method: &'static str) -> Result<Value> {
        let reply = self.register_query(method).await;
        let frame = json!({"method": method});
        self.port.send(frame.to_string()).await?;

        match tokio::time::timeout(self.query_timeout, reply).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(LecternError::cancelled(format!(
                "embed gone before {method} reply"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(method);
                Err(LecternError::timeout(format!(
                    "{method} reply after {}ms",
                    self.query_timeout.as_millis()
                )))
            }
        }
    }

    async fn send_command(&self, method: &str, value: Option<Value>) -> Result<()> {
        let frame = match value {
            Some(value) => json!({"method": method, "value": value}),
            None => json!({"method": method}),
        };
        self.port.send(frame.to_string()).await
    }
}

#[async_trait]
impl PlayerAdapter for VimeoAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Vimeo
    }

    fn drives_time_updates(&self) -> bool {
        false
    }

    /// The iframe is already loading the media named in its URL; ask to be
    /// told about readiness in case the embed announced it before this
    /// adapter attached.
    async fn load(&self, _source: &MediaSource) -> Result<()> {
        self.shared
            .send_command("addEventListener", Some(json!("ready")))
            .await
    }

    async fn play(&self) -> Result<bool> {
        self.shared.send_command("play", None).await?;
        Ok(true)
    }

    async fn pause(&self) -> Result<()> {
        self.shared.send_command("pause", None).await
    }

    async fn seek(&self, seconds: f64) -> Result<()> {
        self.shared
            .send_command("setCurrentTime", Some(json!(seconds)))
            .await
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.shared
            .send_command("setVolume", Some(json!(volume.clamp(0.0, 1.0))))
            .await
    }

    async fn current_time(&self) -> Result<f64> {
        let value = self.shared.query("getCurrentTime").await?;
        value
            .as_f64()
            .ok_or_else(|| LecternError::protocol("non-numeric position reply"))
    }

    async fn duration(&self) -> Result<f64> {
        {
            let state = self.shared.state.lock().await;
            if state.duration > 0.0 {
                return Ok(state.duration);
            }
        }
        let value = self.shared.query("getDuration").await?;
        let duration = value
            .as_f64()
            .ok_or_else(|| LecternError::protocol("non-numeric duration reply"))?;
        self.shared.note_duration(duration).await;
        Ok(duration)
    }

    async fn is_playing(&self) -> Result<bool> {
        Ok(self.shared.state.lock().await.playing)
    }

    async fn shutdown(&self) {
        if let Err(err) = self.shared.send_command("unload", None).await {
            tracing::debug!(error = %err, "unload not delivered during shutdown");
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

    struct Harness {
        adapter: VimeoAdapter,
        embed: InProcessPort,
        events: mpsc::UnboundedReceiver<AdapterEvent>,
    }

    fn harness_with_timeout(query_timeout: Duration) -> Harness {
        let (adapter_port, embed) = InProcessPort::pair();
        let (events_tx, events) = mpsc::unbounded_channel();
        let adapter = VimeoAdapter::connect(Arc::new(adapter_port), events_tx, query_timeout);
        Harness {
            adapter,
            embed,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with_timeout(Duration::from_secs(2))
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
    async fn ready_registers_listeners_then_reports_duration() {
        let mut h = harness();

        embed_sends(&h.embed, json!({"event": "ready"})).await;

        let mut methods = Vec::new();
        for _ in 0..5 {
            let frame = host_frame(&h.embed).await;
            methods.push((
                frame["method"].as_str().expect("method").to_string(),
                frame.get("value").cloned(),
            ));
        }
        for event in LISTENED_EVENTS {
            assert!(
                methods
                    .iter()
                    .any(|(m, v)| m == "addEventListener" && v.as_ref() == Some(&json!(event))),
                "missing listener registration for {event}"
            );
        }
        assert_eq!(methods.last().map(|(m, _)| m.as_str()), Some("getDuration"));

        embed_sends(&h.embed, json!({"method": "getDuration", "value": 127.3})).await;
        assert_eq!(
            next_event(&mut h.events).await,
            AdapterEvent::Loaded { duration: 127.3 }
        );
        let duration = h.adapter.duration().await.expect("duration");
        assert!((duration - 127.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unanswered_duration_request_is_asked_again() {
        let mut h = harness_with_timeout(Duration::from_millis(100));

        embed_sends(&h.embed, json!({"event": "ready"})).await;
        for _ in 0..LISTENED_EVENTS.len() {
            let frame = host_frame(&h.embed).await;
            assert_eq!(frame["method"], json!("addEventListener"));
        }
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["method"], json!("getDuration"));

        // First ask goes unanswered; the second one gets the reply.
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["method"], json!("getDuration"));
        embed_sends(&h.embed, json!({"method": "getDuration", "value": 48.0})).await;

        assert_eq!(
            next_event(&mut h.events).await,
            AdapterEvent::Loaded { duration: 48.0 }
        );
        let duration = h.adapter.duration().await.expect("duration");
        assert!((duration - 48.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn duration_query_reports_loaded_when_ready_went_unanswered() {
        let mut h = harness_with_timeout(Duration::from_millis(100));

        embed_sends(&h.embed, json!({"event": "ready"})).await;
        for _ in 0..LISTENED_EVENTS.len() {
            host_frame(&h.embed).await;
        }
        for _ in 0..READY_DURATION_ATTEMPTS {
            let frame = host_frame(&h.embed).await;
            assert_eq!(frame["method"], json!("getDuration"));
        }
        // Let the last unanswered request expire before querying directly.
        tokio::time::sleep(Duration::from_millis(150)).await;

        let embed = h.embed;
        let answer = tokio::spawn(async move {
            let frame = host_frame(&embed).await;
            assert_eq!(frame["method"], json!("getDuration"));
            embed_sends(&embed, json!({"method": "getDuration", "value": 212.5})).await;
        });

        let duration = h.adapter.duration().await.expect("duration");
        assert!((duration - 212.5).abs() < 1e-9);
        assert_eq!(
            next_event(&mut h.events).await,
            AdapterEvent::Loaded { duration: 212.5 }
        );
        answer.await.expect("join");
    }

    #[tokio::test]
    async fn position_is_a_request_reply_round_trip() {
        let h = harness();

        let embed = h.embed;
        let answer = tokio::spawn(async move {
            let frame = host_frame(&embed).await;
            assert_eq!(frame["method"], json!("getCurrentTime"));
            embed_sends(&embed, json!({"method": "getCurrentTime", "value": 9.25})).await;
        });

        let position = h.adapter.current_time().await.expect("current_time");
        assert!((position - 9.25).abs() < 1e-9);
        answer.await.expect("join");
    }

    #[tokio::test]
    async fn queries_time_out_when_the_embed_is_silent() {
        let h = harness_with_timeout(Duration::from_millis(50));

        let err = h.adapter.current_time().await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
    }

    #[tokio::test]
    async fn notifications_become_normalized_events() {
        let mut h = harness();

        embed_sends(&h.embed, json!({"event": "play", "data": {}})).await;
        assert_eq!(next_event(&mut h.events).await, AdapterEvent::Play);
        assert!(h.adapter.is_playing().await.expect("is_playing"));

        embed_sends(&h.embed, json!({"event": "pause"})).await;
        assert_eq!(next_event(&mut h.events).await, AdapterEvent::Pause);

        embed_sends(&h.embed, json!({"event": "finish"})).await;
        assert_eq!(next_event(&mut h.events).await, AdapterEvent::Ended);
        assert!(!h.adapter.is_playing().await.expect("is_playing"));

        embed_sends(
            &h.embed,
            json!({"event": "error", "data": {"message": "media not found", "name": "NotFoundError"}}),
        )
        .await;
        match next_event(&mut h.events).await {
            AdapterEvent::Error { message } => assert!(message.contains("not found")),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn volume_passes_through_unscaled() {
        let h = harness();

        h.adapter.set_volume(0.4).await.expect("set_volume");
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["method"], json!("setVolume"));
        assert_eq!(frame["value"], json!(0.4));

        h.adapter.seek(31.5).await.expect("seek");
        let frame = host_frame(&h.embed).await;
        assert_eq!(frame["method"], json!("setCurrentTime"));
        assert_eq!(frame["value"], json!(31.5));
    }
}
