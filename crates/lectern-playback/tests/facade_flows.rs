//! Facade flows against scripted provider embeds.
//!
//! These tests run the real adapters over in-process ports, with the far
//! side played by testkit embeds speaking the actual provider dialects.

use lectern_core::{BackendKind, Clock, MediaSource, PlaybackConfig};
use lectern_playback::{PlaybackEvent, PlaybackService};
use lectern_testkit::{FakeConnector, ManualClock, RecordedCommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn test_config() -> PlaybackConfig {
    PlaybackConfig {
        poll_interval: Duration::from_millis(25),
        native_tick_interval: Duration::from_millis(10),
        provider_query_timeout: Duration::from_secs(1),
    }
}

fn service_with(
    connector: &Arc<FakeConnector>,
) -> (PlaybackService, mpsc::UnboundedReceiver<PlaybackEvent>) {
    lectern_testkit::init_test_logging();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    PlaybackService::new(Arc::clone(connector) as _, clock, test_config())
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> PlaybackEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event within deadline")
        .expect("event stream open")
}

/// Drain events until one satisfies the predicate; ticks and other noise
/// in between are skipped.
async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
    mut matching: impl FnMut(&PlaybackEvent) -> bool,
) -> PlaybackEvent {
    for _ in 0..64 {
        let event = next_event(events).await;
        if matching(&event) {
            return event;
        }
    }
    panic!("expected event never arrived");
}

#[tokio::test]
async fn provider_ready_reports_duration() {
    let connector = Arc::new(FakeConnector::new());
    connector.set_duration("dQw4w9WgXcQ", 212.0);
    let (service, mut events) = service_with(&connector);

    let session_id = service
        .activate(&MediaSource::new(BackendKind::YouTube, "dQw4w9WgXcQ"))
        .await
        .expect("activate");

    let ready = wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;
    assert_eq!(
        ready,
        PlaybackEvent::SessionReady {
            session_id,
            duration: 212.0
        }
    );

    let snapshot = service.snapshot().await.expect("snapshot");
    assert!(snapshot.ready);
    assert_eq!(snapshot.backend, BackendKind::YouTube);
    assert!((snapshot.duration_seconds - 212.0).abs() < 1e-9);
}

#[tokio::test]
async fn calls_before_ready_replay_in_order_with_real_outcomes() {
    let connector = Arc::new(FakeConnector::holding_ready());
    connector.set_duration("dQw4w9WgXcQ", 120.0);
    let (service, mut events) = service_with(&connector);
    let service = Arc::new(service);

    service
        .activate(&MediaSource::new(BackendKind::YouTube, "dQw4w9WgXcQ"))
        .await
        .expect("activate");

    let play = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.play().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let seek = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.seek(30.0).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let position = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.current_time().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Nothing may reach the embed while the session is not ready.
    let player = connector.latest_player();
    assert!(player.commands().is_empty());

    player.announce_ready().await;

    assert!(play.await.expect("join").expect("play"));
    seek.await.expect("join").expect("seek");
    let position = position.await.expect("join").expect("current_time");
    assert!(position.abs() < 1e-9, "cache answered {position}");

    let commands = player.wait_for_commands(2).await;
    assert_eq!(
        commands,
        vec![RecordedCommand::Play, RecordedCommand::Seek(30.0)]
    );

    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;
    wait_for(&mut events, |e| matches!(e, PlaybackEvent::Started { .. })).await;
}

#[tokio::test]
async fn queued_calls_cancel_when_the_session_is_replaced() {
    let connector = Arc::new(FakeConnector::holding_ready());
    let (service, _events) = service_with(&connector);
    let service = Arc::new(service);

    service
        .activate(&MediaSource::new(BackendKind::YouTube, "first"))
        .await
        .expect("activate");

    let play = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.play().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    service
        .activate(&MediaSource::new(BackendKind::YouTube, "second"))
        .await
        .expect("activate");

    let err = play.await.expect("join").unwrap_err();
    assert!(err.is_cancelled(), "expected cancellation, got {err}");
}

#[tokio::test]
async fn switching_pauses_the_old_backend_before_the_new_one_loads() {
    let connector = Arc::new(FakeConnector::new());
    let (service, mut events) = service_with(&connector);

    service
        .activate(&MediaSource::new(BackendKind::YouTube, "first"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;
    assert!(service.play().await.expect("play"));
    wait_for(&mut events, |e| matches!(e, PlaybackEvent::Started { .. })).await;

    service
        .activate(&MediaSource::new(BackendKind::YouTube, "second"))
        .await
        .expect("activate");

    let players = connector.players();
    assert_eq!(players.len(), 2);
    assert_eq!(
        players[0].commands(),
        vec![
            RecordedCommand::Play,
            RecordedCommand::Pause,
            RecordedCommand::Stop
        ]
    );
    // The replacement embed has not been sent any control traffic.
    assert!(players[1].commands().is_empty());
}

#[tokio::test]
async fn provider_positions_tick_while_playing() {
    let connector = Arc::new(FakeConnector::new());
    connector.set_duration("dQw4w9WgXcQ", 60.0);
    let (service, mut events) = service_with(&connector);

    let session_id = service
        .activate(&MediaSource::new(BackendKind::YouTube, "dQw4w9WgXcQ"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;

    assert!(service.play().await.expect("play"));
    wait_for(&mut events, |e| matches!(e, PlaybackEvent::Started { .. })).await;

    connector.latest_player().push_position(3.5).await;
    let tick = wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::Tick { seconds, .. } if (*seconds - 3.5).abs() < 1e-9)
    })
    .await;
    assert_eq!(
        tick,
        PlaybackEvent::Tick {
            session_id,
            seconds: 3.5
        }
    );

    service.pause().await.expect("pause");
    wait_for(&mut events, |e| matches!(e, PlaybackEvent::Paused { .. })).await;

    // Let in-flight polls settle, then confirm the ticking stopped.
    tokio::time::sleep(Duration::from_millis(60)).await;
    while events.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(
        events.try_recv().is_err(),
        "ticks kept flowing after pause"
    );
}

#[tokio::test]
async fn provider_end_reports_final_position() {
    let connector = Arc::new(FakeConnector::new());
    connector.set_duration("dQw4w9WgXcQ", 45.0);
    let (service, mut events) = service_with(&connector);

    let session_id = service
        .activate(&MediaSource::new(BackendKind::YouTube, "dQw4w9WgXcQ"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;
    assert!(service.play().await.expect("play"));

    connector.latest_player().finish().await;
    let ended = wait_for(&mut events, |e| matches!(e, PlaybackEvent::Ended { .. })).await;
    assert_eq!(ended, PlaybackEvent::Ended { session_id });

    let snapshot = service.snapshot().await.expect("snapshot");
    assert!((snapshot.current_time_seconds - 45.0).abs() < 1e-9);
    assert!(!snapshot.playing);
}

#[tokio::test]
async fn provider_failure_surfaces_with_its_message() {
    let connector = Arc::new(FakeConnector::new());
    let (service, mut events) = service_with(&connector);

    let session_id = service
        .activate(&MediaSource::new(BackendKind::Vimeo, "90210"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;

    connector.latest_player().fail("media not found").await;
    match wait_for(&mut events, |e| matches!(e, PlaybackEvent::Failed { .. })).await {
        PlaybackEvent::Failed {
            session_id: failed_session,
            message,
        } => {
            assert_eq!(failed_session, session_id);
            assert!(message.contains("not found"), "got: {message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn player_js_position_is_a_live_round_trip() {
    let connector = Arc::new(FakeConnector::new());
    connector.set_duration("90210", 48.5);
    let (service, mut events) = service_with(&connector);

    service
        .activate(&MediaSource::new(BackendKind::Vimeo, "90210"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;

    connector.latest_player().push_position(9.0).await;
    let position = service.current_time().await.expect("current_time");
    assert!((position - 9.0).abs() < 1e-9);
}

#[tokio::test]
async fn volume_reaches_each_dialect_clamped_and_scaled() {
    let connector = Arc::new(FakeConnector::new());
    let (service, mut events) = service_with(&connector);

    service
        .activate(&MediaSource::new(BackendKind::YouTube, "dQw4w9WgXcQ"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;
    service.set_volume(1.7).await.expect("set_volume");
    service.set_volume(0.8).await.expect("set_volume");
    let widget = connector.latest_player();
    assert_eq!(
        widget.wait_for_commands(2).await,
        vec![
            RecordedCommand::SetVolume(1.0),
            RecordedCommand::SetVolume(0.8)
        ]
    );

    service
        .activate(&MediaSource::new(BackendKind::Vimeo, "90210"))
        .await
        .expect("activate");
    wait_for(&mut events, |e| {
        matches!(e, PlaybackEvent::SessionReady { .. })
    })
    .await;
    service.set_volume(0.8).await.expect("set_volume");
    let player_js = connector.latest_player();
    let commands = player_js.wait_for_commands(1).await;
    assert_eq!(commands, vec![RecordedCommand::SetVolume(0.8)]);
}
