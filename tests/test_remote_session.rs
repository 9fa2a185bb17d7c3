#![cfg(feature = "test-utils")]

mod support;

use playhead::playback::{
    CastMediaInfo, ConnectionState, PlaybackPosition, PlaybackProgress, PositionFacade, SeekState,
    SessionHandle, SessionService, TransportOp,
};
use playhead::test_support::{MockTransport, TransportCall};
use playhead::{Millis, PlayheadConfig};
use std::sync::Arc;
use std::time::Duration;
use support::{drain, settle, tracing_init};
use tokio::sync::mpsc as tokio_mpsc;

struct Harness {
    transport: Arc<MockTransport>,
    facade: PositionFacade,
    session: SessionHandle,
    progress_rx: tokio_mpsc::UnboundedReceiver<PlaybackProgress>,
}

fn start_with(config: PlayheadConfig) -> Harness {
    tracing_init();
    let transport = Arc::new(MockTransport::new());
    let (progress_tx, progress_rx) = tokio_mpsc::unbounded_channel();
    let facade = PositionFacade::new(progress_tx.clone());
    let session = SessionService::start(
        transport.clone(),
        facade.clone(),
        progress_tx,
        &config,
        &tokio::runtime::Handle::current(),
    );
    Harness {
        transport,
        facade,
        session,
        progress_rx,
    }
}

fn start() -> Harness {
    start_with(PlayheadConfig::default())
}

fn media(start: u64, duration: u64) -> CastMediaInfo {
    CastMediaInfo {
        title: "Episode".to_string(),
        start_position: Millis(start),
        duration: Millis(duration),
        ..CastMediaInfo::default()
    }
}

async fn connect(h: &Harness, start: u64, duration: u64) {
    h.session.begin_connecting("Living Room");
    h.session.connected(media(start, duration));
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_seeds_position_and_polls_on_cadence() {
    let mut h = start();
    h.transport.set_position(Millis(12_000));

    h.session.begin_connecting("Living Room");
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Connecting);
    assert_eq!(h.transport.poll_count(), 0);

    h.session.connected(media(10_000, 600_000));
    settle().await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.state.device_name.as_deref(), Some("Living Room"));
    assert!(snapshot.session_id.is_some());
    assert!(snapshot.is_playing);

    // First poll fires immediately
    assert_eq!(h.transport.poll_count(), 1);
    assert_eq!(h.facade.displayed_position(), Millis(12_000));
    assert_eq!(h.facade.duration(), Millis(600_000));

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(h.transport.poll_count(), 4);

    let events = drain(&mut h.progress_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackProgress::SessionChanged { state } if state.connection_state == ConnectionState::Connected
    )));
}

#[tokio::test(start_paused = true)]
async fn test_polling_follows_visibility() {
    let h = start();
    connect(&h, 0, 600_000).await;
    assert_eq!(h.transport.poll_count(), 1);

    h.session.set_visible(false);
    h.session.set_visible(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.transport.poll_count(), 1);

    h.session.set_visible(true);
    settle().await;
    assert_eq!(h.transport.poll_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_poll_is_not_overlapped() {
    let h = start();
    h.transport.set_position(Millis(5_000));
    h.transport.set_position_delay(Duration::from_millis(2_500));
    connect(&h, 0, 600_000).await;

    // Ticks at 1s and 2s find the first poll still outstanding
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(h.transport.poll_count(), 1);
    assert_eq!(h.facade.displayed_position(), Millis(5_000));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_polling_and_drops_late_results() {
    let mut h = start();
    h.transport.set_position(Millis(20_000));
    connect(&h, 0, 600_000).await;
    assert_eq!(h.facade.displayed_position(), Millis(20_000));

    // Next poll answers slowly and lands after the disconnect
    h.transport.set_position_delay(Duration::from_millis(1_500));
    h.transport.set_position(Millis(99_000));
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    h.transport.set_stop_position(Some(Millis(42_000)));
    let handoff = h.session.disconnect().await.unwrap();
    assert_eq!(handoff, Millis(42_000));
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
    assert!(!h.facade.is_remote());

    let polls_at_disconnect = h.transport.poll_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    // The slow poll completes once, nothing new is issued
    assert!(h.transport.poll_count() <= polls_at_disconnect + 1);
    assert_eq!(h.facade.remote_position(), None);
    assert_ne!(h.facade.displayed_position(), Millis(99_000));

    let events = drain(&mut h.progress_rx);
    assert!(events.contains(&PlaybackProgress::Handoff {
        position: Millis(42_000)
    }));
}

#[tokio::test(start_paused = true)]
async fn test_handoff_falls_back_to_tracked_position() {
    // Receiver has no position to report
    let h = start();
    h.transport.set_position(Millis(77_000));
    connect(&h, 10_000, 600_000).await;
    h.transport.set_stop_position(None);
    assert_eq!(h.session.disconnect().await.unwrap(), Millis(77_000));

    // Zero means "unknown" too
    let h = start();
    h.transport.set_position(Millis(81_000));
    connect(&h, 10_000, 600_000).await;
    h.transport.set_stop_position(Some(Millis::ZERO));
    assert_eq!(h.session.disconnect().await.unwrap(), Millis(81_000));

    // Stop errors out
    let mut h = start();
    h.transport.set_position(Millis(83_000));
    connect(&h, 10_000, 600_000).await;
    h.transport.fail(TransportOp::Stop);
    assert_eq!(h.session.disconnect().await.unwrap(), Millis(83_000));
    assert!(drain(&mut h.progress_rx).iter().any(|e| matches!(
        e,
        PlaybackProgress::TransportFailed {
            operation: TransportOp::Stop,
            ..
        }
    )));

    // Stop never answers
    let h = start();
    h.transport.set_position(Millis(85_000));
    connect(&h, 10_000, 600_000).await;
    h.transport.set_stop_delay(Duration::from_secs(60));
    assert_eq!(h.session.disconnect().await.unwrap(), Millis(85_000));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_session_uses_displayed_position() {
    let h = start();
    assert_eq!(h.session.disconnect().await.unwrap(), Millis::ZERO);
    assert!(!h.transport.calls().contains(&TransportCall::Stop));

    // Cancelling a connect attempt does not talk to the receiver either
    h.session.begin_connecting("Kitchen");
    settle().await;
    assert_eq!(h.session.disconnect().await.unwrap(), Millis::ZERO);
    assert!(!h.transport.calls().contains(&TransportCall::Stop));
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_only_one_seek_in_flight() {
    let h = start();
    h.transport.set_position(Millis(10_000));
    connect(&h, 10_000, 600_000).await;
    h.transport.hold_seeks();

    let first = h.facade.commit_seek(Millis(100_000)).unwrap();
    h.session.seek(first);
    settle().await;
    assert_eq!(h.transport.seeks_in_progress(), 1);

    // Everything below queues behind the first seek; the latest wins
    assert!(h.facade.commit_seek(Millis(110_000)).is_none());
    assert!(h.facade.commit_seek(Millis(200_000)).is_none());
    h.facade.begin_seek();
    h.facade.update_seek(Millis(300_000));
    assert!(h.facade.end_seek().is_none());
    settle().await;
    assert_eq!(h.transport.seeks(), vec![Millis(100_000)]);

    // Polls are ignored while a seek is held
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(h.facade.displayed_position(), Millis(300_000));

    h.transport.release_seek();
    settle().await;
    assert_eq!(h.transport.seeks(), vec![Millis(100_000), Millis(300_000)]);
    assert_eq!(
        h.facade.seek_state(),
        SeekState::Committing {
            target: Millis(300_000)
        }
    );

    h.transport.release_seek();
    settle().await;
    assert!(h.facade.seek_state().is_idle());
    assert_eq!(h.facade.displayed_position(), Millis(300_000));
    assert_eq!(h.transport.max_concurrent_seeks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_seek_reports_and_reverts() {
    let mut h = start();
    h.transport.set_position(Millis(10_000));
    connect(&h, 10_000, 600_000).await;
    h.transport.fail(TransportOp::Seek);

    let request = h.facade.commit_seek(Millis(50_000)).unwrap();
    h.session.seek(request);
    settle().await;

    assert!(h.facade.seek_state().is_idle());
    assert_eq!(h.facade.displayed_position(), Millis(10_000));
    let events = drain(&mut h.progress_rx);
    assert!(events.contains(&PlaybackProgress::SeekCompleted {
        target: Millis(50_000),
        succeeded: false
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackProgress::TransportFailed {
            operation: TransportOp::Seek,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_seek_result_after_disconnect_is_dropped() {
    let mut h = start();
    connect(&h, 10_000, 600_000).await;
    h.transport.hold_seeks();

    let request = h.facade.commit_seek(Millis(90_000)).unwrap();
    h.session.seek(request);
    settle().await;

    h.transport.set_stop_position(Some(Millis(15_000)));
    h.session.disconnect().await.unwrap();
    drain(&mut h.progress_rx);

    h.transport.release_seek();
    settle().await;
    let events = drain(&mut h.progress_rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlaybackProgress::SeekCompleted { .. })));
    assert!(h.facade.seek_state().is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_play_pause_is_optimistic() {
    let mut h = start();
    connect(&h, 0, 600_000).await;
    drain(&mut h.progress_rx);

    h.session.toggle_play_pause();
    settle().await;
    assert!(!h.session.is_playing());
    assert!(h.transport.calls().contains(&TransportCall::Pause));

    h.transport.fail(TransportOp::Play);
    h.session.play();
    settle().await;
    // No rollback unless configured
    assert!(h.session.is_playing());
    let events = drain(&mut h.progress_rx);
    assert!(events.contains(&PlaybackProgress::PlayStateChanged { is_playing: false }));
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackProgress::TransportFailed {
            operation: TransportOp::Play,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_play_state_reverts_when_configured() {
    let config = PlayheadConfig {
        revert_play_state_on_failure: true,
        ..PlayheadConfig::default()
    };
    let h = start_with(config);
    connect(&h, 0, 600_000).await;

    h.transport.fail(TransportOp::Pause);
    h.session.pause();
    settle().await;
    assert!(h.session.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_transitions_are_ignored() {
    let h = start();

    h.session.connected(media(0, 1_000));
    h.session.connection_failed();
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
    assert!(!h.facade.is_remote());

    h.session.play();
    settle().await;
    assert!(h.transport.calls().is_empty());

    h.session.begin_connecting("Den");
    h.session.connection_failed();
    settle().await;
    assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.transport.poll_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_ends_remote_ownership() {
    let mut h = start();
    h.transport.set_position(Millis(30_000));
    connect(&h, 0, 600_000).await;
    assert!(h.facade.is_remote());

    drop(h.session);
    settle().await;
    assert!(!h.facade.is_remote());

    h.facade.apply_local(PlaybackPosition::new(Millis(9_000), Millis(600_000)));
    assert_eq!(h.facade.displayed_position(), Millis(9_000));
    let events = drain(&mut h.progress_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackProgress::SessionChanged { state } if state.connection_state == ConnectionState::Disconnected
    )));
}

#[tokio::test(start_paused = true)]
async fn test_zero_poll_interval_is_clamped() {
    let config: PlayheadConfig =
        serde_json::from_str(r#"{"sleep_timer_tick_ms":0,"poll_interval_ms":0}"#).unwrap();
    let h = start_with(config);
    h.transport.set_position(Millis(4_000));
    connect(&h, 0, 600_000).await;
    assert_eq!(h.facade.displayed_position(), Millis(4_000));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.transport.poll_count() > 1);
    assert_eq!(h.session.disconnect().await.unwrap(), Millis(4_000));
}
