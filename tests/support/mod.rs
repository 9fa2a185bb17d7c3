use playhead::playback::PlaybackProgress;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Let spawned tasks run to quiescence. With a paused clock the runtime only
/// advances time once nothing else is runnable.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Everything published so far
pub fn drain(rx: &mut tokio_mpsc::UnboundedReceiver<PlaybackProgress>) -> Vec<PlaybackProgress> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
