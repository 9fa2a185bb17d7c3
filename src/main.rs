use playhead::chapters::ChapterInfo;
use playhead::playback::{LocalEngine, PlaybackProgress, RemoteTransport, TransportError};
use playhead::time::format_time;
use playhead::{Millis, PlaybackController, PlayheadConfig};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

/// Cast receiver stand-in whose position advances with wall time while playing
struct SimulatedReceiver {
    state: Mutex<ReceiverState>,
}

struct ReceiverState {
    anchor: Millis,
    since: Option<Instant>,
}

impl SimulatedReceiver {
    fn new(start: Millis) -> Self {
        SimulatedReceiver {
            state: Mutex::new(ReceiverState {
                anchor: start,
                since: Some(Instant::now()),
            }),
        }
    }

    fn position(state: &ReceiverState) -> Millis {
        match state.since {
            Some(since) => Millis(state.anchor.as_u64() + since.elapsed().as_millis() as u64),
            None => state.anchor,
        }
    }
}

#[async_trait::async_trait]
impl RemoteTransport for SimulatedReceiver {
    async fn play(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.since.is_none() {
            state.since = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let position = Self::position(&state);
        state.anchor = position;
        state.since = None;
        Ok(())
    }

    async fn seek(&self, position: Millis) -> Result<(), TransportError> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.anchor = position;
        if state.since.is_some() {
            state.since = Some(Instant::now());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<Option<Millis>, TransportError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(Self::position(&state)))
    }

    async fn get_position(&self) -> Result<Option<Millis>, TransportError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Some(Self::position(&state)))
    }
}

/// Local engine that only logs what it is asked to do
struct LoggingEngine;

impl LocalEngine for LoggingEngine {
    fn play(&self) {
        info!("engine: play");
    }

    fn pause(&self) {
        info!("engine: pause");
    }

    fn seek(&self, position: Millis) {
        info!("engine: seek to {}", position);
    }
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let config = PlayheadConfig::load();
    let runtime_handle = tokio::runtime::Handle::current();
    let mut controller = PlaybackController::new(Arc::new(LoggingEngine), config, runtime_handle);

    let mut progress_rx = controller.subscribe();
    tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            match progress {
                PlaybackProgress::PositionUpdate {
                    position,
                    duration,
                    source,
                } => info!(
                    "position {} / {} ({:?})",
                    format_time(position.as_u64() as f64),
                    format_time(duration.as_u64() as f64),
                    source
                ),
                other => info!("{:?}", other),
            }
        }
    });

    let duration = Millis::from_secs(45 * 60);
    controller.set_chapters(vec![
        ChapterInfo::new(Millis::ZERO, "Opening"),
        ChapterInfo::new(Millis::from_secs(10 * 60), "Middle"),
        ChapterInfo::new(Millis::from_secs(30 * 60), "Finale"),
    ]);
    controller.play();
    controller.on_local_position(Millis::from_secs(12 * 60), duration);
    if let Some(chapter) = controller.current_chapter() {
        info!("In chapter: {}", chapter.display_name());
    }

    let receiver = Arc::new(SimulatedReceiver::new(controller.displayed_position()));
    controller.attach_remote(receiver).await;
    controller.cast_connecting("Living Room TV");
    let media = controller.media_here("Demo Episode");
    controller.cast_connected(media);
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    controller.skip(30);
    controller.skip(30);
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    controller.next_chapter();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let handoff = controller.stop_casting().await;
    info!("Back on the local engine at {}", format_time(handoff.as_u64() as f64));

    tokio::time::sleep(Duration::from_millis(100)).await;
}
