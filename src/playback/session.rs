use crate::config::PlayheadConfig;
use crate::playback::facade::{PlaybackPosition, PositionFacade};
use crate::playback::progress::PlaybackProgress;
use crate::playback::seek::SeekRequest;
use crate::playback::transport::{RemoteTransport, TransportError, TransportOp};
use crate::time::Millis;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::sync::oneshot;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cast session service is no longer running")]
    ServiceStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CastSessionState {
    pub connection_state: ConnectionState,
    pub device_name: Option<String>,
}

/// What the receiver was asked to load when the session connected
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CastMediaInfo {
    pub title: String,
    pub subtitle: Option<String>,
    pub image_url: Option<String>,
    pub start_position: Millis,
    pub duration: Millis,
}

/// Point-in-time view of the session, readable without a round trip
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub state: CastSessionState,
    pub is_playing: bool,
    pub media: Option<CastMediaInfo>,
}

#[derive(Debug)]
enum SessionCommand {
    BeginConnecting { device_name: String },
    Connected { media: CastMediaInfo },
    ConnectionFailed,
    SetVisible(bool),
    Play,
    Pause,
    TogglePlayPause,
    Seek(SeekRequest),
    Disconnect { reply: oneshot::Sender<Millis> },
}

/// Results of transport calls, tagged with the session generation that issued them
#[derive(Debug)]
enum SessionEvent {
    Polled {
        generation: u64,
        result: Result<Option<Millis>, TransportError>,
    },
    SeekDone {
        generation: u64,
        request: SeekRequest,
        result: Result<(), TransportError>,
    },
    PlayStateDone {
        generation: u64,
        is_playing: bool,
        result: Result<(), TransportError>,
    },
}

/// Handle to the cast session service for sending commands
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: tokio_mpsc::UnboundedSender<SessionCommand>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl SessionHandle {
    pub fn begin_connecting(&self, device_name: impl Into<String>) {
        let _ = self.command_tx.send(SessionCommand::BeginConnecting {
            device_name: device_name.into(),
        });
    }

    pub fn connected(&self, media: CastMediaInfo) {
        let _ = self.command_tx.send(SessionCommand::Connected { media });
    }

    pub fn connection_failed(&self) {
        let _ = self.command_tx.send(SessionCommand::ConnectionFailed);
    }

    /// Polling only runs while the player surface is visible
    pub fn set_visible(&self, visible: bool) {
        let _ = self.command_tx.send(SessionCommand::SetVisible(visible));
    }

    pub fn play(&self) {
        let _ = self.command_tx.send(SessionCommand::Play);
    }

    pub fn pause(&self) {
        let _ = self.command_tx.send(SessionCommand::Pause);
    }

    pub fn toggle_play_pause(&self) {
        let _ = self.command_tx.send(SessionCommand::TogglePlayPause);
    }

    /// Issue a seek produced by the [`PositionFacade`]
    pub fn seek(&self, request: SeekRequest) {
        let _ = self.command_tx.send(SessionCommand::Seek(request));
    }

    /// End the session and return the position local playback should resume at
    pub async fn disconnect(&self) -> Result<Millis, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Disconnect { reply })
            .map_err(|_| SessionError::ServiceStopped)?;
        rx.await.map_err(|_| SessionError::ServiceStopped)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot().state.connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot().is_playing
    }
}

/// Owns one cast receiver connection: its lifecycle, position polling, and
/// the transport calls for play/pause/seek/stop.
///
/// Every transport call is tagged with the generation current when it was
/// issued. The generation moves on each connect attempt and each disconnect,
/// so results from an earlier session are dropped instead of applied.
pub struct SessionService {
    transport: Arc<dyn RemoteTransport>,
    facade: PositionFacade,
    progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
    command_rx: tokio_mpsc::UnboundedReceiver<SessionCommand>,
    event_tx: tokio_mpsc::UnboundedSender<SessionEvent>,
    event_rx: tokio_mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
    poll_every: Duration,
    disconnect_timeout: Duration,
    revert_play_state_on_failure: bool,
    generation: u64,
    poll_interval: Option<Interval>,
    poll_in_flight: bool,
    visible: bool,
}

impl SessionService {
    pub fn start(
        transport: Arc<dyn RemoteTransport>,
        facade: PositionFacade,
        progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
        config: &PlayheadConfig,
        runtime_handle: &tokio::runtime::Handle,
    ) -> SessionHandle {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();
        let snapshot = Arc::new(Mutex::new(SessionSnapshot::default()));

        let service = SessionService {
            transport,
            facade,
            progress_tx,
            command_rx,
            event_tx,
            event_rx,
            snapshot: snapshot.clone(),
            poll_every: config.poll_interval(),
            disconnect_timeout: config.disconnect_timeout(),
            revert_play_state_on_failure: config.revert_play_state_on_failure,
            generation: 0,
            poll_interval: None,
            poll_in_flight: false,
            visible: true,
        };
        runtime_handle.spawn(service.run());

        SessionHandle {
            command_tx,
            snapshot,
        }
    }

    async fn run(mut self) {
        info!("SessionService started");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                _ = next_tick(&mut self.poll_interval) => self.poll(),
            }
        }

        if self.connection_state() == ConnectionState::Connected {
            warn!("SessionService dropped while connected, returning position to local playback");
            self.stop_polling();
            self.facade.end_remote();
            self.set_state(CastSessionState::default());
        }
        info!("SessionService stopped, all handles dropped");
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection_state(&self) -> ConnectionState {
        self.lock_snapshot().state.connection_state
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::BeginConnecting { device_name } => self.begin_connecting(device_name),
            SessionCommand::Connected { media } => self.connected(media),
            SessionCommand::ConnectionFailed => self.connection_failed(),
            SessionCommand::SetVisible(visible) => {
                self.visible = visible;
                self.sync_polling();
            }
            SessionCommand::Play => self.set_playing(true),
            SessionCommand::Pause => self.set_playing(false),
            SessionCommand::TogglePlayPause => {
                let is_playing = self.lock_snapshot().is_playing;
                self.set_playing(!is_playing);
            }
            SessionCommand::Seek(request) => self.dispatch_seek(Some(request)),
            SessionCommand::Disconnect { reply } => {
                let position = self.disconnect().await;
                let _ = reply.send(position);
            }
        }
    }

    fn begin_connecting(&mut self, device_name: String) {
        if self.connection_state() != ConnectionState::Disconnected {
            warn!("Ignoring connect to {}: a session is already active", device_name);
            return;
        }
        info!("Connecting to cast device {}", device_name);
        self.generation += 1;
        self.set_state(CastSessionState {
            connection_state: ConnectionState::Connecting,
            device_name: Some(device_name),
        });
    }

    fn connected(&mut self, media: CastMediaInfo) {
        if self.connection_state() != ConnectionState::Connecting {
            warn!("Ignoring connected notification outside of connecting");
            return;
        }

        let seed = PlaybackPosition::new(media.start_position, media.duration);
        let device_name = {
            let mut snapshot = self.lock_snapshot();
            snapshot.session_id = Some(Uuid::new_v4());
            snapshot.is_playing = true;
            snapshot.media = Some(media);
            snapshot.state.device_name.clone()
        };
        info!(
            "Cast session connected to {} at {}",
            device_name.as_deref().unwrap_or("unknown device"),
            seed.position
        );

        self.facade.begin_remote(seed);
        self.set_state(CastSessionState {
            connection_state: ConnectionState::Connected,
            device_name,
        });
        let _ = self
            .progress_tx
            .send(PlaybackProgress::PlayStateChanged { is_playing: true });
        self.sync_polling();
    }

    fn connection_failed(&mut self) {
        if self.connection_state() != ConnectionState::Connecting {
            warn!("Ignoring connection failure outside of connecting");
            return;
        }
        warn!("Cast connection failed");
        self.generation += 1;
        self.set_state(CastSessionState::default());
    }

    fn set_state(&self, state: CastSessionState) {
        self.lock_snapshot().state = state.clone();
        let _ = self
            .progress_tx
            .send(PlaybackProgress::SessionChanged { state });
    }

    /// Start or stop polling to match "connected and visible"
    fn sync_polling(&mut self) {
        let should_poll = self.visible && self.connection_state() == ConnectionState::Connected;
        match (should_poll, self.poll_interval.is_some()) {
            (true, false) => {
                debug!("Starting position polling every {:?}", self.poll_every);
                let mut interval = tokio::time::interval(self.poll_every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.poll_interval = Some(interval);
            }
            (false, true) => self.stop_polling(),
            _ => {}
        }
    }

    fn stop_polling(&mut self) {
        if self.poll_interval.take().is_some() {
            debug!("Stopped position polling");
        }
    }

    fn poll(&mut self) {
        if self.poll_in_flight {
            trace!("Previous position poll still outstanding, skipping tick");
            return;
        }
        self.poll_in_flight = true;

        let transport = self.transport.clone();
        let event_tx = self.event_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = transport.get_position().await;
            let _ = event_tx.send(SessionEvent::Polled { generation, result });
        });
    }

    fn set_playing(&mut self, is_playing: bool) {
        if self.connection_state() != ConnectionState::Connected {
            warn!("Ignoring play/pause with no connected cast session");
            return;
        }

        self.lock_snapshot().is_playing = is_playing;
        let _ = self
            .progress_tx
            .send(PlaybackProgress::PlayStateChanged { is_playing });

        let transport = self.transport.clone();
        let event_tx = self.event_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = if is_playing {
                transport.play().await
            } else {
                transport.pause().await
            };
            let _ = event_tx.send(SessionEvent::PlayStateDone {
                generation,
                is_playing,
                result,
            });
        });
    }

    /// Send `request` to the receiver. Without a connected session the seek
    /// fails straight away, which may release a queued one; keep going until
    /// nothing is left to issue.
    fn dispatch_seek(&mut self, mut request: Option<SeekRequest>) {
        while let Some(current) = request {
            if self.connection_state() == ConnectionState::Connected {
                debug!("Seeking receiver to {}", current.target);
                let transport = self.transport.clone();
                let event_tx = self.event_tx.clone();
                let generation = self.generation;
                tokio::spawn(async move {
                    let result = transport.seek(current.target).await;
                    let _ = event_tx.send(SessionEvent::SeekDone {
                        generation,
                        request: current,
                        result,
                    });
                });
                return;
            }

            warn!("No connected cast session for seek to {}", current.target);
            request = self.facade.resolve_seek(current, false);
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Polled { generation, result } => {
                if generation != self.generation {
                    debug!("Dropping position poll from an earlier session");
                    return;
                }
                self.poll_in_flight = false;
                match result {
                    Ok(Some(position)) => {
                        self.facade.apply_remote_poll(position);
                    }
                    Ok(None) => trace!("Receiver reported no position"),
                    Err(e) => debug!("Position poll failed: {}", e),
                }
            }
            SessionEvent::SeekDone {
                generation,
                request,
                result,
            } => {
                if generation != self.generation {
                    debug!("Dropping seek result from an earlier session");
                    return;
                }
                let succeeded = match result {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Seek to {} failed: {}", request.target, e);
                        self.report_failure(TransportOp::Seek, &e);
                        false
                    }
                };
                let next = self.facade.resolve_seek(request, succeeded);
                self.dispatch_seek(next);
            }
            SessionEvent::PlayStateDone {
                generation,
                is_playing,
                result,
            } => {
                if generation != self.generation {
                    return;
                }
                let Err(e) = result else {
                    return;
                };
                let operation = if is_playing {
                    TransportOp::Play
                } else {
                    TransportOp::Pause
                };
                warn!("{} failed on receiver: {}", operation, e);
                self.report_failure(operation, &e);

                if self.revert_play_state_on_failure {
                    let mut snapshot = self.lock_snapshot();
                    // Only undo our own flip; a later command owns the state otherwise
                    if snapshot.is_playing == is_playing {
                        snapshot.is_playing = !is_playing;
                        drop(snapshot);
                        let _ = self.progress_tx.send(PlaybackProgress::PlayStateChanged {
                            is_playing: !is_playing,
                        });
                    }
                }
            }
        }
    }

    fn report_failure(&self, operation: TransportOp, error: &TransportError) {
        let _ = self.progress_tx.send(PlaybackProgress::TransportFailed {
            operation,
            message: error.to_string(),
        });
    }

    /// Tear the session down and work out where local playback resumes: the
    /// receiver's own stop position if it reports a non-zero one, else the last
    /// position we tracked for it, else whatever is on screen.
    async fn disconnect(&mut self) -> Millis {
        let state = self.connection_state();
        self.generation += 1;
        self.poll_in_flight = false;
        self.stop_polling();

        if state == ConnectionState::Disconnected {
            debug!("Disconnect with no cast session");
            return self.facade.displayed_position();
        }

        let stopped_at = if state == ConnectionState::Connected {
            match tokio::time::timeout(self.disconnect_timeout, self.transport.stop()).await {
                Ok(Ok(position)) => position.filter(|p| *p > Millis::ZERO),
                Ok(Err(e)) => {
                    warn!("Stopping receiver failed: {}", e);
                    self.report_failure(TransportOp::Stop, &e);
                    None
                }
                Err(_) => {
                    warn!("Stopping receiver timed out after {:?}", self.disconnect_timeout);
                    None
                }
            }
        } else {
            None
        };

        let displayed = self.facade.displayed_position();
        let tracked = self.facade.end_remote().map(|remote| remote.position);
        let handoff = stopped_at.or(tracked).unwrap_or(displayed);

        {
            let mut snapshot = self.lock_snapshot();
            snapshot.session_id = None;
            snapshot.is_playing = false;
            snapshot.media = None;
        }
        self.set_state(CastSessionState::default());

        info!("Cast session ended, handing off at {}", handoff);
        let _ = self
            .progress_tx
            .send(PlaybackProgress::Handoff { position: handoff });
        handoff
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
