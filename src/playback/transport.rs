use crate::time::Millis;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("No active media session on the receiver")]
    NoMediaSession,
}

/// Transport call kinds, used for failure reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Play,
    Pause,
    Seek,
    Stop,
    GetPosition,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportOp::Play => "play",
            TransportOp::Pause => "pause",
            TransportOp::Seek => "seek",
            TransportOp::Stop => "stop",
            TransportOp::GetPosition => "get_position",
        };
        f.write_str(name)
    }
}

/// Cast receiver client (allows mocking for tests).
///
/// Calls have no latency bound and may resolve in any order relative to each other.
#[async_trait::async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn play(&self) -> Result<(), TransportError>;
    async fn pause(&self) -> Result<(), TransportError>;
    async fn seek(&self, position: Millis) -> Result<(), TransportError>;
    /// Stop the receiver, returning its last known position if it has one
    async fn stop(&self) -> Result<Option<Millis>, TransportError>;
    async fn get_position(&self) -> Result<Option<Millis>, TransportError>;
}

/// On-device decoder/renderer. Position and duration are pushed to the
/// [`PositionFacade`](crate::playback::PositionFacade) by the host, not pulled.
pub trait LocalEngine: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn seek(&self, position: Millis);
}
