mod controller;
mod facade;
pub mod progress;
mod seek;
pub mod session;
pub mod transport;

pub use controller::PlaybackController;
pub use facade::{PlaybackPosition, PositionFacade};
pub use progress::{PlaybackProgress, PlaybackProgressHandle, PositionSource};
pub use seek::{SeekArbiter, SeekRequest, SeekState};
pub use session::{
    CastMediaInfo, CastSessionState, ConnectionState, SessionError, SessionHandle, SessionService,
    SessionSnapshot,
};
pub use transport::{LocalEngine, RemoteTransport, TransportError, TransportOp};
