pub mod handle;

use crate::playback::seek::SeekState;
use crate::playback::session::CastSessionState;
use crate::playback::transport::TransportOp;
use crate::time::Millis;
pub use handle::PlaybackProgressHandle;

/// Which producer moved the displayed position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    Local,
    Remote,
    Seek,
}

/// Progress updates published by the playback core
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackProgress {
    SessionChanged {
        state: CastSessionState,
    },
    PositionUpdate {
        position: Millis,
        duration: Millis,
        source: PositionSource,
    },
    PlayStateChanged {
        is_playing: bool,
    },
    SeekStateChanged {
        state: SeekState,
    },
    SeekCompleted {
        target: Millis,
        succeeded: bool,
    },
    /// Remote session ended; local playback should resume here
    Handoff {
        position: Millis,
    },
    SleepTimerExpired,
    TransportFailed {
        operation: TransportOp,
        message: String,
    },
}
