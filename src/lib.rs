// Library exports for the playback core and integration tests

pub mod chapters;
pub mod config;
pub mod playback;
pub mod segments;
pub mod sleep_timer;
pub mod subtitles;
pub mod time;

pub use config::PlayheadConfig;
pub use playback::{PlaybackController, PlaybackProgress, PositionFacade};
pub use time::{Millis, Ticks};

// Test support (unit tests, or the test-utils feature for integration tests)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
