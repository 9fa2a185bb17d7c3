use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Media-server ticks per millisecond (10,000,000 ticks = 1 second)
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// A position or length in media-server ticks (100 ns units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticks(pub i64);

/// A position or length in milliseconds.
///
/// Everything inside the core works in `Millis`; `Ticks` only appear at the
/// chapter-data boundary and must be converted with [`ticks_to_ms`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millis(pub u64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    pub const fn from_secs(secs: u64) -> Self {
        Millis(secs * 1000)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Convert an untrusted float (e.g. a player reporting `NaN` before load) into
    /// a valid position. NaN and negatives become zero, infinities saturate.
    pub fn from_f64_lossy(ms: f64) -> Self {
        if ms.is_nan() || ms <= 0.0 {
            Millis::ZERO
        } else if ms >= u64::MAX as f64 {
            Millis(u64::MAX)
        } else {
            Millis(ms.floor() as u64)
        }
    }

    /// Add a signed delta, clamping at zero.
    pub fn saturating_add_signed(self, delta_ms: i64) -> Self {
        Millis(self.0.saturating_add_signed(delta_ms))
    }

    pub fn saturating_sub(self, other: Millis) -> Self {
        Millis(self.0.saturating_sub(other.0))
    }

    /// Clamp into `[0, duration]`. An unknown (zero) duration leaves the value as is.
    pub fn clamp_to_duration(self, duration: Millis) -> Self {
        if duration == Millis::ZERO {
            self
        } else {
            self.min(duration)
        }
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for Millis {
    fn from(duration: Duration) -> Self {
        Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_time(self.0 as f64))
    }
}

/// Convert ticks to milliseconds: `floor(ticks / 10000)`, negatives clamp to zero.
pub fn ticks_to_ms(ticks: Ticks) -> Millis {
    let ms = ticks.0.div_euclid(TICKS_PER_MILLISECOND);
    Millis(u64::try_from(ms).unwrap_or(0))
}

pub fn ms_to_ticks(ms: Millis) -> Ticks {
    let ms = i64::try_from(ms.0).unwrap_or(i64::MAX);
    Ticks(ms.saturating_mul(TICKS_PER_MILLISECOND))
}

fn split_hms(ms: f64) -> (u64, u64, u64) {
    let total_seconds = Millis::from_f64_lossy(ms).0 / 1000;
    (
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
    )
}

/// Format a position for a player clock: `H:MM:SS` from one hour up, else `M:SS`.
///
/// Invalid input (negative, NaN) renders as `0:00`.
pub fn format_time(ms: f64) -> String {
    let (hours, minutes, seconds) = split_hms(ms);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Format a length for labels, e.g. `"2h 30m"` or `"45m 30s"`.
pub fn format_duration(ms: f64, include_seconds: bool) -> String {
    if ms.is_nan() || ms <= 0.0 {
        return "0m".to_string();
    }

    let (hours, minutes, seconds) = split_hms(ms);
    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 || hours > 0 {
        parts.push(format!("{}m", minutes));
    }
    if include_seconds && (seconds > 0 || parts.is_empty()) {
        parts.push(format!("{}s", seconds));
    }

    if parts.is_empty() {
        "0m".to_string()
    } else {
        parts.join(" ")
    }
}
