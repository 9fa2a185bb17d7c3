use crate::time::Millis;
use serde::{Deserialize, Serialize};

/// Step used by the +/- offset buttons
pub const DEFAULT_OFFSET_STEP_MS: i64 = 100;

/// How long after its end a cue may still be shown when no later cue matches
pub const DEFAULT_CUE_GRACE: Millis = Millis(100);

/// A single timed subtitle line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub start: Millis,
    pub end: Millis,
    pub text: String,
}

/// Signed timing bias applied to subtitle cues for the current playback session.
///
/// A positive offset shows subtitles later relative to the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitleOffset {
    offset_ms: i64,
    step_ms: i64,
}

impl Default for SubtitleOffset {
    fn default() -> Self {
        SubtitleOffset {
            offset_ms: 0,
            step_ms: DEFAULT_OFFSET_STEP_MS,
        }
    }
}

impl SubtitleOffset {
    pub fn with_step(step_ms: i64) -> Self {
        SubtitleOffset {
            offset_ms: 0,
            step_ms: step_ms.max(1),
        }
    }

    pub fn get(&self) -> i64 {
        self.offset_ms
    }

    pub fn set(&mut self, offset_ms: i64) {
        self.offset_ms = offset_ms;
    }

    pub fn adjust(&mut self, delta_ms: i64) {
        self.offset_ms = self.offset_ms.saturating_add(delta_ms);
    }

    pub fn step_forward(&mut self) {
        self.adjust(self.step_ms);
    }

    pub fn step_back(&mut self) {
        self.adjust(-self.step_ms);
    }

    pub fn reset(&mut self) {
        self.offset_ms = 0;
    }

    /// Shift a cue timestamp by the offset, clamping at zero
    pub fn apply(&self, cue_time: Millis) -> Millis {
        cue_time.saturating_add_signed(self.offset_ms)
    }

    /// Shift a whole cue by the offset
    pub fn shift_cue(&self, cue: &SubtitleCue) -> SubtitleCue {
        SubtitleCue {
            start: self.apply(cue.start),
            end: self.apply(cue.end),
            text: cue.text.clone(),
        }
    }

    /// Position to match cues against. Shifting the clock back by the offset is
    /// the same as shifting every cue forward by it. `None` while the displayed
    /// position is still before the offset, where no shifted cue has started.
    pub fn cue_clock(&self, displayed: Millis) -> Option<Millis> {
        let clock = i128::from(displayed.as_u64()) - i128::from(self.offset_ms);
        if clock < 0 {
            return None;
        }
        Some(Millis(u64::try_from(clock).unwrap_or(u64::MAX)))
    }

    /// Short label for the offset control: "Sync" or e.g. "+1.5s"
    pub fn label(&self) -> String {
        if self.offset_ms == 0 {
            "Sync".to_string()
        } else {
            let sign = if self.offset_ms > 0 { "+" } else { "-" };
            format!("{}{:.1}s", sign, self.offset_ms.unsigned_abs() as f64 / 1000.0)
        }
    }
}

/// Binary search for the cue showing at `position`.
///
/// `cues` must be sorted by start. A cue matches when `start <= position <= end`;
/// failing that, the last cue starting before `position` still matches within
/// `grace` after its end.
pub fn find_active_cue(cues: &[SubtitleCue], position: Millis, grace: Millis) -> Option<&SubtitleCue> {
    let mut left = 0usize;
    let mut right = cues.len();
    let mut best: Option<&SubtitleCue> = None;

    while left < right {
        let mid = left + (right - left) / 2;
        let cue = &cues[mid];

        if position >= cue.start && position <= cue.end {
            return Some(cue);
        } else if position < cue.start {
            right = mid;
        } else {
            best = Some(cue);
            left = mid + 1;
        }
    }

    best.filter(|cue| position.as_u64() <= cue.end.as_u64().saturating_add(grace.as_u64()))
}
