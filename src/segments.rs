use crate::time::Millis;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INTRO_PREVIEW_LEAD: Millis = Millis(5_000);
pub const DEFAULT_NEXT_UP_LEAD: Millis = Millis(30_000);

/// Intro and credits markers for the current item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaSegments {
    pub intro: Option<(Millis, Millis)>,
    pub credits_start: Option<Millis>,
}

/// Which skip/next-up affordances should be visible at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentFlags {
    pub show_skip_intro: bool,
    pub intro_preview: bool,
    pub show_skip_credits: bool,
    pub show_next_up: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentLeads {
    pub intro_preview: Millis,
    pub next_up: Millis,
}

impl Default for SegmentLeads {
    fn default() -> Self {
        SegmentLeads {
            intro_preview: DEFAULT_INTRO_PREVIEW_LEAD,
            next_up: DEFAULT_NEXT_UP_LEAD,
        }
    }
}

impl MediaSegments {
    pub fn flags(&self, position: Millis, duration: Millis, leads: SegmentLeads) -> SegmentFlags {
        let mut flags = SegmentFlags::default();

        if let Some((intro_start, intro_end)) = self.intro {
            flags.show_skip_intro = position >= intro_start && position < intro_end;
            flags.intro_preview = position >= intro_start.saturating_sub(leads.intro_preview)
                && position < intro_start;
        }
        if let Some(credits_start) = self.credits_start {
            flags.show_skip_credits = position >= credits_start;
        }
        flags.show_next_up =
            duration > Millis::ZERO && position >= duration.saturating_sub(leads.next_up);

        flags
    }

    /// Where "skip intro" should land, if the position is inside the intro
    pub fn intro_skip_target(&self, position: Millis) -> Option<Millis> {
        let (start, end) = self.intro?;
        (position >= start && position < end).then_some(end)
    }
}
