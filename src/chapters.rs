use crate::time::{ticks_to_ms, Millis, Ticks};
use serde::{Deserialize, Serialize};

/// Default window after a chapter start in which "previous" still means the
/// chapter before; past it, "previous" restarts the current chapter.
pub const DEFAULT_RESTART_THRESHOLD: Millis = Millis(3000);

/// Chapter marker as delivered by the media server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChapterInfo {
    pub start_position_ticks: Ticks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
}

impl ChapterInfo {
    pub fn new(start: Millis, name: impl Into<String>) -> Self {
        ChapterInfo {
            start_position_ticks: crate::time::ms_to_ticks(start),
            name: Some(name.into()),
            image_tag: None,
        }
    }

    pub fn start(&self) -> Millis {
        ticks_to_ms(self.start_position_ticks)
    }
}

/// A chapter resolved against a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRef<'a> {
    pub index: usize,
    pub start: Millis,
    pub chapter: &'a ChapterInfo,
}

impl ChapterRef<'_> {
    /// Chapter name, or "Chapter N" (1-based) when the server sent none
    pub fn display_name(&self) -> String {
        match self.chapter.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => format!("Chapter {}", self.index + 1),
        }
    }
}

/// Position lookups over a chapter list.
///
/// The list must already be sorted by start offset; the index never sorts.
#[derive(Debug, Clone, Default)]
pub struct ChapterIndex {
    chapters: Vec<ChapterInfo>,
    starts: Vec<Millis>,
    restart_threshold: Millis,
}

impl ChapterIndex {
    pub fn new(chapters: Vec<ChapterInfo>) -> Self {
        Self::with_restart_threshold(chapters, DEFAULT_RESTART_THRESHOLD)
    }

    pub fn with_restart_threshold(chapters: Vec<ChapterInfo>, restart_threshold: Millis) -> Self {
        let starts = chapters.iter().map(ChapterInfo::start).collect();
        ChapterIndex {
            chapters,
            starts,
            restart_threshold,
        }
    }

    /// Parse the media server's `Chapters` array
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let chapters: Vec<ChapterInfo> = serde_json::from_str(json)?;
        Ok(Self::new(chapters))
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ChapterRef<'_>> {
        let chapter = self.chapters.get(index)?;
        Some(ChapterRef {
            index,
            start: self.starts[index],
            chapter,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ChapterRef<'_>> {
        (0..self.chapters.len()).filter_map(|index| self.get(index))
    }

    fn current_index(&self, position: Millis) -> Option<usize> {
        if self.chapters.is_empty() {
            return None;
        }
        // Before the first start still counts as chapter 0
        Some(
            self.starts
                .iter()
                .rposition(|start| *start <= position)
                .unwrap_or(0),
        )
    }

    pub fn current_chapter(&self, position: Millis) -> Option<ChapterRef<'_>> {
        self.current_index(position).and_then(|i| self.get(i))
    }

    pub fn next_chapter(&self, position: Millis) -> Option<ChapterRef<'_>> {
        self.current_index(position).and_then(|i| self.get(i + 1))
    }

    /// Target for a "previous" press: more than the restart threshold into the
    /// current chapter restarts it, otherwise go to the chapter before.
    pub fn previous_chapter(&self, position: Millis) -> Option<ChapterRef<'_>> {
        let current = self.current_index(position)?;
        let elapsed = position.saturating_sub(self.starts[current]);

        if elapsed > self.restart_threshold {
            self.get(current)
        } else if current > 0 {
            self.get(current - 1)
        } else {
            None
        }
    }

    /// Chapter starts as fractions of `duration`, for drawing seek-bar ticks.
    /// Empty while the duration is unknown.
    pub fn markers(&self, duration: Millis) -> Vec<f64> {
        if duration == Millis::ZERO {
            return Vec::new();
        }
        self.starts
            .iter()
            .map(|start| (start.as_u64() as f64 / duration.as_u64() as f64).clamp(0.0, 1.0))
            .collect()
    }
}
