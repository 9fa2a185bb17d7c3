use crate::chapters::{ChapterIndex, ChapterInfo, ChapterRef};
use crate::config::PlayheadConfig;
use crate::playback::facade::{PlaybackPosition, PositionFacade};
use crate::playback::progress::{PlaybackProgress, PlaybackProgressHandle};
use crate::playback::seek::SeekRequest;
use crate::playback::session::{CastMediaInfo, SessionHandle, SessionService};
use crate::playback::transport::{LocalEngine, RemoteTransport};
use crate::segments::{MediaSegments, SegmentFlags};
use crate::sleep_timer::{Clock, SleepTimer, SleepTimerError, SleepTimerKind, SleepTimerWatch, SystemClock};
use crate::subtitles::{find_active_cue, SubtitleCue, SubtitleOffset};
use crate::time::Millis;
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, info, warn};

/// Everything a player surface drives: seeking, chapters, subtitles, the
/// sleep timer, and handing playback between the local engine and a cast
/// receiver. Position always comes from the [`PositionFacade`].
pub struct PlaybackController {
    config: PlayheadConfig,
    facade: PositionFacade,
    engine: Arc<dyn LocalEngine>,
    session: Option<SessionHandle>,
    chapters: ChapterIndex,
    subtitle_offset: SubtitleOffset,
    cues: Vec<SubtitleCue>,
    segments: MediaSegments,
    sleep_timer: Option<SleepTimerWatch>,
    clock: Arc<dyn Clock>,
    progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
    progress_handle: PlaybackProgressHandle,
    runtime_handle: tokio::runtime::Handle,
    local_playing: bool,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn LocalEngine>,
        config: PlayheadConfig,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        Self::with_clock(engine, config, Arc::new(SystemClock), runtime_handle)
    }

    pub fn with_clock(
        engine: Arc<dyn LocalEngine>,
        config: PlayheadConfig,
        clock: Arc<dyn Clock>,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let (progress_tx, progress_rx) = tokio_mpsc::unbounded_channel();
        let progress_handle = PlaybackProgressHandle::new(progress_rx, runtime_handle.clone());

        PlaybackController {
            facade: PositionFacade::new(progress_tx.clone()),
            engine,
            session: None,
            chapters: ChapterIndex::with_restart_threshold(
                Vec::new(),
                config.chapter_restart_threshold(),
            ),
            subtitle_offset: SubtitleOffset::with_step(config.subtitle_offset_step_ms),
            cues: Vec::new(),
            segments: MediaSegments::default(),
            sleep_timer: None,
            clock,
            progress_tx,
            progress_handle,
            runtime_handle,
            local_playing: false,
            config,
        }
    }

    pub fn facade(&self) -> &PositionFacade {
        &self.facade
    }

    pub fn subscribe(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.progress_handle.subscribe_all()
    }

    pub fn displayed_position(&self) -> Millis {
        self.facade.displayed_position()
    }

    /// Position stream from the local engine
    pub fn on_local_position(&self, position: Millis, duration: Millis) {
        self.facade
            .apply_local(PlaybackPosition::new(position, duration));
    }

    // Seeking

    pub fn begin_seek(&self) {
        self.facade.begin_seek();
    }

    pub fn update_seek(&self, value: Millis) {
        self.facade.update_seek(value);
    }

    pub fn end_seek(&self) {
        let request = self.facade.end_seek();
        self.dispatch_seek(request);
    }

    /// Jump straight to `target` (clamped to the known duration)
    pub fn seek_to(&self, target: Millis) {
        let target = target.clamp_to_duration(self.facade.duration());
        let request = self.facade.commit_seek(target);
        self.dispatch_seek(request);
    }

    /// Relative jump from the displayed position
    pub fn skip(&self, delta_secs: i64) {
        let target = self
            .facade
            .displayed_position()
            .saturating_add_signed(delta_secs.saturating_mul(1_000));
        self.seek_to(target);
    }

    /// Route a seek to whichever side owns the position. Local seeks settle
    /// immediately, so any queued follow-up is issued in the same call.
    fn dispatch_seek(&self, mut request: Option<SeekRequest>) {
        while let Some(current) = request {
            if self.facade.is_remote() {
                if let Some(session) = &self.session {
                    session.seek(current);
                    return;
                }
            }
            debug!("Local seek to {}", current.target);
            self.engine.seek(current.target);
            request = self.facade.resolve_seek(current, true);
        }
    }

    // Chapters

    pub fn set_chapters(&mut self, chapters: Vec<ChapterInfo>) {
        self.chapters =
            ChapterIndex::with_restart_threshold(chapters, self.config.chapter_restart_threshold());
    }

    pub fn chapters(&self) -> &ChapterIndex {
        &self.chapters
    }

    pub fn chapter_markers(&self) -> Vec<f64> {
        self.chapters.markers(self.facade.duration())
    }

    pub fn current_chapter(&self) -> Option<ChapterRef<'_>> {
        self.chapters
            .current_chapter(self.facade.displayed_position())
    }

    /// Returns false when there is no later chapter
    pub fn next_chapter(&self) -> bool {
        let target = self
            .chapters
            .next_chapter(self.facade.displayed_position())
            .map(|chapter| chapter.start);
        self.jump_to(target)
    }

    pub fn previous_chapter(&self) -> bool {
        let target = self
            .chapters
            .previous_chapter(self.facade.displayed_position())
            .map(|chapter| chapter.start);
        self.jump_to(target)
    }

    pub fn seek_to_chapter(&self, index: usize) -> bool {
        let target = self.chapters.get(index).map(|chapter| chapter.start);
        self.jump_to(target)
    }

    fn jump_to(&self, target: Option<Millis>) -> bool {
        match target {
            Some(target) => {
                self.seek_to(target);
                true
            }
            None => false,
        }
    }

    // Subtitles

    /// Replace the cue list; cues are kept sorted by start
    pub fn set_cues(&mut self, mut cues: Vec<SubtitleCue>) {
        cues.sort_by_key(|cue| cue.start);
        self.cues = cues;
    }

    pub fn subtitle_offset(&self) -> &SubtitleOffset {
        &self.subtitle_offset
    }

    pub fn subtitle_offset_mut(&mut self) -> &mut SubtitleOffset {
        &mut self.subtitle_offset
    }

    /// Cue to show at the displayed position, with the offset applied
    pub fn active_subtitle(&self) -> Option<SubtitleCue> {
        let clock = self
            .subtitle_offset
            .cue_clock(self.facade.displayed_position())?;
        find_active_cue(&self.cues, clock, self.config.subtitle_cue_grace())
            .map(|cue| self.subtitle_offset.shift_cue(cue))
    }

    // Intro / credits

    pub fn set_segments(&mut self, segments: MediaSegments) {
        self.segments = segments;
    }

    pub fn segment_flags(&self) -> SegmentFlags {
        let shown = self.facade.snapshot();
        self.segments
            .flags(shown.position, shown.duration, self.config.segment_leads())
    }

    pub fn skip_intro(&self) -> bool {
        let target = self
            .segments
            .intro_skip_target(self.facade.displayed_position());
        self.jump_to(target)
    }

    // Sleep timer

    /// Start a timer of whole minutes, replacing any running one
    pub fn set_sleep_timer(&mut self, kind: SleepTimerKind, minutes: i64) -> Result<(), SleepTimerError> {
        let timer = SleepTimer::for_minutes(kind, minutes, self.clock.as_ref())?;
        self.start_sleep_timer(timer);
        Ok(())
    }

    /// Expire when the current item would finish from here at normal speed
    pub fn set_sleep_timer_end_of_episode(&mut self) {
        let shown = self.facade.snapshot();
        let remaining = shown.duration.saturating_sub(shown.position);
        let timer = SleepTimer::end_of_episode(remaining, self.clock.as_ref());
        self.start_sleep_timer(timer);
    }

    fn start_sleep_timer(&mut self, timer: SleepTimer) {
        self.cancel_sleep_timer();
        self.sleep_timer = Some(SleepTimerWatch::start(
            timer,
            self.clock.clone(),
            self.config.sleep_timer_tick(),
            self.progress_tx.clone(),
            &self.runtime_handle,
        ));
    }

    pub fn cancel_sleep_timer(&mut self) {
        if let Some(mut watch) = self.sleep_timer.take() {
            watch.cancel();
        }
    }

    pub fn sleep_timer(&self) -> Option<&SleepTimer> {
        self.sleep_timer.as_ref().map(|watch| watch.timer())
    }

    pub fn sleep_timer_remaining(&self) -> Option<Millis> {
        self.sleep_timer
            .as_ref()
            .map(|watch| watch.timer().remaining(self.clock.as_ref()))
    }

    /// Call on [`PlaybackProgress::SleepTimerExpired`]: pauses whichever
    /// side is playing and clears the timer.
    pub fn on_sleep_timer_expired(&mut self) {
        info!("Sleep timer expired, pausing playback");
        self.sleep_timer = None;
        self.pause();
    }

    // Play state

    pub fn is_playing(&self) -> bool {
        match self.remote_session() {
            Some(session) => session.is_playing(),
            None => self.local_playing,
        }
    }

    pub fn play(&mut self) {
        match self.remote_session() {
            Some(session) => session.play(),
            None => self.set_local_playing(true),
        }
    }

    pub fn pause(&mut self) {
        match self.remote_session() {
            Some(session) => session.pause(),
            None => self.set_local_playing(false),
        }
    }

    pub fn toggle_play_pause(&mut self) {
        match self.remote_session() {
            Some(session) => session.toggle_play_pause(),
            None => self.set_local_playing(!self.local_playing),
        }
    }

    fn set_local_playing(&mut self, is_playing: bool) {
        if is_playing {
            self.engine.play();
        } else {
            self.engine.pause();
        }
        if self.local_playing != is_playing {
            self.local_playing = is_playing;
            let _ = self
                .progress_tx
                .send(PlaybackProgress::PlayStateChanged { is_playing });
        }
    }

    // Casting

    /// Session handle while a receiver owns the position
    fn remote_session(&self) -> Option<&SessionHandle> {
        self.session
            .as_ref()
            .filter(|_| self.facade.is_remote())
    }

    /// Start the session service for `transport`. A previous session is
    /// disconnected first, handing playback back to the local engine.
    pub async fn attach_remote(&mut self, transport: Arc<dyn RemoteTransport>) -> SessionHandle {
        if self.session.is_some() {
            debug!("Replacing cast transport");
            self.stop_casting().await;
        }
        let handle = SessionService::start(
            transport,
            self.facade.clone(),
            self.progress_tx.clone(),
            &self.config,
            &self.runtime_handle,
        );
        self.session = Some(handle.clone());
        handle
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn cast_connecting(&self, device_name: impl Into<String>) {
        match &self.session {
            Some(session) => session.begin_connecting(device_name),
            None => warn!("No cast transport attached"),
        }
    }

    /// The receiver has loaded `media`; local playback pauses while it plays
    pub fn cast_connected(&mut self, media: CastMediaInfo) {
        let Some(session) = self.session.clone() else {
            warn!("No cast transport attached");
            return;
        };
        self.set_local_playing(false);
        session.connected(media);
    }

    /// Media description for loading the current item on a receiver at the
    /// displayed position
    pub fn media_here(&self, title: impl Into<String>) -> CastMediaInfo {
        let shown = self.facade.snapshot();
        CastMediaInfo {
            title: title.into(),
            start_position: shown.position,
            duration: shown.duration,
            ..CastMediaInfo::default()
        }
    }

    pub fn cast_connection_failed(&self) {
        if let Some(session) = &self.session {
            session.connection_failed();
        }
    }

    pub fn set_visible(&self, visible: bool) {
        if let Some(session) = &self.session {
            session.set_visible(visible);
        }
    }

    /// End casting and resume on the local engine where the receiver left off.
    /// Returns the handoff position.
    pub async fn stop_casting(&mut self) -> Millis {
        let Some(session) = self.session.clone() else {
            return self.facade.displayed_position();
        };
        let was_remote = self.facade.is_remote();
        let was_playing = was_remote && session.is_playing();

        let handoff = match session.disconnect().await {
            Ok(position) => position,
            Err(e) => {
                warn!("Cast session ended abnormally: {}", e);
                self.facade.end_remote();
                self.facade.displayed_position()
            }
        };

        if !was_remote {
            debug!("No receiver owned the position, leaving the local engine alone");
            return handoff;
        }
        self.engine.seek(handoff);
        self.facade
            .apply_local(PlaybackPosition::new(handoff, self.facade.duration()));
        if was_playing {
            self.set_local_playing(true);
        }
        handoff
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("facade", &self.facade)
            .field("session", &self.session)
            .field("chapters", &self.chapters.len())
            .field("subtitle_offset", &self.subtitle_offset)
            .field("sleep_timer", &self.sleep_timer)
            .field("local_playing", &self.local_playing)
            .finish_non_exhaustive()
    }
}
