use crate::playback::progress::{PlaybackProgress, PositionSource};
use crate::playback::seek::{SeekArbiter, SeekRequest, SeekState};
use crate::time::Millis;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, trace};

/// A position together with the duration it belongs to.
///
/// `position` may run past `duration` by up to one poll interval near the end;
/// that reads as "ended". A zero duration means "not known yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackPosition {
    pub position: Millis,
    pub duration: Millis,
}

impl PlaybackPosition {
    pub fn new(position: Millis, duration: Millis) -> Self {
        PlaybackPosition { position, duration }
    }

    pub fn is_ended(&self) -> bool {
        self.duration > Millis::ZERO && self.position >= self.duration
    }

    /// Progress in `[0, 1]`, zero while the duration is unknown
    pub fn fraction(&self) -> f64 {
        if self.duration == Millis::ZERO {
            return 0.0;
        }
        (self.position.as_u64() as f64 / self.duration.as_u64() as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
struct FacadeState {
    seek: SeekArbiter,
    /// Last position applied from the remote session; `Some` only while connected
    remote: Option<PlaybackPosition>,
    /// Last position pushed by the local engine
    local: PlaybackPosition,
    last_published: PlaybackPosition,
}

impl FacadeState {
    fn authoritative(&self) -> PlaybackPosition {
        self.remote.unwrap_or(self.local)
    }

    fn displayed(&self) -> PlaybackPosition {
        let source = self.authoritative();
        match self.seek.state().held_position() {
            Some(held) => PlaybackPosition::new(held, source.duration),
            None => source,
        }
    }
}

/// Single source of "what time is it" for every consumer of playback position.
///
/// Precedence: a held seek value (dragging or committing) wins, then the remote
/// session's last applied poll while connected, then the local engine. Only the
/// seek path and the two producers write; everything else reads.
#[derive(Clone)]
pub struct PositionFacade {
    inner: Arc<Mutex<FacadeState>>,
    progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
}

impl std::fmt::Debug for PositionFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionFacade")
            .field("state", &*self.lock())
            .finish()
    }
}

impl PositionFacade {
    pub fn new(progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>) -> Self {
        PositionFacade {
            inner: Arc::new(Mutex::new(FacadeState::default())),
            progress_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FacadeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a mutation and publish whatever it changed
    fn update<R>(&self, source: PositionSource, f: impl FnOnce(&mut FacadeState) -> R) -> R {
        let mut state = self.lock();
        let seek_before = state.seek.state();

        let result = f(&mut state);

        let seek_after = state.seek.state();
        if seek_after != seek_before {
            let _ = self
                .progress_tx
                .send(PlaybackProgress::SeekStateChanged { state: seek_after });
        }

        let displayed = state.displayed();
        if displayed != state.last_published {
            state.last_published = displayed;
            let _ = self.progress_tx.send(PlaybackProgress::PositionUpdate {
                position: displayed.position,
                duration: displayed.duration,
                source,
            });
        }
        result
    }

    pub fn displayed_position(&self) -> Millis {
        self.lock().displayed().position
    }

    /// Displayed position with the authoritative duration
    pub fn snapshot(&self) -> PlaybackPosition {
        self.lock().displayed()
    }

    pub fn duration(&self) -> Millis {
        self.lock().authoritative().duration
    }

    pub fn seek_state(&self) -> SeekState {
        self.lock().seek.state()
    }

    /// Whether a connected remote session currently owns the position
    pub fn is_remote(&self) -> bool {
        self.lock().remote.is_some()
    }

    pub fn remote_position(&self) -> Option<Millis> {
        self.lock().remote.map(|r| r.position)
    }

    /// Local engine position stream. Always recorded, only displayed when the
    /// local engine is authoritative and no seek is held.
    pub fn apply_local(&self, position: PlaybackPosition) {
        self.update(PositionSource::Local, |state| {
            trace!("Local position {}", position.position);
            state.local = position;
        });
    }

    /// A remote poll result. Dropped unless connected and the seek control is idle.
    pub(crate) fn apply_remote_poll(&self, position: Millis) -> bool {
        self.update(PositionSource::Remote, |state| {
            let Some(remote) = state.remote.as_mut() else {
                debug!("Dropping poll result {}: no remote session", position);
                return false;
            };
            if !state.seek.state().is_idle() {
                debug!("Dropping poll result {} while seeking", position);
                return false;
            }
            remote.position = position;
            true
        })
    }

    /// Remote session connected: it now owns the position, seeded from the media snapshot
    pub(crate) fn begin_remote(&self, seed: PlaybackPosition) {
        self.update(PositionSource::Remote, |state| {
            state.remote = Some(seed);
        });
    }

    /// Remote session gone: seeks issued to it are forgotten and the local
    /// engine is authoritative again.
    pub(crate) fn end_remote(&self) -> Option<PlaybackPosition> {
        self.update(PositionSource::Local, |state| {
            state.seek.abandon();
            state.remote.take()
        })
    }

    pub fn begin_seek(&self) {
        self.update(PositionSource::Seek, |state| {
            let displayed = state.displayed().position;
            state.seek.begin_drag(displayed);
        });
    }

    pub fn update_seek(&self, value: Millis) {
        self.update(PositionSource::Seek, |state| {
            let duration = state.authoritative().duration;
            state.seek.update_drag(value, duration);
        });
    }

    pub fn end_seek(&self) -> Option<SeekRequest> {
        self.update(PositionSource::Seek, |state| state.seek.end_drag())
    }

    pub fn commit_seek(&self, target: Millis) -> Option<SeekRequest> {
        self.update(PositionSource::Seek, |state| state.seek.commit(target))
    }

    /// Transport finished seek `request`. On success the authoritative
    /// position jumps to the target; on failure it keeps its last value until
    /// the next poll or engine update. Returns the queued seek to issue next.
    pub(crate) fn resolve_seek(&self, request: SeekRequest, succeeded: bool) -> Option<SeekRequest> {
        let (resolved, next) = self.update(PositionSource::Seek, |state| {
            if state.seek.in_flight() != Some(request) {
                return (false, None);
            }
            if succeeded {
                match state.remote.as_mut() {
                    Some(remote) => remote.position = request.target,
                    None => state.local.position = request.target,
                }
            }
            (true, state.seek.resolve(request.id))
        });

        if resolved {
            let _ = self.progress_tx.send(PlaybackProgress::SeekCompleted {
                target: request.target,
                succeeded,
            });
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade() -> (PositionFacade, tokio_mpsc::UnboundedReceiver<PlaybackProgress>) {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        (PositionFacade::new(tx), rx)
    }

    fn drain(rx: &mut tokio_mpsc::UnboundedReceiver<PlaybackProgress>) -> Vec<PlaybackProgress> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_three_tier_precedence() {
        let (facade, _rx) = facade();
        facade.apply_local(PlaybackPosition::new(Millis(5_000), Millis(60_000)));
        assert_eq!(facade.displayed_position(), Millis(5_000));

        facade.begin_remote(PlaybackPosition::new(Millis(20_000), Millis(90_000)));
        assert_eq!(facade.displayed_position(), Millis(20_000));
        assert_eq!(facade.duration(), Millis(90_000));

        // Local updates no longer show while remote owns the position
        facade.apply_local(PlaybackPosition::new(Millis(6_000), Millis(60_000)));
        assert_eq!(facade.displayed_position(), Millis(20_000));

        facade.begin_seek();
        facade.update_seek(Millis(70_000));
        assert_eq!(facade.displayed_position(), Millis(70_000));

        facade.end_remote();
        // The drag is still held; the local duration bounds it from now on
        assert_eq!(facade.displayed_position(), Millis(70_000));
        facade.update_seek(Millis(70_000));
        assert_eq!(facade.displayed_position(), Millis(60_000));
    }

    #[test]
    fn test_polls_dropped_while_seek_held() {
        let (facade, _rx) = facade();
        facade.begin_remote(PlaybackPosition::new(Millis(10_000), Millis(100_000)));

        facade.begin_seek();
        facade.update_seek(Millis(50_000));
        for polled in [11_000, 12_000, 13_000] {
            assert!(!facade.apply_remote_poll(Millis(polled)));
            assert_eq!(facade.displayed_position(), Millis(50_000));
        }

        let request = facade.end_seek().unwrap();
        assert!(!facade.apply_remote_poll(Millis(14_000)));
        assert_eq!(facade.displayed_position(), Millis(50_000));

        assert!(facade.resolve_seek(request, true).is_none());
        assert_eq!(facade.displayed_position(), Millis(50_000));
        assert!(facade.apply_remote_poll(Millis(51_000)));
        assert_eq!(facade.displayed_position(), Millis(51_000));
    }

    #[test]
    fn test_failed_seek_reverts_to_last_poll() {
        let (facade, _rx) = facade();
        facade.begin_remote(PlaybackPosition::new(Millis(10_000), Millis(100_000)));
        let request = facade.commit_seek(Millis(80_000)).unwrap();
        assert_eq!(facade.displayed_position(), Millis(80_000));

        facade.resolve_seek(request, false);
        assert_eq!(facade.displayed_position(), Millis(10_000));
        assert!(facade.seek_state().is_idle());
    }

    #[test]
    fn test_poll_without_remote_is_dropped() {
        let (facade, _rx) = facade();
        assert!(!facade.apply_remote_poll(Millis(1_000)));
        assert_eq!(facade.displayed_position(), Millis::ZERO);
    }

    #[test]
    fn test_end_remote_abandons_committing_seek() {
        let (facade, _rx) = facade();
        facade.apply_local(PlaybackPosition::new(Millis(3_000), Millis(60_000)));
        facade.begin_remote(PlaybackPosition::new(Millis(10_000), Millis(60_000)));
        let request = facade.commit_seek(Millis(40_000)).unwrap();

        let last = facade.end_remote().unwrap();
        assert_eq!(last.position, Millis(10_000));
        assert!(facade.seek_state().is_idle());
        assert_eq!(facade.displayed_position(), Millis(3_000));

        // A late resolution for the old session changes nothing
        assert!(facade.resolve_seek(request, true).is_none());
        assert_eq!(facade.displayed_position(), Millis(3_000));
    }

    #[test]
    fn test_publishes_changes_only() {
        let (facade, mut rx) = facade();
        facade.apply_local(PlaybackPosition::new(Millis(1_000), Millis(10_000)));
        facade.apply_local(PlaybackPosition::new(Millis(1_000), Millis(10_000)));
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![PlaybackProgress::PositionUpdate {
                position: Millis(1_000),
                duration: Millis(10_000),
                source: PositionSource::Local,
            }]
        );

        facade.begin_seek();
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![PlaybackProgress::SeekStateChanged {
                state: SeekState::Dragging { preview: Millis(1_000) }
            }]
        );
    }

    #[test]
    fn test_playback_position_helpers() {
        assert!(PlaybackPosition::new(Millis(61_000), Millis(60_000)).is_ended());
        assert!(!PlaybackPosition::new(Millis(61_000), Millis::ZERO).is_ended());
        assert_eq!(PlaybackPosition::new(Millis(15_000), Millis(60_000)).fraction(), 0.25);
        assert_eq!(PlaybackPosition::new(Millis(15_000), Millis::ZERO).fraction(), 0.0);
    }
}
