use crate::time::Millis;
use tracing::debug;

/// What the seek control is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekState {
    #[default]
    Idle,
    Dragging {
        preview: Millis,
    },
    Committing {
        target: Millis,
    },
}

impl SeekState {
    /// The position the seek control is holding the display at, if any
    pub fn held_position(&self) -> Option<Millis> {
        match *self {
            SeekState::Idle => None,
            SeekState::Dragging { preview } => Some(preview),
            SeekState::Committing { target } => Some(target),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SeekState::Idle)
    }
}

/// An outbound seek to issue on whichever transport is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub id: u64,
    pub target: Millis,
}

/// Drag/commit state machine with at most one outbound seek in flight.
///
/// A commit made while a seek is in flight is queued rather than issued; a
/// newer commit replaces an older queued one. When the in-flight seek
/// resolves, the queued target (if any) becomes the next request.
#[derive(Debug, Default)]
pub struct SeekArbiter {
    state: SeekState,
    in_flight: Option<SeekRequest>,
    queued: Option<Millis>,
    next_id: u64,
}

impl SeekArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SeekState {
        self.state
    }

    pub fn in_flight(&self) -> Option<SeekRequest> {
        self.in_flight
    }

    pub fn queued(&self) -> Option<Millis> {
        self.queued
    }

    /// Gesture start. Captures the currently displayed position as the preview.
    /// Allowed while a previous seek is still resolving.
    pub fn begin_drag(&mut self, displayed: Millis) {
        if let SeekState::Dragging { .. } = self.state {
            return;
        }
        self.state = SeekState::Dragging { preview: displayed };
    }

    pub fn update_drag(&mut self, value: Millis, duration: Millis) {
        if let SeekState::Dragging { preview } = &mut self.state {
            *preview = value.clamp_to_duration(duration);
        }
    }

    /// Gesture end: the only point a drag turns into an outbound seek
    pub fn end_drag(&mut self) -> Option<SeekRequest> {
        match self.state {
            SeekState::Dragging { preview } => self.commit_target(preview),
            _ => None,
        }
    }

    /// Commit a computed target (skip, chapter jump) without a gesture.
    /// Ignored while the user is dragging.
    pub fn commit(&mut self, target: Millis) -> Option<SeekRequest> {
        if let SeekState::Dragging { .. } = self.state {
            debug!("Ignoring seek to {} while dragging", target);
            return None;
        }
        self.commit_target(target)
    }

    fn commit_target(&mut self, target: Millis) -> Option<SeekRequest> {
        self.state = SeekState::Committing { target };
        if self.in_flight.is_some() {
            debug!("Seek in flight, queueing {}", target);
            self.queued = Some(target);
            None
        } else {
            Some(self.issue(target))
        }
    }

    fn issue(&mut self, target: Millis) -> SeekRequest {
        let request = SeekRequest {
            id: self.next_id,
            target,
        };
        self.next_id += 1;
        self.in_flight = Some(request);
        request
    }

    /// The transport finished (either way) with seek `id`. Returns the queued
    /// seek to issue next, if any. Unknown ids are stale and ignored.
    pub fn resolve(&mut self, id: u64) -> Option<SeekRequest> {
        if self.in_flight.map(|r| r.id) != Some(id) {
            debug!("Ignoring stale seek resolution {}", id);
            return None;
        }
        self.in_flight = None;

        if let Some(target) = self.queued.take() {
            return Some(self.issue(target));
        }
        if let SeekState::Committing { .. } = self.state {
            self.state = SeekState::Idle;
        }
        None
    }

    /// Forget in-flight and queued seeks (their transport is gone). A drag in
    /// progress survives; a commit falls back to idle.
    pub fn abandon(&mut self) {
        self.in_flight = None;
        self.queued = None;
        if let SeekState::Committing { .. } = self.state {
            self.state = SeekState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_commit_resolve() {
        let mut arbiter = SeekArbiter::new();
        arbiter.begin_drag(Millis(10_000));
        assert_eq!(arbiter.state(), SeekState::Dragging { preview: Millis(10_000) });

        arbiter.update_drag(Millis(42_000), Millis(60_000));
        let request = arbiter.end_drag().unwrap();
        assert_eq!(request.target, Millis(42_000));
        assert_eq!(arbiter.state(), SeekState::Committing { target: Millis(42_000) });

        assert_eq!(arbiter.resolve(request.id), None);
        assert_eq!(arbiter.state(), SeekState::Idle);
    }

    #[test]
    fn test_update_clamps_to_duration() {
        let mut arbiter = SeekArbiter::new();
        arbiter.begin_drag(Millis(0));
        arbiter.update_drag(Millis(90_000), Millis(60_000));
        assert_eq!(arbiter.state().held_position(), Some(Millis(60_000)));

        // Unknown duration has no upper bound
        arbiter.update_drag(Millis(90_000), Millis::ZERO);
        assert_eq!(arbiter.state().held_position(), Some(Millis(90_000)));
    }

    #[test]
    fn test_updates_and_end_outside_drag_are_ignored() {
        let mut arbiter = SeekArbiter::new();
        arbiter.update_drag(Millis(5_000), Millis(60_000));
        assert_eq!(arbiter.state(), SeekState::Idle);
        assert!(arbiter.end_drag().is_none());
    }

    #[test]
    fn test_second_commit_is_queued_until_first_resolves() {
        let mut arbiter = SeekArbiter::new();
        let first = arbiter.commit(Millis(10_000)).unwrap();

        arbiter.begin_drag(Millis(10_000));
        arbiter.update_drag(Millis(20_000), Millis(60_000));
        assert!(arbiter.end_drag().is_none());
        assert!(arbiter.commit(Millis(30_000)).is_none());
        assert_eq!(arbiter.queued(), Some(Millis(30_000)));
        assert_eq!(arbiter.state(), SeekState::Committing { target: Millis(30_000) });

        let second = arbiter.resolve(first.id).unwrap();
        assert_eq!(second.target, Millis(30_000));
        assert_eq!(arbiter.in_flight(), Some(second));
        assert_eq!(arbiter.state(), SeekState::Committing { target: Millis(30_000) });

        assert!(arbiter.resolve(second.id).is_none());
        assert_eq!(arbiter.state(), SeekState::Idle);
    }

    #[test]
    fn test_stale_resolution_is_ignored() {
        let mut arbiter = SeekArbiter::new();
        let request = arbiter.commit(Millis(10_000)).unwrap();
        assert!(arbiter.resolve(request.id + 7).is_none());
        assert_eq!(arbiter.in_flight(), Some(request));
        assert!(!arbiter.state().is_idle());
    }

    #[test]
    fn test_drag_survives_resolution_of_earlier_seek() {
        let mut arbiter = SeekArbiter::new();
        let request = arbiter.commit(Millis(10_000)).unwrap();
        arbiter.begin_drag(Millis(10_000));
        arbiter.update_drag(Millis(15_000), Millis(60_000));

        assert!(arbiter.resolve(request.id).is_none());
        assert_eq!(arbiter.state(), SeekState::Dragging { preview: Millis(15_000) });
    }

    #[test]
    fn test_commit_while_dragging_is_ignored() {
        let mut arbiter = SeekArbiter::new();
        arbiter.begin_drag(Millis(1_000));
        assert!(arbiter.commit(Millis(50_000)).is_none());
        assert_eq!(arbiter.state(), SeekState::Dragging { preview: Millis(1_000) });
    }

    #[test]
    fn test_abandon() {
        let mut arbiter = SeekArbiter::new();
        let request = arbiter.commit(Millis(10_000)).unwrap();
        arbiter.commit(Millis(20_000));
        arbiter.abandon();
        assert_eq!(arbiter.state(), SeekState::Idle);
        assert!(arbiter.in_flight().is_none());
        assert!(arbiter.queued().is_none());
        assert!(arbiter.resolve(request.id).is_none());
    }

    /// Drive random gesture/commit/resolve sequences and check that no more than
    /// one request is ever outstanding.
    #[test]
    fn test_never_more_than_one_seek_outstanding() {
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = move |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound
        };

        let mut arbiter = SeekArbiter::new();
        let mut outstanding: Vec<SeekRequest> = Vec::new();

        for _ in 0..10_000 {
            match next(6) {
                0 => arbiter.begin_drag(Millis(next(60_000))),
                1 => arbiter.update_drag(Millis(next(90_000)), Millis(60_000)),
                2 => outstanding.extend(arbiter.end_drag()),
                3 => outstanding.extend(arbiter.commit(Millis(next(60_000)))),
                _ => {
                    if let Some(request) = outstanding.pop() {
                        outstanding.extend(arbiter.resolve(request.id));
                    }
                }
            }
            assert!(outstanding.len() <= 1);
            assert_eq!(arbiter.in_flight(), outstanding.first().copied());
        }
    }
}
