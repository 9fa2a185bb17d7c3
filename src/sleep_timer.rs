use crate::playback::progress::PlaybackProgress;
use crate::time::Millis;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Quick picks offered by the sleep timer menu
pub const SLEEP_TIMER_PRESETS_MINUTES: [u32; 6] = [15, 30, 45, 60, 90, 120];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SleepTimerError {
    #[error("Sleep timer needs a positive number of minutes, got {0}")]
    InvalidMinutes(i64),
}

/// Wall-clock source. Sleep timers follow real time, not media time.
pub trait Clock: Send + Sync {
    fn now_epoch_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepTimerKind {
    Duration,
    EndOfEpisode,
    Custom,
}

/// A countdown to an absolute wall-clock instant, fixed when created.
///
/// Pausing playback does not pause the timer. There is no "fired" flag:
/// `remaining` simply reads zero from expiry on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepTimer {
    #[serde(rename = "type")]
    pub kind: SleepTimerKind,
    pub end_time_epoch_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl SleepTimer {
    pub fn create(kind: SleepTimerKind, delta: Millis, clock: &dyn Clock) -> Self {
        let delta = i64::try_from(delta.as_u64()).unwrap_or(i64::MAX);
        SleepTimer {
            kind,
            end_time_epoch_ms: clock.now_epoch_ms().saturating_add(delta),
            duration_minutes: None,
        }
    }

    /// A `Duration` or `Custom` timer of whole minutes
    pub fn for_minutes(
        kind: SleepTimerKind,
        minutes: i64,
        clock: &dyn Clock,
    ) -> Result<Self, SleepTimerError> {
        let whole = u32::try_from(minutes)
            .ok()
            .filter(|m| *m > 0)
            .ok_or(SleepTimerError::InvalidMinutes(minutes))?;

        let mut timer = Self::create(kind, Millis(u64::from(whole) * 60_000), clock);
        timer.duration_minutes = Some(whole);
        Ok(timer)
    }

    /// Expire when the current episode would end. `remaining_in_episode` is
    /// computed by the caller.
    pub fn end_of_episode(remaining_in_episode: Millis, clock: &dyn Clock) -> Self {
        Self::create(SleepTimerKind::EndOfEpisode, remaining_in_episode, clock)
    }

    pub fn remaining(&self, clock: &dyn Clock) -> Millis {
        let left = self.end_time_epoch_ms.saturating_sub(clock.now_epoch_ms());
        Millis(u64::try_from(left).unwrap_or(0))
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.remaining(clock) == Millis::ZERO
    }
}

/// Re-evaluates a sleep timer on a fixed cadence and publishes
/// [`PlaybackProgress::SleepTimerExpired`] once. Dropping the watch cancels it.
pub struct SleepTimerWatch {
    timer: SleepTimer,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SleepTimerWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepTimerWatch")
            .field("timer", &self.timer)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SleepTimerWatch {
    pub fn start(
        timer: SleepTimer,
        clock: Arc<dyn Clock>,
        tick: Duration,
        progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
        runtime_handle: &tokio::runtime::Handle,
    ) -> Self {
        info!(
            "Sleep timer set ({:?}), {} remaining",
            timer.kind,
            timer.remaining(clock.as_ref())
        );

        let tick = tick.max(Duration::from_millis(1));
        let watched = timer.clone();
        let task = runtime_handle.spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let remaining = watched.remaining(clock.as_ref());
                if remaining == Millis::ZERO {
                    info!("Sleep timer expired");
                    let _ = progress_tx.send(PlaybackProgress::SleepTimerExpired);
                    break;
                }
                debug!("Sleep timer: {} remaining", remaining);
            }
        });

        SleepTimerWatch {
            timer,
            task: Some(task),
        }
    }

    pub fn timer(&self) -> &SleepTimer {
        &self.timer
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop ticking. Safe to call any number of times.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Sleep timer cancelled");
            task.abort();
        }
    }
}

impl Drop for SleepTimerWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}
