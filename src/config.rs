use crate::segments::SegmentLeads;
use crate::time::Millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Timing knobs for the playback core.
/// In debug builds: a `.env` file is loaded first, then `PLAYHEAD_*` variables apply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayheadConfig {
    /// How often a connected, visible cast session asks the receiver for its position
    pub poll_interval_ms: u64,
    pub sleep_timer_tick_ms: u64,
    /// Upper bound on the receiver's stop call during disconnect
    pub disconnect_timeout_ms: u64,
    /// "Previous chapter" restarts the current chapter past this point into it
    pub chapter_restart_threshold_ms: u64,
    pub subtitle_offset_step_ms: i64,
    /// A cue stays visible this long past its end
    pub subtitle_cue_grace_ms: u64,
    pub intro_preview_lead_ms: u64,
    pub next_up_lead_ms: u64,
    /// Undo an optimistic play/pause flip when the receiver rejects it
    pub revert_play_state_on_failure: bool,
}

impl Default for PlayheadConfig {
    fn default() -> Self {
        PlayheadConfig {
            poll_interval_ms: 1_000,
            sleep_timer_tick_ms: 1_000,
            disconnect_timeout_ms: 5_000,
            chapter_restart_threshold_ms: 3_000,
            subtitle_offset_step_ms: 100,
            subtitle_cue_grace_ms: 100,
            intro_preview_lead_ms: 5_000,
            next_up_lead_ms: 30_000,
            revert_play_state_on_failure: false,
        }
    }
}

impl PlayheadConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or malformed.
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                tracing::info!("Config: loaded .env file");
            }
        }

        match Self::from_env_with(|key| std::env::var(key).ok()) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Build a config from an arbitrary variable lookup
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        read_var(&lookup, "PLAYHEAD_POLL_INTERVAL_MS", &mut config.poll_interval_ms)?;
        read_var(&lookup, "PLAYHEAD_SLEEP_TIMER_TICK_MS", &mut config.sleep_timer_tick_ms)?;
        read_var(&lookup, "PLAYHEAD_DISCONNECT_TIMEOUT_MS", &mut config.disconnect_timeout_ms)?;
        read_var(
            &lookup,
            "PLAYHEAD_CHAPTER_RESTART_THRESHOLD_MS",
            &mut config.chapter_restart_threshold_ms,
        )?;
        read_var(&lookup, "PLAYHEAD_SUBTITLE_OFFSET_STEP_MS", &mut config.subtitle_offset_step_ms)?;
        read_var(&lookup, "PLAYHEAD_SUBTITLE_CUE_GRACE_MS", &mut config.subtitle_cue_grace_ms)?;
        read_var(&lookup, "PLAYHEAD_INTRO_PREVIEW_LEAD_MS", &mut config.intro_preview_lead_ms)?;
        read_var(&lookup, "PLAYHEAD_NEXT_UP_LEAD_MS", &mut config.next_up_lead_ms)?;

        if let Some(raw) = lookup("PLAYHEAD_REVERT_PLAY_STATE_ON_FAILURE") {
            config.revert_play_state_on_failure = match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => return Err(invalid("PLAYHEAD_REVERT_PLAY_STATE_ON_FAILURE", &raw)),
            };
        }

        if config.poll_interval_ms == 0 {
            return Err(invalid("PLAYHEAD_POLL_INTERVAL_MS", "0"));
        }
        if config.sleep_timer_tick_ms == 0 {
            return Err(invalid("PLAYHEAD_SLEEP_TIMER_TICK_MS", "0"));
        }
        if config.subtitle_offset_step_ms <= 0 {
            return Err(invalid(
                "PLAYHEAD_SUBTITLE_OFFSET_STEP_MS",
                &config.subtitle_offset_step_ms.to_string(),
            ));
        }

        Ok(config)
    }

    /// Never zero, even when a deserialized or hand-built config says so
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn sleep_timer_tick(&self) -> Duration {
        Duration::from_millis(self.sleep_timer_tick_ms.max(1))
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn chapter_restart_threshold(&self) -> Millis {
        Millis(self.chapter_restart_threshold_ms)
    }

    pub fn subtitle_cue_grace(&self) -> Millis {
        Millis(self.subtitle_cue_grace_ms)
    }

    pub fn segment_leads(&self) -> SegmentLeads {
        SegmentLeads {
            intro_preview: Millis(self.intro_preview_lead_ms),
            next_up: Millis(self.next_up_lead_ms),
        }
    }
}

fn read_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| invalid(key, &raw))?;
    }
    Ok(())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
