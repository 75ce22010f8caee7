//! Engine configuration, read once from `/chill/settings/engine`.

use serde::{Deserialize, Serialize};

use crate::mixer::TICKING_VOLUME;
use crate::paths;
use crate::store::ListStore;
use crate::timer::{
    DEFAULT_BREAK_MINUTES, DEFAULT_NOTICE_SECONDS, DEFAULT_TICKING_THRESHOLD, DEFAULT_WORK_MINUTES,
    MAX_MINUTES,
};

/// Work lengths offered by the UI. The timer itself accepts any positive value.
pub const WORK_CHOICES: [u32; 6] = [15, 25, 30, 45, 60, 90];
pub const BREAK_CHOICES: [u32; 5] = [5, 10, 15, 20, 30];

/// Longest cue lead and notice the config may ask for, in seconds.
pub const MAX_CUE_SECONDS: u32 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub notice_seconds: u32,
    pub ticking_threshold: u32,
    pub ticking_volume: f32,
    /// Replaces the embedded countdown cue when set.
    pub ticking_source: Option<String>,
    pub heartbeat_ms: u64,
    pub work_minutes: u32,
    pub break_minutes: u32,
    /// Start/pause/reset also start and stop the sound mix.
    pub audio_follows_timer: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            notice_seconds: DEFAULT_NOTICE_SECONDS,
            ticking_threshold: DEFAULT_TICKING_THRESHOLD,
            ticking_volume: TICKING_VOLUME,
            ticking_source: None,
            heartbeat_ms: 250,
            work_minutes: DEFAULT_WORK_MINUTES,
            break_minutes: DEFAULT_BREAK_MINUTES,
            audio_follows_timer: true,
        }
    }
}

impl EngineConfig {
    /// Read the settings scroll. Missing or invalid config falls back to
    /// defaults with a warning.
    pub fn load(store: &dyn ListStore) -> Self {
        match store.read_setting(paths::SETTINGS_ENGINE) {
            Ok(Some(value)) => match serde_json::from_value::<EngineConfig>(value) {
                Ok(config) => config.sanitized(),
                Err(e) => {
                    log::warn!("chill: invalid engine config, using defaults: {}", e);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("chill: engine config unreadable, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Heartbeat sub-ticks per second.
    pub fn subs_per_second(&self) -> u64 {
        (1000 / self.heartbeat_ms.max(1)).max(1)
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.heartbeat_ms == 0 || self.heartbeat_ms > 1000 {
            log::warn!("chill: heartbeat_ms {} out of range, using {}", self.heartbeat_ms, defaults.heartbeat_ms);
            self.heartbeat_ms = defaults.heartbeat_ms;
        }
        if self.work_minutes == 0 || self.work_minutes > MAX_MINUTES {
            self.work_minutes = defaults.work_minutes;
        }
        if self.break_minutes == 0 || self.break_minutes > MAX_MINUTES {
            self.break_minutes = defaults.break_minutes;
        }
        if self.ticking_threshold > MAX_CUE_SECONDS {
            log::warn!("chill: ticking_threshold {} out of range, using {}", self.ticking_threshold, defaults.ticking_threshold);
            self.ticking_threshold = defaults.ticking_threshold;
        }
        if self.notice_seconds > MAX_CUE_SECONDS {
            self.notice_seconds = defaults.notice_seconds;
        }
        self.ticking_volume = crate::mixer::clamp_volume(self.ticking_volume);
        self
    }
}
