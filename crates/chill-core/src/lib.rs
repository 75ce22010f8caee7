//! chill-core: focus timer kernel over 9S scrolls.
//!
//! Three cooperating parts behind one [`Engine`]:
//!
//! ```text
//! MediaCache   payload-free listings, lazy full-record loads, manual eviction
//! AudioMixer   keyed, independently looped and volumed voices
//! Timer        work/break countdown with a ticking cue and break notice
//! ```
//!
//! Records, presets, sessions and settings persist as scrolls; the engine
//! mirrors every state snapshot to `/chill/timer/state` for watchers.

pub mod cache;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod library;
pub mod mixer;
pub mod models;
pub mod paths;
pub mod store;
pub mod timer;

#[cfg(test)]
mod testing;

pub use cache::{CacheStats, MediaCache};
pub use config::{EngineConfig, BREAK_CHOICES, WORK_CHOICES};
pub use effects::{AudioBackend, NoopBackend, Voice};
pub use engine::{Engine, EngineSnapshot};
pub use error::{ChillError, ChillResult};
pub use mixer::{AudioMixer, TrackStatus, TICKING_KEY};
pub use models::*;
pub use store::{ListStore, MediaStore, ShellStore};
pub use timer::{format_clock, Mode, Phase, Timer, TimerEvent, TimerSnapshot};
