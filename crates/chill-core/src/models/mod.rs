//! ChillPomodoro data models.
//!
//! Records are plain serde structs stored as JSON scrolls. Enums replace the
//! string discriminators wherever dispatch depends on them.

pub mod media;
pub mod session;
pub mod track;

pub use media::{AnimationKind, Collection, MediaMetadata, MediaPatch, MediaRecord, NewMedia};
pub use session::{BackgroundMode, SavedSession};
pub use track::{Preset, SoundTrack, TrackSource};
