//! Saved focus sessions and background display settings.

use serde::{Deserialize, Serialize};

use super::track::SoundTrack;

/// A snapshot of a focus configuration. Loading one replaces the whole
/// current configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub sound_tracks: Vec<SoundTrack>,
    pub work_time: u32,
    pub break_time: u32,
    #[serde(default)]
    pub created_ms: i64,
}

/// How a background image/video is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    /// Letterboxed (contain).
    #[default]
    Fit,
    /// Cropped (cover).
    Fill,
}

impl BackgroundMode {
    pub fn toggled(self) -> Self {
        match self {
            BackgroundMode::Fit => BackgroundMode::Fill,
            BackgroundMode::Fill => BackgroundMode::Fit,
        }
    }
}
