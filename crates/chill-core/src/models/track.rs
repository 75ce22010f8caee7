//! Sound-mix slots and presets.
//!
//! A track is a slot in the active mix, not a sound: the same sound can sit
//! in two slots at two volumes. Preset tracks fan out to one mixer key per
//! contained sound, `"{track_id}_{sound_id}"`.

use serde::{Deserialize, Serialize};

/// What a track slot plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrackSource {
    Single { sound_id: String },
    Preset { preset_id: String },
}

/// One slot in the active mix. Ephemeral; persisted only inside a saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundTrack {
    pub id: String,
    #[serde(default)]
    pub source: Option<TrackSource>,
    #[serde(default = "full_volume")]
    pub volume: f32,
}

fn full_volume() -> f32 {
    1.0
}

impl SoundTrack {
    /// An empty slot at full volume.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: None,
            volume: 1.0,
        }
    }

    pub fn single(id: impl Into<String>, sound_id: impl Into<String>, volume: f32) -> Self {
        Self {
            id: id.into(),
            source: Some(TrackSource::Single { sound_id: sound_id.into() }),
            volume: crate::mixer::clamp_volume(volume),
        }
    }

    pub fn preset(id: impl Into<String>, preset_id: impl Into<String>, volume: f32) -> Self {
        Self {
            id: id.into(),
            source: Some(TrackSource::Preset { preset_id: preset_id.into() }),
            volume: crate::mixer::clamp_volume(volume),
        }
    }

    /// Mixer key for one sound of this slot.
    pub fn key_for(&self, sound_id: &str) -> String {
        match self.source {
            Some(TrackSource::Preset { .. }) => preset_key(&self.id, sound_id),
            _ => self.id.clone(),
        }
    }
}

pub fn preset_key(track_id: &str, sound_id: &str) -> String {
    format!("{}_{}", track_id, sound_id)
}

/// A named, persisted group of sounds played together as one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sound_ids: Vec<String>,
    #[serde(default)]
    pub created_ms: i64,
}

impl Preset {
    /// Keep first occurrence of each id, preserving order.
    pub(crate) fn dedup_sounds(ids: Vec<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }
}
