//! Stored media records and their payload-free projection.
//!
//! A record's `url` may hold a multi-megabyte base64 data URI, so list views
//! only ever see [`MediaMetadata`], which has no `url` field at all.

use serde::{Deserialize, Serialize};

/// The two persisted media collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Animations,
    Sounds,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Animations => "animations",
            Collection::Sounds => "sounds",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "animations" | "animation" => Some(Collection::Animations),
            "sounds" | "sound" => Some(Collection::Sounds),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of background an animation record holds. Sounds carry no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    Image,
    Gif,
    Video,
}

impl AnimationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(AnimationKind::Image),
            "gif" => Some(AnimationKind::Gif),
            "video" => Some(AnimationKind::Video),
            _ => None,
        }
    }
}

/// A full persisted record, payload included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AnimationKind>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default)]
    pub created_ms: i64,
}

impl MediaRecord {
    /// Strip the payload.
    pub fn metadata(&self, collection: Collection) -> MediaMetadata {
        MediaMetadata {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            volume: match collection {
                Collection::Sounds => Some(self.base_volume()),
                Collection::Animations => self.volume,
            },
        }
    }

    /// Stored sound volume, defaulting to full.
    pub fn base_volume(&self) -> f32 {
        crate::mixer::clamp_volume(self.volume.unwrap_or(1.0))
    }
}

/// List-view projection of a [`MediaRecord`]. Never authoritative; re-derived
/// from the store on every listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AnimationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
}

/// Input to `MediaStore::add`. The store assigns `id` and `created_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMedia {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<AnimationKind>,
    pub url: String,
    #[serde(default)]
    pub volume: Option<f32>,
}

impl NewMedia {
    pub fn sound(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            url: url.into(),
            volume: Some(1.0),
        }
    }

    pub fn animation(name: impl Into<String>, kind: AnimationKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            url: url.into(),
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Partial update. `url`, when present, replaces the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<AnimationKind>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub volume: Option<f32>,
}

impl MediaPatch {
    pub(crate) fn apply(self, record: &mut MediaRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(kind) = self.kind {
            record.kind = Some(kind);
        }
        if let Some(url) = self.url {
            record.url = url;
        }
        if let Some(volume) = self.volume {
            record.volume = Some(crate::mixer::clamp_volume(volume));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MediaRecord {
        MediaRecord {
            id: "1700000000000".into(),
            name: "Rain".into(),
            kind: None,
            url: "data:audio/wav;base64,UklGRg==".into(),
            volume: None,
            created_ms: 1,
        }
    }

    #[test]
    fn metadata_never_serializes_url() {
        let record = sample();
        let meta = record.metadata(Collection::Sounds);
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("url").is_none());
        assert_eq!(json["id"], "1700000000000");
        assert_eq!(json["name"], "Rain");
    }

    #[test]
    fn sound_metadata_defaults_volume_to_full() {
        let meta = sample().metadata(Collection::Sounds);
        assert_eq!(meta.volume, Some(1.0));
    }

    #[test]
    fn animation_metadata_keeps_type() {
        let mut record = sample();
        record.kind = Some(AnimationKind::Video);
        let meta = record.metadata(Collection::Animations);
        assert_eq!(meta.kind, Some(AnimationKind::Video));
        assert_eq!(meta.volume, None);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "video");
    }

    #[test]
    fn patch_replaces_whole_url_and_clamps_volume() {
        let mut record = sample();
        MediaPatch {
            url: Some("https://example.com/rain.mp3".into()),
            volume: Some(3.0),
            ..Default::default()
        }
        .apply(&mut record);
        assert_eq!(record.url, "https://example.com/rain.mp3");
        assert_eq!(record.volume, Some(1.0));
        assert_eq!(record.name, "Rain");
    }

    #[test]
    fn collection_parse() {
        assert_eq!(Collection::parse("sounds"), Some(Collection::Sounds));
        assert_eq!(Collection::parse("animation"), Some(Collection::Animations));
        assert_eq!(Collection::parse("videos"), None);
    }
}
