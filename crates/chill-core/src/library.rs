//! Presets, saved sessions, and display settings over the list store.
//!
//! Lists are read and written whole. Unreadable entries are skipped with a
//! warning rather than failing the whole list.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ChillError, ChillResult};
use crate::models::{BackgroundMode, Preset, SavedSession};
use crate::paths;
use crate::store::{next_id, now_ms, ListStore};
use crate::timer::MAX_MINUTES;

pub struct Library {
    store: Arc<dyn ListStore>,
}

impl Library {
    pub fn new(store: Arc<dyn ListStore>) -> Self {
        Self { store }
    }

    // -----------------------------------------------------------------------
    // Presets
    // -----------------------------------------------------------------------

    pub fn presets(&self) -> ChillResult<Vec<Preset>> {
        self.read(paths::PRESETS)
    }

    pub fn preset(&self, id: &str) -> ChillResult<Option<Preset>> {
        Ok(self.presets()?.into_iter().find(|p| p.id == id))
    }

    pub fn add_preset(&self, name: &str, sound_ids: Vec<String>) -> ChillResult<Preset> {
        let name = required_name(name, "preset")?;
        let preset = Preset {
            id: next_id(),
            name,
            sound_ids: Preset::dedup_sounds(sound_ids),
            created_ms: now_ms(),
        };
        let mut presets = self.presets()?;
        presets.push(preset.clone());
        self.write(paths::PRESETS, &presets)?;
        Ok(preset)
    }

    pub fn update_preset(
        &self,
        id: &str,
        name: Option<&str>,
        sound_ids: Option<Vec<String>>,
    ) -> ChillResult<Preset> {
        let mut presets = self.presets()?;
        let preset = presets
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ChillError::InvalidInput(format!("unknown preset {}", id)))?;
        if let Some(name) = name {
            preset.name = required_name(name, "preset")?;
        }
        if let Some(ids) = sound_ids {
            preset.sound_ids = Preset::dedup_sounds(ids);
        }
        let updated = preset.clone();
        self.write(paths::PRESETS, &presets)?;
        Ok(updated)
    }

    pub fn delete_preset(&self, id: &str) -> ChillResult<bool> {
        let mut presets = self.presets()?;
        let before = presets.len();
        presets.retain(|p| p.id != id);
        if presets.len() == before {
            return Ok(false);
        }
        self.write(paths::PRESETS, &presets)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Saved sessions
    // -----------------------------------------------------------------------

    pub fn sessions(&self) -> ChillResult<Vec<SavedSession>> {
        self.read(paths::SESSIONS)
    }

    pub fn session(&self, id: &str) -> ChillResult<Option<SavedSession>> {
        Ok(self.sessions()?.into_iter().find(|s| s.id == id))
    }

    /// Persist `draft` under a fresh id. Sessions are immutable afterwards.
    pub fn save_session(&self, mut draft: SavedSession) -> ChillResult<SavedSession> {
        draft.name = required_name(&draft.name, "session")?;
        if draft.work_time == 0 || draft.break_time == 0 {
            return Err(ChillError::InvalidInput("session durations must be positive".into()));
        }
        if draft.work_time > MAX_MINUTES || draft.break_time > MAX_MINUTES {
            return Err(ChillError::InvalidInput("session durations are too long".into()));
        }
        draft.id = next_id();
        draft.created_ms = now_ms();
        let mut sessions = self.sessions()?;
        sessions.push(draft.clone());
        self.write(paths::SESSIONS, &sessions)?;
        Ok(draft)
    }

    pub fn delete_session(&self, id: &str) -> ChillResult<bool> {
        let mut sessions = self.sessions()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.write(paths::SESSIONS, &sessions)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Persisted background scaling; unreadable settings give the default.
    pub fn background_mode(&self) -> BackgroundMode {
        match self.store.read_setting(paths::SETTINGS_BACKGROUND) {
            Ok(Some(value)) => serde_json::from_value(value["mode"].clone()).unwrap_or_else(|e| {
                log::warn!("chill: bad background mode setting: {}", e);
                BackgroundMode::default()
            }),
            Ok(None) => BackgroundMode::default(),
            Err(e) => {
                log::warn!("chill: background setting unreadable: {}", e);
                BackgroundMode::default()
            }
        }
    }

    pub fn set_background_mode(&self, mode: BackgroundMode) -> ChillResult<()> {
        self.store
            .write_setting(paths::SETTINGS_BACKGROUND, serde_json::json!({ "mode": mode }))
    }

    fn read<T: DeserializeOwned>(&self, path: &str) -> ChillResult<Vec<T>> {
        Ok(self
            .store
            .read_list(path)?
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(v) => Some(v),
                Err(e) => {
                    log::warn!("chill: skipping unreadable entry in {}: {}", path, e);
                    None
                }
            })
            .collect())
    }

    fn write<T: Serialize>(&self, path: &str, items: &[T]) -> ChillResult<()> {
        let values = items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        self.store.write_list(path, values)
    }
}

fn required_name(name: &str, what: &str) -> ChillResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChillError::InvalidInput(format!("{} name must not be empty", what)));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SoundTrack;
    use crate::testing::MemoryStore;

    fn library() -> (Arc<MemoryStore>, Library) {
        let store = Arc::new(MemoryStore::default());
        (store.clone(), Library::new(store))
    }

    fn draft(name: &str) -> SavedSession {
        SavedSession {
            id: String::new(),
            name: name.into(),
            background: Some("a1".into()),
            sound_tracks: vec![SoundTrack::single("t1", "s1", 0.8)],
            work_time: 45,
            break_time: 10,
            created_ms: 0,
        }
    }

    #[test]
    fn preset_crud() {
        let (_, lib) = library();
        let p = lib.add_preset("Storm", vec!["s1".into(), "s2".into(), "s1".into()]).unwrap();
        assert_eq!(p.sound_ids, vec!["s1", "s2"]);
        assert_eq!(lib.presets().unwrap().len(), 1);

        let updated = lib.update_preset(&p.id, Some("Big storm"), None).unwrap();
        assert_eq!(updated.name, "Big storm");
        assert_eq!(updated.sound_ids, vec!["s1", "s2"]);
        assert_eq!(lib.preset(&p.id).unwrap().unwrap().name, "Big storm");

        assert!(lib.delete_preset(&p.id).unwrap());
        assert!(!lib.delete_preset(&p.id).unwrap());
        assert!(lib.presets().unwrap().is_empty());
    }

    #[test]
    fn preset_validation() {
        let (_, lib) = library();
        assert!(matches!(lib.add_preset("  ", vec![]), Err(ChillError::InvalidInput(_))));
        assert!(lib.update_preset("ghost", Some("x"), None).is_err());
    }

    #[test]
    fn session_save_and_delete() {
        let (_, lib) = library();
        let saved = lib.save_session(draft("Deep work")).unwrap();
        assert!(!saved.id.is_empty());
        let loaded = lib.session(&saved.id).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.sound_tracks[0].volume, 0.8);
        assert!(lib.delete_session(&saved.id).unwrap());
        assert!(lib.session(&saved.id).unwrap().is_none());
    }

    #[test]
    fn session_requires_name() {
        let (_, lib) = library();
        assert!(matches!(lib.save_session(draft("")), Err(ChillError::InvalidInput(_))));
        let mut endless = draft("Endless");
        endless.work_time = u32::MAX;
        assert!(matches!(lib.save_session(endless), Err(ChillError::InvalidInput(_))));
        assert!(lib.sessions().unwrap().is_empty());
    }

    #[test]
    fn store_failure_surfaces_to_caller() {
        let (store, lib) = library();
        store.set_offline(true);
        assert!(matches!(lib.save_session(draft("x")), Err(ChillError::StoreUnavailable(_))));
        assert!(lib.presets().is_err());
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let (store, lib) = library();
        store
            .write_list(
                paths::PRESETS,
                vec![
                    serde_json::json!({"id": "1", "name": "Ok", "sound_ids": ["s1"]}),
                    serde_json::json!({"bogus": true}),
                ],
            )
            .unwrap();
        let presets = lib.presets().unwrap();
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].name, "Ok");
    }

    #[test]
    fn background_mode_round_trips_and_defaults() {
        let (store, lib) = library();
        assert_eq!(lib.background_mode(), BackgroundMode::Fit);
        lib.set_background_mode(BackgroundMode::Fill).unwrap();
        assert_eq!(lib.background_mode(), BackgroundMode::Fill);
        store.set_offline(true);
        assert_eq!(lib.background_mode(), BackgroundMode::Fit);
    }
}
