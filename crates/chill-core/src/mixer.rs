//! Multi-track ambient mixer.
//!
//! Tracks are addressed by caller-chosen keys. Each key owns at most one
//! backend [`Voice`], created on first use and reused afterwards, so
//! replaying a key rewinds its handle instead of stacking new ones.
//!
//! Every backend failure is absorbed here: a blocked or broken track is
//! logged and reported as `None`, and its siblings keep playing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::effects::source::to_data_uri;
use crate::effects::{AudioBackend, Voice};

/// Reserved key for the countdown cue. User track ids never start with `__`.
pub const TICKING_KEY: &str = "__ticking";

/// Default cue volume.
pub const TICKING_VOLUME: f32 = 0.7;

static TICK_WAV: &[u8] = include_bytes!("../assets/tick.wav");

/// Clamp to [0, 1]; NaN maps to silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Embedded countdown cue as a data URI.
pub fn default_ticking_source() -> String {
    to_data_uri("audio/wav", TICK_WAV)
}

/// Observable state of one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStatus {
    pub key: String,
    pub playing: bool,
    pub looping: bool,
    pub volume: f32,
}

struct Handle {
    source: String,
    voice: Box<dyn Voice>,
    looping: bool,
    volume: f32,
}

impl Handle {
    fn status(&self, key: &str) -> TrackStatus {
        TrackStatus {
            key: key.to_string(),
            playing: self.voice.is_playing(),
            looping: self.looping,
            volume: self.volume,
        }
    }
}

pub struct AudioMixer {
    backend: Arc<dyn AudioBackend>,
    handles: HashMap<String, Handle>,
    ticking_source: String,
    ticking_volume: f32,
}

impl AudioMixer {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            handles: HashMap::new(),
            ticking_source: default_ticking_source(),
            ticking_volume: TICKING_VOLUME,
        }
    }

    /// Replace the countdown cue; `None` restores the embedded one.
    pub fn set_ticking_source(&mut self, source: Option<String>) {
        self.ticking_source = source.unwrap_or_else(default_ticking_source);
    }

    pub fn ticking_source(&self) -> &str {
        &self.ticking_source
    }

    pub fn set_ticking_volume(&mut self, volume: f32) {
        self.ticking_volume = clamp_volume(volume);
    }

    /// Start `key` from position zero. Returns `None` when the source cannot
    /// be opened or output is refused.
    pub fn play_sound(
        &mut self,
        key: &str,
        source_url: &str,
        looping: bool,
        volume: f32,
    ) -> Option<TrackStatus> {
        let volume = clamp_volume(volume);
        let handle = self.handle_for(key, source_url)?;
        handle.looping = looping;
        handle.volume = volume;
        handle.voice.set_looping(looping);
        handle.voice.set_volume(volume);
        handle.voice.rewind();

        match handle.voice.play() {
            Ok(()) => Some(handle.status(key)),
            Err(e) => {
                log::warn!("chill: playback of '{}' failed: {}", key, e);
                None
            }
        }
    }

    /// Pause and rewind `key`. No-op for unknown keys.
    pub fn stop_sound(&mut self, key: &str) {
        if let Some(handle) = self.handles.get_mut(key) {
            handle.voice.pause();
            handle.voice.rewind();
        }
    }

    pub fn stop_all(&mut self) {
        for handle in self.handles.values_mut() {
            handle.voice.pause();
            handle.voice.rewind();
        }
    }

    /// Stop a slot's own key and every derived `"{track_id}_{sound_id}"` key.
    pub fn stop_track(&mut self, track_id: &str) {
        let prefix = format!("{}_", track_id);
        for (key, handle) in self.handles.iter_mut() {
            if key == track_id || key.starts_with(&prefix) {
                handle.voice.pause();
                handle.voice.rewind();
            }
        }
    }

    /// Apply a clamped volume to a live handle. Keys without a handle are
    /// ignored; the next `play_sound` carries the volume instead.
    pub fn set_volume(&mut self, key: &str, volume: f32) {
        if let Some(handle) = self.handles.get_mut(key) {
            handle.volume = clamp_volume(volume);
            handle.voice.set_volume(handle.volume);
        }
    }

    /// One-shot countdown cue under [`TICKING_KEY`].
    pub fn play_ticking_sound(&mut self) -> Option<TrackStatus> {
        let source = self.ticking_source.clone();
        let volume = self.ticking_volume;
        self.play_sound(TICKING_KEY, &source, false, volume)
    }

    /// Stop everything and release all handles.
    pub fn dispose(&mut self) {
        self.stop_all();
        self.handles.clear();
    }

    pub fn status(&self, key: &str) -> Option<TrackStatus> {
        self.handles.get(key).map(|h| h.status(key))
    }

    /// Keys currently producing sound, sorted.
    pub fn playing_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, h)| h.voice.is_playing())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_playing(&self, key: &str) -> bool {
        self.handles.get(key).map(|h| h.voice.is_playing()).unwrap_or(false)
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    pub fn backend(&self) -> Arc<dyn AudioBackend> {
        Arc::clone(&self.backend)
    }

    /// True when `key` already holds a handle on `source_url`.
    pub fn has_source(&self, key: &str, source_url: &str) -> bool {
        self.handles
            .get(key)
            .map(|h| h.source == source_url)
            .unwrap_or(false)
    }

    /// Put a voice opened elsewhere under `key`, pausing and dropping the
    /// previous handle. The next `play_sound` with the same source reuses it.
    pub fn install(&mut self, key: &str, source_url: &str, voice: Box<dyn Voice>) {
        if let Some(mut old) = self.handles.remove(key) {
            old.voice.pause();
        }
        self.handles.insert(
            key.to_string(),
            Handle {
                source: source_url.to_string(),
                voice,
                looping: false,
                volume: 1.0,
            },
        );
    }

    fn handle_for(&mut self, key: &str, source_url: &str) -> Option<&mut Handle> {
        if !self.has_source(key, source_url) {
            match self.backend.open(source_url) {
                Ok(voice) => self.install(key, source_url, voice),
                Err(e) => {
                    if let Some(mut old) = self.handles.remove(key) {
                        old.voice.pause();
                    }
                    log::warn!("chill: cannot open source for '{}': {}", key, e);
                    return None;
                }
            }
        }
        self.handles.get_mut(key)
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.stop_all();
    }
}
