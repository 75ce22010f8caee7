//! Chill engine: timer, sound mix, and media cache behind one handle.
//!
//! Owns the state machine, the mixer, and the cache, and runs a
//! clock-driven heartbeat thread that advances the countdown once per
//! second. Every transition produces an [`EngineSnapshot`], pushed to
//! subscribers and mirrored to `/chill/timer/state`.
//!
//! Lock order is timer, then focus state, then mixer. Track loads run on
//! their own threads and open their voices with no lock held; they re-check
//! the playback epoch, the slot, and the deletion set under the mixer lock
//! before starting output, so a stop or delete issued mid-load always wins.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use beeclock_core::Clock;
use nine_s_core::scroll::Scroll;
use nine_s_shell::Shell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStats, MediaCache};
use crate::config::EngineConfig;
#[cfg(feature = "native")]
use crate::effects::audio::NativeBackend;
use crate::effects::{import, AudioBackend, Voice};
use crate::error::{ChillError, ChillResult};
use crate::library::Library;
use crate::mixer::{AudioMixer, TrackStatus, TICKING_KEY};
use crate::models::track::preset_key;
use crate::models::{
    AnimationKind, BackgroundMode, Collection, MediaMetadata, MediaPatch, MediaRecord, NewMedia,
    Preset, SavedSession, SoundTrack, TrackSource,
};
use crate::paths;
use crate::store::{next_id, ListStore, MediaStore, ShellStore};
use crate::timer::{Mode, Phase, Timer, TimerEvent, TimerSnapshot};

/// Everything the UI renders, emitted on every tick and transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(flatten)]
    pub timer: TimerSnapshot,
    pub tracks: Vec<SoundTrack>,
    pub background: Option<String>,
    pub background_visible: bool,
    pub ui_hidden: bool,
    pub background_mode: BackgroundMode,
    pub audio_playing: bool,
    pub playing_keys: Vec<String>,
}

/// UI-session state the timer consults but does not own.
#[derive(Debug, Clone, Default)]
struct FocusState {
    tracks: Vec<SoundTrack>,
    background: Option<String>,
    background_visible: bool,
    ui_hidden: bool,
    background_mode: BackgroundMode,
    audio_playing: bool,
    preview: Option<String>,
}

struct Shared {
    config: EngineConfig,
    cache: MediaCache,
    library: Library,
    lists: Arc<dyn ListStore>,
    timer: Mutex<Timer>,
    focus: Mutex<FocusState>,
    mixer: Mutex<AudioMixer>,
    /// Bumped by every audio start and stop; loads from an older epoch are dropped.
    epoch: AtomicU64,
    /// Sound ids deleted during this run; loaders still holding their
    /// records must not start them.
    deleted_sounds: Mutex<HashSet<String>>,
    loaders: Mutex<Vec<JoinHandle<()>>>,
    subscribers: Mutex<Vec<Sender<EngineSnapshot>>>,
    shutdown: AtomicBool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    shared: Arc<Shared>,
    shell: Option<Arc<ShellStore>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Boot over a 9S shell with the native (cpal) audio backend.
    #[cfg(feature = "native")]
    pub fn new(shell: Shell) -> Self {
        Self::with_backend(shell, Arc::new(NativeBackend::new()))
    }

    /// Boot over a 9S shell with a custom audio backend.
    ///
    /// Use `NoopBackend` for headless/WASM (state only, no audio output).
    pub fn with_backend(shell: Shell, audio: Arc<dyn AudioBackend>) -> Self {
        let store = Arc::new(ShellStore::new(shell));
        let mut engine = Self::with_stores(store.clone(), store.clone(), audio);
        engine.shell = Some(store);
        engine
    }

    /// Boot over arbitrary store implementations.
    pub fn with_stores(
        media: Arc<dyn MediaStore>,
        lists: Arc<dyn ListStore>,
        audio: Arc<dyn AudioBackend>,
    ) -> Self {
        let config = EngineConfig::load(&*lists);
        let library = Library::new(Arc::clone(&lists));

        let timer = Timer::new(config.work_minutes, config.break_minutes)
            .with_notice_seconds(config.notice_seconds)
            .with_ticking_threshold(config.ticking_threshold);

        let mut mixer = AudioMixer::new(audio);
        mixer.set_ticking_source(config.ticking_source.clone());
        mixer.set_ticking_volume(config.ticking_volume);

        let focus = FocusState {
            background_mode: library.background_mode(),
            ..FocusState::default()
        };

        let shared = Arc::new(Shared {
            config,
            cache: MediaCache::new(media),
            library,
            lists,
            timer: Mutex::new(timer),
            focus: Mutex::new(focus),
            mixer: Mutex::new(mixer),
            epoch: AtomicU64::new(0),
            deleted_sounds: Mutex::new(HashSet::new()),
            loaders: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        });
        shared.publish();

        Self {
            shared,
            shell: None,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the heartbeat. Idempotent.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() || self.shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        handles.push(self.start_heartbeat());
    }

    /// Stop audio, join every thread, and release cached payloads.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.stop_audio();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        self.wait_for_loaders();

        self.shared.mixer.lock().dispose();
        self.shared.cache.clear_all();
        self.shared.subscribers.lock().clear();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Underlying shell, when the engine was booted over one.
    pub fn shell(&self) -> Option<&Shell> {
        self.shell.as_deref().map(|s| s.shell())
    }

    /// Watch scroll changes under `pattern` (see `paths::WATCH_*`).
    pub fn watch(&self, pattern: &str) -> ChillResult<Receiver<Scroll>> {
        let store = self
            .shell
            .as_ref()
            .ok_or_else(|| ChillError::UnsupportedSource("engine has no shell to watch".into()))?;
        Ok(store.shell().on(pattern)?)
    }

    /// Snapshot feed. Senders whose receiver is gone are dropped on the next publish.
    pub fn subscribe(&self) -> Receiver<EngineSnapshot> {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(self.shared.snapshot());
        self.shared.subscribers.lock().push(tx);
        rx
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.shared.snapshot()
    }

    /// Block until every in-flight track load has settled.
    pub fn wait_for_loaders(&self) {
        loop {
            let pending: Vec<_> = self.shared.loaders.lock().drain(..).collect();
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                let _ = handle.join();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timer
    // -----------------------------------------------------------------------

    /// Begin the countdown. With `audio_follows_timer`, also resolves and
    /// starts every configured track. Returns false when already running.
    pub fn start_timer(&self) -> bool {
        let started = self.shared.timer.lock().start();
        if started {
            if self.shared.config.audio_follows_timer {
                self.shared.start_audio();
            }
            self.shared.publish();
        }
        started
    }

    /// Stop the countdown, keeping the remaining time.
    pub fn pause_timer(&self) -> bool {
        let paused = self.shared.timer.lock().pause();
        if paused {
            if self.shared.config.audio_follows_timer {
                self.shared.stop_audio();
            }
            self.shared.publish();
        }
        paused
    }

    /// Start when idle, pause when running. Returns whether it now runs.
    pub fn toggle_timer(&self) -> bool {
        if self.shared.timer.lock().is_running() {
            self.pause_timer();
            false
        } else {
            self.start_timer()
        }
    }

    /// Refill the current mode from any phase. Background state is untouched.
    pub fn reset_timer(&self) {
        self.shared.timer.lock().reset();
        if self.shared.config.audio_follows_timer {
            self.shared.stop_audio();
        }
        self.shared.publish();
    }

    pub fn dismiss_notice(&self) -> bool {
        let dismissed = self.shared.timer.lock().dismiss_notice();
        if dismissed {
            self.shared.publish();
        }
        dismissed
    }

    /// One elapsed second. Called by the heartbeat; public so embedders and
    /// tests can drive simulated time.
    pub fn advance_second(&self) {
        self.shared.advance_second();
    }

    pub fn set_work_minutes(&self, minutes: u32) -> ChillResult<()> {
        self.shared.timer.lock().set_work_minutes(minutes)?;
        self.shared.publish();
        Ok(())
    }

    pub fn set_break_minutes(&self, minutes: u32) -> ChillResult<()> {
        self.shared.timer.lock().set_break_minutes(minutes)?;
        self.shared.publish();
        Ok(())
    }

    /// Switch to `mode` with a full interval. Stops the countdown.
    pub fn set_mode(&self, mode: Mode) {
        self.shared.timer.lock().set_mode(mode);
        self.shared.publish();
    }

    pub fn phase(&self) -> Phase {
        self.shared.timer.lock().phase()
    }

    // -----------------------------------------------------------------------
    // Sound tracks
    // -----------------------------------------------------------------------

    pub fn tracks(&self) -> Vec<SoundTrack> {
        self.shared.focus.lock().tracks.clone()
    }

    /// Append an empty slot at full volume.
    pub fn add_track(&self) -> SoundTrack {
        let track = SoundTrack::new(next_id());
        self.shared.focus.lock().tracks.push(track.clone());
        self.shared.publish();
        track
    }

    /// Remove a slot and silence every key it owns.
    pub fn remove_track(&self, track_id: &str) -> bool {
        let removed = {
            let mut focus = self.shared.focus.lock();
            let before = focus.tracks.len();
            focus.tracks.retain(|t| t.id != track_id);
            let removed = focus.tracks.len() != before;
            if removed {
                self.shared.mixer.lock().stop_track(track_id);
            }
            removed
        };
        if removed {
            self.shared.publish();
        }
        removed
    }

    /// Point a slot at a sound, a preset, or nothing. A playing mix restarts
    /// just this slot.
    pub fn set_track_source(&self, track_id: &str, source: Option<TrackSource>) -> bool {
        let restart = {
            let mut focus = self.shared.focus.lock();
            let Some(track) = focus.tracks.iter_mut().find(|t| t.id == track_id) else {
                return false;
            };
            track.source = source;
            let track = track.clone();
            self.shared.mixer.lock().stop_track(track_id);
            focus.audio_playing.then_some(track)
        };
        if let Some(track) = restart {
            let epoch = self.shared.epoch.load(Ordering::SeqCst);
            Shared::spawn_loader(&self.shared, track, epoch);
        }
        self.shared.publish();
        true
    }

    /// Change a slot's volume and apply the final volume (sound volume x
    /// slot volume) to its live keys.
    pub fn set_track_volume(&self, track_id: &str, volume: f32) -> bool {
        let volume = crate::mixer::clamp_volume(volume);
        let track = {
            let mut focus = self.shared.focus.lock();
            let Some(track) = focus.tracks.iter_mut().find(|t| t.id == track_id) else {
                return false;
            };
            track.volume = volume;
            track.clone()
        };

        let keyed = self.shared.resolve_track(&track);
        {
            let mut mixer = self.shared.mixer.lock();
            for (key, record) in keyed {
                mixer.set_volume(&key, record.base_volume() * volume);
            }
        }
        self.shared.publish();
        true
    }

    /// Replace the whole mix. Keys of the old slots are silenced; a playing
    /// mix starts the new slots.
    pub fn set_tracks(&self, tracks: Vec<SoundTrack>) {
        let playing = {
            let mut focus = self.shared.focus.lock();
            let mut mixer = self.shared.mixer.lock();
            for old in &focus.tracks {
                mixer.stop_track(&old.id);
            }
            drop(mixer);
            focus.tracks = tracks;
            focus.audio_playing
        };
        if playing {
            self.shared.start_audio();
        }
        self.shared.publish();
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    pub fn start_audio(&self) {
        self.shared.start_audio();
        self.shared.publish();
    }

    pub fn stop_audio(&self) {
        self.shared.stop_audio();
        self.shared.publish();
    }

    /// Returns whether audio is now on.
    pub fn toggle_audio(&self) -> bool {
        if self.shared.focus.lock().audio_playing {
            self.stop_audio();
            false
        } else {
            self.start_audio();
            true
        }
    }

    pub fn is_audio_playing(&self) -> bool {
        self.shared.focus.lock().audio_playing
    }

    pub fn track_status(&self, key: &str) -> Option<TrackStatus> {
        self.shared.mixer.lock().status(key)
    }

    pub fn playing_keys(&self) -> Vec<String> {
        self.shared.mixer.lock().playing_keys()
    }

    /// Play a sound once under `preview:{id}`, replacing any running preview.
    pub fn preview_sound(&self, sound_id: &str) -> Option<TrackStatus> {
        let record = self.shared.cache.load_full_cached(Collection::Sounds, sound_id)?;
        let key = preview_key(sound_id);
        let voice = match self.shared.prepare_voice(&key, &record.url) {
            Ok(voice) => voice,
            Err(e) => {
                log::warn!("chill: cannot open source for '{}': {}", key, e);
                return None;
            }
        };
        let mut focus = self.shared.focus.lock();
        let mut mixer = self.shared.mixer.lock();
        if self.shared.is_deleted(&record.id) {
            log::debug!("chill: {} was deleted before its preview opened", sound_id);
            return None;
        }
        if let Some(previous) = focus.preview.take() {
            mixer.stop_sound(&previous);
        }
        if let Some(voice) = voice {
            mixer.install(&key, &record.url, voice);
        }
        let status = mixer.play_sound(&key, &record.url, false, record.base_volume());
        if status.is_some() {
            focus.preview = Some(key);
        }
        status
    }

    pub fn stop_preview(&self) {
        let mut focus = self.shared.focus.lock();
        if let Some(key) = focus.preview.take() {
            self.shared.mixer.lock().stop_sound(&key);
        }
    }

    // -----------------------------------------------------------------------
    // Background
    // -----------------------------------------------------------------------

    /// Select (or clear) the background. Returns the loaded record; a stale
    /// id stays selected but resolves to `None`.
    pub fn select_background(&self, id: Option<&str>) -> Option<Arc<MediaRecord>> {
        self.shared.focus.lock().background = id.map(String::from);
        self.shared.publish();
        self.background()
    }

    pub fn background(&self) -> Option<Arc<MediaRecord>> {
        let id = self.shared.focus.lock().background.clone()?;
        self.shared.cache.load_full_cached(Collection::Animations, &id)
    }

    /// Show or hide the background. Hiding it also brings the UI back.
    pub fn toggle_background(&self) -> bool {
        let visible = {
            let mut focus = self.shared.focus.lock();
            focus.background_visible = !focus.background_visible;
            if !focus.background_visible {
                focus.ui_hidden = false;
            }
            focus.background_visible
        };
        self.shared.publish();
        visible
    }

    /// Hide the controls over a visible background. No-op otherwise.
    pub fn toggle_ui_hidden(&self) -> bool {
        let hidden = {
            let mut focus = self.shared.focus.lock();
            if focus.background_visible {
                focus.ui_hidden = !focus.ui_hidden;
            }
            focus.ui_hidden
        };
        self.shared.publish();
        hidden
    }

    pub fn background_mode(&self) -> BackgroundMode {
        self.shared.focus.lock().background_mode
    }

    /// Flip fit/fill and persist it.
    pub fn toggle_background_mode(&self) -> BackgroundMode {
        let mode = {
            let mut focus = self.shared.focus.lock();
            focus.background_mode = focus.background_mode.toggled();
            focus.background_mode
        };
        log_err(self.shared.library.set_background_mode(mode), "persist background mode");
        self.shared.publish();
        mode
    }

    // -----------------------------------------------------------------------
    // Media library
    // -----------------------------------------------------------------------

    pub fn list_media(&self, collection: Collection) -> Vec<MediaMetadata> {
        self.shared.cache.list_metadata(collection)
    }

    pub fn load_media(&self, collection: Collection, id: &str) -> Option<Arc<MediaRecord>> {
        self.shared.cache.load_full_cached(collection, id)
    }

    pub fn add_media(&self, collection: Collection, media: NewMedia) -> ChillResult<MediaRecord> {
        self.shared.cache.store().add(collection, media)
    }

    /// Update a record and drop its cached copy.
    pub fn update_media(
        &self,
        collection: Collection,
        id: &str,
        patch: MediaPatch,
    ) -> ChillResult<MediaRecord> {
        let record = self.shared.cache.store().update(collection, id, patch)?;
        self.shared.cache.evict(collection, &[id]);
        Ok(record)
    }

    /// Delete a record, drop its cached copy, and silence anything playing it.
    pub fn delete_media(&self, collection: Collection, id: &str) -> ChillResult<bool> {
        let deleted = self.shared.cache.store().delete(collection, id)?;
        self.shared.cache.evict(collection, &[id]);
        if collection == Collection::Sounds {
            self.shared.deleted_sounds.lock().insert(id.to_string());
            let mut focus = self.shared.focus.lock();
            let mut mixer = self.shared.mixer.lock();
            for track in &focus.tracks {
                match &track.source {
                    Some(TrackSource::Single { sound_id }) if sound_id == id => {
                        mixer.stop_sound(&track.id)
                    }
                    Some(TrackSource::Preset { .. }) => mixer.stop_sound(&preset_key(&track.id, id)),
                    _ => {}
                }
            }
            let key = preview_key(id);
            mixer.stop_sound(&key);
            if focus.preview.as_deref() == Some(key.as_str()) {
                focus.preview = None;
            }
        }
        Ok(deleted)
    }

    /// Import a file or a directory tree.
    pub fn import(&self, path: &Path) -> ChillResult<Vec<MediaRecord>> {
        import::import_path(&**self.shared.cache.store(), path)
    }

    /// Store an external URL reference.
    pub fn add_url(
        &self,
        collection: Collection,
        name: &str,
        url: &str,
        kind: Option<AnimationKind>,
    ) -> ChillResult<MediaRecord> {
        import::add_url(&**self.shared.cache.store(), collection, name, url, kind)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Evict cached payloads the current configuration does not reference.
    /// Returns how many entries were dropped.
    pub fn clear_unused_cache(&self) -> usize {
        let (tracks, background) = {
            let focus = self.shared.focus.lock();
            (focus.tracks.clone(), focus.background.clone())
        };
        let mut sounds = Vec::new();
        for track in &tracks {
            match &track.source {
                Some(TrackSource::Single { sound_id }) => sounds.push(sound_id.clone()),
                Some(TrackSource::Preset { preset_id }) => {
                    if let Ok(Some(preset)) = self.shared.library.preset(preset_id) {
                        sounds.extend(preset.sound_ids);
                    }
                }
                None => {}
            }
        }
        let animations: Vec<String> = background.into_iter().collect();
        self.shared.cache.retain_only(Collection::Sounds, &sounds)
            + self.shared.cache.retain_only(Collection::Animations, &animations)
    }

    // -----------------------------------------------------------------------
    // Presets and saved sessions
    // -----------------------------------------------------------------------

    pub fn presets(&self) -> ChillResult<Vec<Preset>> {
        self.shared.library.presets()
    }

    pub fn add_preset(&self, name: &str, sound_ids: Vec<String>) -> ChillResult<Preset> {
        self.shared.library.add_preset(name, sound_ids)
    }

    pub fn update_preset(
        &self,
        id: &str,
        name: Option<&str>,
        sound_ids: Option<Vec<String>>,
    ) -> ChillResult<Preset> {
        self.shared.library.update_preset(id, name, sound_ids)
    }

    /// Delete a preset and silence the slots that play it.
    pub fn delete_preset(&self, id: &str) -> ChillResult<bool> {
        let deleted = self.shared.library.delete_preset(id)?;
        let focus = self.shared.focus.lock();
        let mut mixer = self.shared.mixer.lock();
        for track in &focus.tracks {
            if matches!(&track.source, Some(TrackSource::Preset { preset_id }) if preset_id == id) {
                mixer.stop_track(&track.id);
            }
        }
        Ok(deleted)
    }

    pub fn sessions(&self) -> ChillResult<Vec<SavedSession>> {
        self.shared.library.sessions()
    }

    /// Save the current background, tracks, and durations under `name`.
    pub fn save_session(&self, name: &str) -> ChillResult<SavedSession> {
        let (work_time, break_time) = {
            let timer = self.shared.timer.lock();
            (timer.work_minutes(), timer.break_minutes())
        };
        let (background, sound_tracks) = {
            let focus = self.shared.focus.lock();
            (focus.background.clone(), focus.tracks.clone())
        };
        self.shared.library.save_session(SavedSession {
            id: String::new(),
            name: name.to_string(),
            background,
            sound_tracks,
            work_time,
            break_time,
            created_ms: 0,
        })
    }

    /// Replace the whole configuration with a saved session and reset the
    /// timer. Nothing from the previous configuration survives.
    pub fn load_session(&self, id: &str) -> ChillResult<SavedSession> {
        let session = self
            .shared
            .library
            .session(id)?
            .ok_or_else(|| ChillError::InvalidInput(format!("unknown session {}", id)))?;

        self.shared.stop_audio();
        {
            let mut timer = self.shared.timer.lock();
            timer.set_work_minutes(session.work_time)?;
            timer.set_break_minutes(session.break_time)?;
            timer.set_mode(Mode::Work);
            timer.reset();
        }
        {
            let mut focus = self.shared.focus.lock();
            focus.tracks = session.sound_tracks.clone();
            focus.background = session.background.clone();
        }
        self.shared.publish();
        Ok(session)
    }

    pub fn delete_session(&self, id: &str) -> ChillResult<bool> {
        self.shared.library.delete_session(id)
    }

    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    /// Clock-driven heartbeat. The clock ticks every `heartbeat_ms`; each
    /// `second` pulse advances the countdowns by one second.
    fn start_heartbeat(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let period = Duration::from_millis(shared.config.heartbeat_ms);
        let subs = shared.config.subs_per_second();

        thread::spawn(move || {
            let mut clock = build_clock(subs);
            let mut fallback_subs = 0u64;

            while !shared.shutdown.load(Ordering::SeqCst) {
                thread::sleep(period);
                if shared.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let second = match clock.as_mut() {
                    Some(clock) => clock.tick().pulses.iter().any(|p| p.name == "second"),
                    None => {
                        fallback_subs += 1;
                        fallback_subs % subs == 0
                    }
                };
                if second {
                    shared.advance_second();
                }
            }
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

impl Shared {
    fn advance_second(&self) {
        let (events, active) = {
            let mut timer = self.timer.lock();
            let notice_showing = timer.break_countdown().is_some();
            let was_running = timer.is_running();
            let mut events = timer.tick();
            if notice_showing {
                events.extend(timer.tick_notice());
            }
            (events, was_running || notice_showing)
        };

        for event in &events {
            match event {
                TimerEvent::TickingCue => self.play_ticking_cue(),
                TimerEvent::Expired { next } => {
                    log::info!("chill: interval over, next up: {}", next.as_str());
                    self.focus.lock().ui_hidden = false;
                }
                TimerEvent::NoticeEnded => {}
            }
        }

        if active || !events.is_empty() {
            self.publish();
        }
    }

    /// Resolve and start every slot on its own loader thread.
    fn start_audio(self: &Arc<Self>) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let tracks = {
            let mut focus = self.focus.lock();
            focus.audio_playing = true;
            focus.tracks.clone()
        };
        for track in tracks {
            Shared::spawn_loader(self, track, epoch);
        }
    }

    /// Invalidate pending loads, then silence the mix. Previews stop too.
    fn stop_audio(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut focus = self.focus.lock();
        focus.audio_playing = false;
        focus.preview = None;
        self.mixer.lock().stop_all();
    }

    fn spawn_loader(shared: &Arc<Self>, track: SoundTrack, epoch: u64) {
        if track.source.is_none() {
            return;
        }
        let worker = Arc::clone(shared);
        let handle = thread::spawn(move || worker.load_and_play(&track, epoch));
        let mut loaders = shared.loaders.lock();
        loaders.retain(|h| !h.is_finished());
        loaders.push(handle);
    }

    fn load_and_play(&self, track: &SoundTrack, epoch: u64) {
        for (key, record) in self.resolve_track(track) {
            let voice = match self.prepare_voice(&key, &record.url) {
                Ok(voice) => voice,
                Err(e) => {
                    log::warn!("chill: cannot open source for '{}': {}", key, e);
                    continue;
                }
            };

            // The slot's volume may have moved while loading.
            let focus = self.focus.lock();
            let Some(current) = focus.tracks.iter().find(|t| t.id == track.id) else {
                log::debug!("chill: track {} removed during load", track.id);
                return;
            };
            if current.source != track.source {
                log::debug!("chill: track {} changed source during load", track.id);
                return;
            }
            let volume = record.base_volume() * current.volume;
            let mut mixer = self.mixer.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch || self.shutdown.load(Ordering::SeqCst) {
                log::debug!("chill: discarding stale load for {}", key);
                return;
            }
            if self.is_deleted(&record.id) {
                log::debug!("chill: {} was deleted during load", record.id);
                continue;
            }
            match voice {
                Some(voice) => mixer.install(&key, &record.url, voice),
                None if !mixer.has_source(&key, &record.url) => {
                    log::debug!("chill: handle for {} was released during load", key);
                    continue;
                }
                None => {}
            }
            mixer.play_sound(&key, &record.url, true, volume);
        }
        self.publish();
    }

    fn play_ticking_cue(&self) {
        let source = self.mixer.lock().ticking_source().to_string();
        match self.prepare_voice(TICKING_KEY, &source) {
            Ok(Some(voice)) => self.mixer.lock().install(TICKING_KEY, &source, voice),
            Ok(None) => {}
            Err(e) => {
                log::warn!("chill: cannot open ticking cue: {}", e);
                return;
            }
        }
        self.mixer.lock().play_ticking_sound();
    }

    /// Open a voice for `key` without holding any lock. `Ok(None)` means the
    /// mixer already holds this source and `play_sound` will reuse it.
    fn prepare_voice(&self, key: &str, source_url: &str) -> ChillResult<Option<Box<dyn Voice>>> {
        let backend = {
            let mixer = self.mixer.lock();
            if mixer.has_source(key, source_url) {
                return Ok(None);
            }
            mixer.backend()
        };
        backend.open(source_url).map(Some)
    }

    fn is_deleted(&self, sound_id: &str) -> bool {
        self.deleted_sounds.lock().contains(sound_id)
    }

    /// Mixer keys and loaded records for one slot. Unloadable sounds are skipped.
    fn resolve_track(&self, track: &SoundTrack) -> Vec<(String, Arc<MediaRecord>)> {
        match &track.source {
            Some(TrackSource::Single { sound_id }) => self
                .cache
                .load_full_cached(Collection::Sounds, sound_id)
                .map(|record| vec![(track.id.clone(), record)])
                .unwrap_or_default(),
            Some(TrackSource::Preset { preset_id }) => {
                let preset = match self.library.preset(preset_id) {
                    Ok(Some(preset)) => preset,
                    Ok(None) => {
                        log::warn!("chill: track {} references missing preset {}", track.id, preset_id);
                        return Vec::new();
                    }
                    Err(e) => {
                        log::warn!("chill: loading preset {} failed: {}", preset_id, e);
                        return Vec::new();
                    }
                };
                preset
                    .sound_ids
                    .iter()
                    .filter_map(|sound_id| {
                        self.cache
                            .load_full_cached(Collection::Sounds, sound_id)
                            .map(|record| (preset_key(&track.id, sound_id), record))
                    })
                    .collect()
            }
            None => Vec::new(),
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let timer = self.timer.lock();
        let focus = self.focus.lock();
        let mixer = self.mixer.lock();
        EngineSnapshot {
            timer: timer.snapshot(),
            tracks: focus.tracks.clone(),
            background: focus.background.clone(),
            background_visible: focus.background_visible,
            ui_hidden: focus.ui_hidden,
            background_mode: focus.background_mode,
            audio_playing: focus.audio_playing,
            playing_keys: mixer.playing_keys(),
        }
    }

    /// Push a snapshot to subscribers and mirror it to the timer scroll.
    fn publish(&self) {
        let snapshot = self.snapshot();
        match serde_json::to_value(&snapshot) {
            Ok(value) => {
                log_err(self.lists.write_setting(paths::TIMER_STATE, value), "mirror timer state");
            }
            Err(e) => log::warn!("chill: cannot serialise snapshot: {}", e),
        }
        self.subscribers
            .lock()
            .retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn preview_key(sound_id: &str) -> String {
    format!("preview:{}", sound_id)
}

/// `sub` counts heartbeat ticks within a second, `second` counts seconds
/// within a minute; the `second` pulse fires once per `subs` ticks.
fn build_clock(subs: u64) -> Option<Clock> {
    match Clock::builder()
        .least_significant_first()
        .partition("sub", subs)
        .partition("second", 60)
        .pulse_every("second", subs)
        .build()
    {
        Ok(clock) => Some(clock),
        Err(e) => {
            log::error!("chill: heartbeat clock build failed, counting ticks instead: {:?}", e);
            None
        }
    }
}

/// Log errors from store operations without panicking.
fn log_err<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            log::warn!("chill: {} failed: {}", context, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, TestBackend};
    use std::time::Instant;

    fn engine() -> (Arc<MemoryStore>, Engine) {
        engine_with(Arc::new(TestBackend::default()))
    }

    fn engine_with(backend: Arc<TestBackend>) -> (Arc<MemoryStore>, Engine) {
        let store = Arc::new(MemoryStore::default());
        store.insert(Collection::Sounds, "sound1", "Rain", "rain.wav");
        store.insert(Collection::Sounds, "sound2", "Waves", "waves.wav");
        store.insert(Collection::Sounds, "sound3", "Fire", "fire.wav");
        store.insert(Collection::Animations, "bg1", "Forest", "forest.mp4");
        let engine = Engine::with_stores(store.clone(), store.clone(), backend);
        (store, engine)
    }

    /// Engine whose "slow1" sound parks in `open` until the backend is released.
    fn gated_engine() -> (Arc<TestBackend>, Arc<MemoryStore>, Engine) {
        let backend = Arc::new(TestBackend::default());
        let (store, engine) = engine_with(backend.clone());
        store.insert(Collection::Sounds, "slow1", "Thunder", "slow-thunder.wav");
        (backend, store, engine)
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    fn two_track_mix(engine: &Engine) {
        let preset = engine
            .add_preset("Storm", vec!["sound2".into(), "sound3".into()])
            .unwrap();
        engine.set_tracks(vec![
            SoundTrack::single("A", "sound1", 0.8),
            SoundTrack::preset("B", preset.id, 1.0),
        ]);
    }

    #[test]
    fn start_plays_single_and_expanded_preset_tracks() {
        let (_, engine) = engine();
        two_track_mix(&engine);
        assert!(engine.start_timer());
        engine.wait_for_loaders();

        assert_eq!(engine.playing_keys(), vec!["A", "B_sound2", "B_sound3"]);
        for key in ["A", "B_sound2", "B_sound3"] {
            let status = engine.track_status(key).unwrap();
            assert!(status.playing);
            assert!(status.looping);
        }
        assert!((engine.track_status("A").unwrap().volume - 0.8).abs() < 1e-6);
    }

    #[test]
    fn track_slots_can_be_added_pointed_and_removed() {
        let (_, engine) = engine();
        let slot = engine.add_track();
        assert_eq!(slot.source, None);
        assert_eq!(slot.volume, 1.0);
        assert_eq!(engine.tracks().len(), 1);

        engine.start_audio();
        assert!(engine.set_track_source(
            &slot.id,
            Some(TrackSource::Single { sound_id: "sound2".into() })
        ));
        engine.wait_for_loaders();
        assert_eq!(engine.playing_keys(), vec![slot.id.clone()]);

        assert!(engine.set_track_source(&slot.id, None));
        engine.wait_for_loaders();
        assert!(engine.playing_keys().is_empty());

        assert!(engine.remove_track(&slot.id));
        assert!(!engine.remove_track(&slot.id));
        assert!(!engine.set_track_source("ghost", None));
        assert!(engine.tracks().is_empty());
    }

    #[test]
    fn pause_during_load_leaves_nothing_playing() {
        let (backend, _, engine) = gated_engine();
        engine.set_tracks(vec![SoundTrack::single("A", "slow1", 1.0)]);
        engine.start_timer();
        assert!(backend.wait_parked(1));

        assert!(engine.pause_timer());
        backend.release();
        engine.wait_for_loaders();
        assert!(engine.playing_keys().is_empty());
        assert!(engine.track_status("A").is_none());
        assert!(!engine.is_audio_playing());
    }

    #[test]
    fn slow_open_does_not_stall_timer_or_siblings() {
        let (backend, _, engine) = gated_engine();
        engine.set_tracks(vec![
            SoundTrack::single("A", "slow1", 1.0),
            SoundTrack::single("B", "sound1", 1.0),
        ]);
        engine.start_timer();
        assert!(backend.wait_parked(1));
        assert!(wait_until(|| engine.playing_keys() == vec!["B"]));

        let started = Instant::now();
        engine.advance_second();
        assert!(engine.pause_timer());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(engine.snapshot().timer.time_left, 1499);

        backend.release();
        engine.wait_for_loaders();
        assert!(engine.playing_keys().is_empty());
    }

    #[test]
    fn sound_deleted_during_load_never_starts() {
        let (backend, _, engine) = gated_engine();
        engine.set_tracks(vec![
            SoundTrack::single("A", "slow1", 1.0),
            SoundTrack::single("B", "sound1", 1.0),
        ]);
        engine.start_timer();
        assert!(backend.wait_parked(1));

        assert!(engine.delete_media(Collection::Sounds, "slow1").unwrap());
        backend.release();
        engine.wait_for_loaders();
        assert_eq!(engine.playing_keys(), vec!["B"]);
        assert!(engine.is_audio_playing());
    }

    #[test]
    fn reset_stops_audio_but_keeps_background() {
        let (_, engine) = engine();
        two_track_mix(&engine);
        engine.select_background(Some("bg1"));
        engine.toggle_background();
        engine.start_timer();
        engine.wait_for_loaders();
        engine.reset_timer();
        assert!(engine.playing_keys().is_empty());
        let snap = engine.snapshot();
        assert!(snap.background_visible);
        assert_eq!(snap.background.as_deref(), Some("bg1"));
    }

    #[test]
    fn audio_toggles_independently_of_timer() {
        let (_, engine) = engine();
        two_track_mix(&engine);
        assert!(engine.toggle_audio());
        engine.wait_for_loaders();
        assert_eq!(engine.playing_keys().len(), 3);
        assert!(!engine.snapshot().timer.is_running);
        assert!(!engine.toggle_audio());
        assert!(engine.playing_keys().is_empty());
    }

    #[test]
    fn unknown_sound_does_not_block_siblings() {
        let (_, engine) = engine();
        engine.set_tracks(vec![
            SoundTrack::single("A", "ghost", 1.0),
            SoundTrack::single("B", "sound2", 1.0),
        ]);
        engine.start_audio();
        engine.wait_for_loaders();
        assert_eq!(engine.playing_keys(), vec!["B"]);
    }

    #[test]
    fn live_track_volume_multiplies_sound_volume() {
        let (store, engine) = engine();
        store
            .update(Collection::Sounds, "sound1", MediaPatch { volume: Some(0.5), ..Default::default() })
            .unwrap();
        engine.set_tracks(vec![SoundTrack::single("A", "sound1", 1.0)]);
        engine.start_audio();
        engine.wait_for_loaders();
        assert!((engine.track_status("A").unwrap().volume - 0.5).abs() < 1e-6);
        assert!(engine.set_track_volume("A", 0.4));
        assert!((engine.track_status("A").unwrap().volume - 0.2).abs() < 1e-6);
        assert!(!engine.set_track_volume("missing", 0.4));
    }

    #[test]
    fn removing_a_track_silences_its_keys() {
        let (_, engine) = engine();
        two_track_mix(&engine);
        engine.start_audio();
        engine.wait_for_loaders();
        assert!(engine.remove_track("B"));
        assert_eq!(engine.playing_keys(), vec!["A"]);
    }

    #[test]
    fn changing_source_restarts_slot_while_playing() {
        let (_, engine) = engine();
        engine.set_tracks(vec![SoundTrack::single("A", "sound1", 1.0)]);
        engine.start_audio();
        engine.wait_for_loaders();
        engine.set_track_source("A", Some(TrackSource::Single { sound_id: "sound2".into() }));
        engine.wait_for_loaders();
        assert_eq!(engine.playing_keys(), vec!["A"]);
        assert_eq!(engine.tracks()[0].source, Some(TrackSource::Single { sound_id: "sound2".into() }));
    }

    #[test]
    fn delete_media_evicts_and_stops_referencing_keys() {
        let (_, engine) = engine();
        two_track_mix(&engine);
        engine.start_audio();
        engine.wait_for_loaders();
        engine.preview_sound("sound2");
        assert!(engine.delete_media(Collection::Sounds, "sound2").unwrap());
        assert_eq!(engine.playing_keys(), vec!["A", "B_sound3"]);
        assert!(engine.load_media(Collection::Sounds, "sound2").is_none());
    }

    #[test]
    fn update_media_evicts_cached_copy() {
        let (store, engine) = engine();
        let before = engine.load_media(Collection::Sounds, "sound1").unwrap();
        engine
            .update_media(Collection::Sounds, "sound1", MediaPatch { name: Some("Drizzle".into()), ..Default::default() })
            .unwrap();
        let after = engine.load_media(Collection::Sounds, "sound1").unwrap();
        assert_eq!(before.name, "Rain");
        assert_eq!(after.name, "Drizzle");
        assert_eq!(store.gets(), 2);
    }

    #[test]
    fn ticking_cue_plays_once_near_the_end() {
        let (_, engine) = engine();
        engine.set_work_minutes(1).unwrap();
        engine.start_timer();
        for _ in 0..49 {
            engine.advance_second();
        }
        assert!(engine.track_status(crate::mixer::TICKING_KEY).is_none());
        engine.advance_second();
        assert!(engine.track_status(crate::mixer::TICKING_KEY).unwrap().playing);
    }

    #[test]
    fn full_work_interval_flips_to_break_notice_and_shows_ui() {
        let (_, engine) = engine();
        engine.select_background(Some("bg1"));
        engine.toggle_background();
        assert!(engine.toggle_ui_hidden());
        engine.start_timer();
        for _ in 0..1500 {
            engine.advance_second();
        }
        let snap = engine.snapshot();
        assert_eq!(snap.timer.mode, Mode::Break);
        assert_eq!(snap.timer.time_left, 300);
        assert!(snap.timer.is_break_notice);
        assert_eq!(snap.timer.break_countdown, 20);
        assert!(!snap.ui_hidden);
        assert!(snap.background_visible);

        for _ in 0..20 {
            engine.advance_second();
        }
        assert_eq!(engine.phase(), Phase::Idle);
        assert_eq!(engine.snapshot().timer.time_left, 300);
    }

    #[test]
    fn subscribers_receive_tick_snapshots() {
        let (_, engine) = engine();
        let rx = engine.subscribe();
        let initial = rx.recv().unwrap();
        assert_eq!(initial.timer.time_left, 1500);
        engine.start_timer();
        engine.advance_second();
        let latest = rx.try_iter().last().unwrap();
        assert_eq!(latest.timer.time_left, 1499);
        assert!(latest.timer.is_running);
    }

    #[test]
    fn snapshot_is_mirrored_to_store() {
        let (store, engine) = engine();
        engine.start_timer();
        engine.advance_second();
        let mirrored = store.read_setting(paths::TIMER_STATE).unwrap().unwrap();
        assert_eq!(mirrored["time_left"], 1499);
        assert_eq!(mirrored["mode"], "work");
        assert_eq!(mirrored["is_running"], true);
    }

    #[test]
    fn ui_hidden_requires_visible_background() {
        let (_, engine) = engine();
        assert!(!engine.toggle_ui_hidden());
        engine.toggle_background();
        assert!(engine.toggle_ui_hidden());
        assert!(!engine.toggle_background());
        assert!(!engine.snapshot().ui_hidden);
    }

    #[test]
    fn stale_background_resolves_to_none() {
        let (_, engine) = engine();
        assert!(engine.select_background(Some("bg1")).is_some());
        engine.delete_media(Collection::Animations, "bg1").unwrap();
        assert!(engine.background().is_none());
        assert_eq!(engine.snapshot().background.as_deref(), Some("bg1"));
    }

    #[test]
    fn background_mode_toggle_persists() {
        let (store, engine) = engine();
        assert_eq!(engine.toggle_background_mode(), BackgroundMode::Fill);
        let again = Engine::with_stores(store.clone(), store, Arc::new(TestBackend::default()));
        assert_eq!(again.background_mode(), BackgroundMode::Fill);
    }

    #[test]
    fn session_round_trip_replaces_configuration() {
        let (_, engine) = engine();
        engine.set_work_minutes(45).unwrap();
        engine.set_break_minutes(10).unwrap();
        engine.select_background(Some("bg1"));
        engine.set_tracks(vec![SoundTrack::single("A", "sound1", 0.8)]);
        let saved = engine.save_session("Deep work").unwrap();

        engine.set_work_minutes(25).unwrap();
        engine.select_background(None);
        engine.set_tracks(vec![]);
        engine.start_audio();

        let loaded = engine.load_session(&saved.id).unwrap();
        assert_eq!(loaded.name, "Deep work");
        let snap = engine.snapshot();
        assert_eq!(snap.timer.work_minutes, 45);
        assert_eq!(snap.timer.time_left, 2700);
        assert_eq!(snap.background.as_deref(), Some("bg1"));
        assert_eq!(snap.tracks.len(), 1);
        assert!(!snap.audio_playing);
        assert!(matches!(engine.save_session(" "), Err(ChillError::InvalidInput(_))));
        assert!(engine.load_session("ghost").is_err());
    }

    #[test]
    fn preview_replaces_previous_preview() {
        let (_, engine) = engine();
        let status = engine.preview_sound("sound1").unwrap();
        assert_eq!(status.key, "preview:sound1");
        assert!(!status.looping);
        engine.preview_sound("sound2");
        assert_eq!(engine.playing_keys(), vec!["preview:sound2"]);
        engine.stop_preview();
        assert!(engine.playing_keys().is_empty());
        assert!(engine.preview_sound("ghost").is_none());
    }

    #[test]
    fn clear_unused_cache_keeps_referenced_payloads() {
        let (_, engine) = engine();
        engine.load_media(Collection::Sounds, "sound1");
        engine.load_media(Collection::Sounds, "sound2");
        engine.load_media(Collection::Animations, "bg1");
        engine.set_tracks(vec![SoundTrack::single("A", "sound1", 1.0)]);
        assert_eq!(engine.clear_unused_cache(), 2);
        let stats = engine.cache_stats();
        assert_eq!(stats.sounds, 1);
        assert_eq!(stats.animations, 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (_, engine) = engine();
        engine.start();
        engine.shutdown();
        engine.shutdown();
        assert!(engine.playing_keys().is_empty());
    }
}
