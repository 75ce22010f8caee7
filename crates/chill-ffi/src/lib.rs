//! C FFI surface for chill.
//!
//! Pattern: opaque EngineHandle + C strings + JSON serialization.
//! Follows nine-s-ffi conventions.
//!
//! Web, Flutter and native shells drive the timer and the mix through these
//! calls and render from `chill_snapshot` (or by watching
//! `/chill/timer/state`).

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;

use chill_core::{AnimationKind, Collection, Engine, Mode, NewMedia, SoundTrack};
use nine_s_shell::Shell;

// ---------------------------------------------------------------------------
// Error handling (thread-local last error)
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn set_error(msg: String) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(msg));
}

fn clear_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
}

/// Returns the last error message (caller frees with `chill_string_free`).
#[no_mangle]
pub extern "C" fn chill_last_error() -> *mut c_char {
    LAST_ERROR.with(|cell| {
        cell.borrow_mut()
            .take()
            .and_then(|s| CString::new(s).ok())
            .map(|s| s.into_raw())
            .unwrap_or(ptr::null_mut())
    })
}

/// Frees a string returned from chill FFI.
///
/// # Safety
/// Must be a pointer returned from this FFI and not already freed.
#[no_mangle]
pub unsafe extern "C" fn chill_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

// ---------------------------------------------------------------------------
// Opaque handle
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct EngineHandle {
    _private: [u8; 0],
}

struct EngineHandleInner {
    engine: Engine,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Sets the 9S storage root directory.
///
/// # Safety
/// `path` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_set_root(path: *const c_char) -> i32 {
    clear_error();
    match read_cstr(path) {
        Ok(p) => {
            std::env::set_var("NINE_S_ROOT", p);
            1
        }
        Err(e) => err_zero(e),
    }
}

/// Opens the chill engine and starts its heartbeat. Returns an opaque handle.
///
/// # Safety
/// `app_id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_open(app_id: *const c_char) -> *mut EngineHandle {
    clear_error();
    let app = match read_cstr(app_id) {
        Ok(a) => a,
        Err(e) => {
            set_error(e);
            return ptr::null_mut();
        }
    };

    match Shell::open(&app, &[]) {
        Ok(shell) => {
            let engine = Engine::new(shell);
            engine.start();
            Box::into_raw(Box::new(EngineHandleInner { engine })) as *mut EngineHandle
        }
        Err(e) => {
            set_error(e.to_string());
            ptr::null_mut()
        }
    }
}

/// Stops audio, joins the heartbeat, and releases the engine.
#[no_mangle]
pub extern "C" fn chill_close(handle: *mut EngineHandle) {
    if !handle.is_null() {
        unsafe {
            let inner = Box::from_raw(handle as *mut EngineHandleInner);
            inner.engine.shutdown();
        }
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Start the countdown. Returns 1 if it started, 0 if already running or on error.
#[no_mangle]
pub extern "C" fn chill_timer_start(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.start_timer() as i32,
        Err(e) => err_zero(e),
    }
}

/// Pause the countdown and the mix. Returns 1 if it was running.
#[no_mangle]
pub extern "C" fn chill_timer_pause(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.pause_timer() as i32,
        Err(e) => err_zero(e),
    }
}

/// Start or pause. Returns 1 if the timer is running afterwards.
#[no_mangle]
pub extern "C" fn chill_timer_toggle(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.toggle_timer() as i32,
        Err(e) => err_zero(e),
    }
}

/// Stop and refill the current mode. Returns 1 on success.
#[no_mangle]
pub extern "C" fn chill_timer_reset(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => {
            engine.reset_timer();
            1
        }
        Err(e) => err_zero(e),
    }
}

/// Hide the break notice early. Returns 1 if a notice was showing.
#[no_mangle]
pub extern "C" fn chill_dismiss_notice(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.dismiss_notice() as i32,
        Err(e) => err_zero(e),
    }
}

/// Advance simulated time by `seconds` (embedders without their own clock
/// keep the heartbeat and never need this). Returns 1 on success.
#[no_mangle]
pub extern "C" fn chill_timer_advance(handle: *mut EngineHandle, seconds: u32) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => {
            for _ in 0..seconds {
                engine.advance_second();
            }
            1
        }
        Err(e) => err_zero(e),
    }
}

/// Set work and break lengths in minutes. Zero leaves that length unchanged.
/// Returns 1 on success, 0 on error.
#[no_mangle]
pub extern "C" fn chill_set_durations(
    handle: *mut EngineHandle,
    work_minutes: u32,
    break_minutes: u32,
) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    if work_minutes > 0 {
        if let Err(e) = engine.set_work_minutes(work_minutes) {
            return err_zero(e.to_string());
        }
    }
    if break_minutes > 0 {
        if let Err(e) = engine.set_break_minutes(break_minutes) {
            return err_zero(e.to_string());
        }
    }
    1
}

/// Switch to `"work"` or `"break"`, stopping and refilling the timer.
///
/// # Safety
/// `mode` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_set_mode(handle: *mut EngineHandle, mode: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let mode = match read_cstr(mode) {
        Ok(s) => s,
        Err(e) => return err_zero(e),
    };
    let mode: Mode = match serde_json::from_value(serde_json::Value::String(mode)) {
        Ok(m) => m,
        Err(e) => return err_zero(e.to_string()),
    };
    engine.set_mode(mode);
    1
}

/// Current engine snapshot as JSON (caller frees).
#[no_mangle]
pub extern "C" fn chill_snapshot(handle: *mut EngineHandle) -> *mut c_char {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => json_to_cstr(&engine.snapshot()),
        Err(e) => err_null(e),
    }
}

// ---------------------------------------------------------------------------
// Mix
// ---------------------------------------------------------------------------

/// Replace the track list. `json` is an array of sound tracks.
/// Returns 1 on success, 0 on error.
///
/// # Safety
/// `json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_set_tracks(handle: *mut EngineHandle, json: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let json_str = match read_cstr(json) {
        Ok(s) => s,
        Err(e) => return err_zero(e),
    };
    let tracks: Vec<SoundTrack> = match serde_json::from_str(&json_str) {
        Ok(t) => t,
        Err(e) => return err_zero(e.to_string()),
    };
    engine.set_tracks(tracks);
    1
}

/// Set one slot's volume. Returns 1 if the slot exists.
///
/// # Safety
/// `track_id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_set_track_volume(
    handle: *mut EngineHandle,
    track_id: *const c_char,
    volume: f32,
) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    match read_cstr(track_id) {
        Ok(id) => engine.set_track_volume(&id, volume) as i32,
        Err(e) => err_zero(e),
    }
}

/// Start or stop the mix independently of the timer.
/// Returns 1 if audio is playing afterwards.
#[no_mangle]
pub extern "C" fn chill_audio_toggle(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.toggle_audio() as i32,
        Err(e) => err_zero(e),
    }
}

/// Play one sound once for auditioning.
///
/// # Safety
/// `sound_id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_preview(handle: *mut EngineHandle, sound_id: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    match read_cstr(sound_id) {
        Ok(id) => engine.preview_sound(&id).is_some() as i32,
        Err(e) => err_zero(e),
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// Payload-free listing of `"animations"` or `"sounds"`. JSON array (caller frees).
///
/// # Safety
/// `collection` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_media_list(
    handle: *mut EngineHandle,
    collection: *const c_char,
) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let collection = match read_collection(collection) {
        Ok(c) => c,
        Err(e) => return err_null(e),
    };
    json_to_cstr(&engine.list_media(collection))
}

/// Full record including its payload URL. JSON (caller frees), NULL if absent.
///
/// # Safety
/// `collection` and `id` must be valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn chill_media_get(
    handle: *mut EngineHandle,
    collection: *const c_char,
    id: *const c_char,
) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let collection = match read_collection(collection) {
        Ok(c) => c,
        Err(e) => return err_null(e),
    };
    let id = match read_cstr(id) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    match engine.load_media(collection, &id) {
        Some(record) => json_to_cstr(&*record),
        None => ptr::null_mut(),
    }
}

/// Add a record. `json` is `{"name", "url", "type"?, "volume"?}`.
/// Returns the stored record JSON (caller frees), or NULL on error.
///
/// # Safety
/// `collection` and `json` must be valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn chill_media_add(
    handle: *mut EngineHandle,
    collection: *const c_char,
    json: *const c_char,
) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let collection = match read_collection(collection) {
        Ok(c) => c,
        Err(e) => return err_null(e),
    };
    let json_str = match read_cstr(json) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    let media: NewMedia = match serde_json::from_str(&json_str) {
        Ok(m) => m,
        Err(e) => return err_null(e.to_string()),
    };
    match engine.add_media(collection, media) {
        Ok(record) => json_to_cstr(&record),
        Err(e) => err_null(e.to_string()),
    }
}

/// Store an external URL (Drive share links are normalised). `kind` may be
/// NULL to guess from the URL. Returns the record JSON (caller frees).
///
/// # Safety
/// `collection`, `name` and `url` must be valid null-terminated C strings;
/// `kind` must be NULL or one.
#[no_mangle]
pub unsafe extern "C" fn chill_media_add_url(
    handle: *mut EngineHandle,
    collection: *const c_char,
    name: *const c_char,
    url: *const c_char,
    kind: *const c_char,
) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let collection = match read_collection(collection) {
        Ok(c) => c,
        Err(e) => return err_null(e),
    };
    let name = match read_cstr(name) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    let url = match read_cstr(url) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    let kind = if kind.is_null() {
        None
    } else {
        match read_cstr(kind).map(|k| AnimationKind::parse(&k)) {
            Ok(Some(k)) => Some(k),
            Ok(None) => return err_null("unknown animation type".into()),
            Err(e) => return err_null(e),
        }
    };
    match engine.add_url(collection, &name, &url, kind) {
        Ok(record) => json_to_cstr(&record),
        Err(e) => err_null(e.to_string()),
    }
}

/// Soft-delete a record and silence anything playing it.
/// Returns 1 if a record was deleted, 0 if absent or on error.
///
/// # Safety
/// `collection` and `id` must be valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn chill_media_delete(
    handle: *mut EngineHandle,
    collection: *const c_char,
    id: *const c_char,
) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let collection = match read_collection(collection) {
        Ok(c) => c,
        Err(e) => return err_zero(e),
    };
    let id = match read_cstr(id) {
        Ok(s) => s,
        Err(e) => return err_zero(e),
    };
    match engine.delete_media(collection, &id) {
        Ok(deleted) => deleted as i32,
        Err(e) => err_zero(e.to_string()),
    }
}

/// Import a file or directory. Returns the number of records created, -1 on error.
///
/// # Safety
/// `path` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_import(handle: *mut EngineHandle, path: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => {
            set_error(e);
            return -1;
        }
    };
    let path = match read_cstr(path) {
        Ok(s) => s,
        Err(e) => {
            set_error(e);
            return -1;
        }
    };
    match engine.import(Path::new(&path)) {
        Ok(records) => records.len() as i32,
        Err(e) => {
            set_error(e.to_string());
            -1
        }
    }
}

/// Cache occupancy as JSON (caller frees).
#[no_mangle]
pub extern "C" fn chill_cache_stats(handle: *mut EngineHandle) -> *mut c_char {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => json_to_cstr(&engine.cache_stats()),
        Err(e) => err_null(e),
    }
}

/// Evict cached payloads the current mix and background do not use.
/// Returns the number evicted, -1 on error.
#[no_mangle]
pub extern "C" fn chill_cache_clear_unused(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.clear_unused_cache() as i32,
        Err(e) => {
            set_error(e);
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// All presets as a JSON array (caller frees).
#[no_mangle]
pub extern "C" fn chill_presets(handle: *mut EngineHandle) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    match engine.presets() {
        Ok(presets) => json_to_cstr(&presets),
        Err(e) => err_null(e.to_string()),
    }
}

/// Create a preset. `ids_json` is a JSON array of sound ids.
/// Returns the preset JSON (caller frees).
///
/// # Safety
/// `name` and `ids_json` must be valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn chill_preset_add(
    handle: *mut EngineHandle,
    name: *const c_char,
    ids_json: *const c_char,
) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let name = match read_cstr(name) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    let ids_str = match read_cstr(ids_json) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    let ids: Vec<String> = match serde_json::from_str(&ids_str) {
        Ok(v) => v,
        Err(e) => return err_null(e.to_string()),
    };
    match engine.add_preset(&name, ids) {
        Ok(preset) => json_to_cstr(&preset),
        Err(e) => err_null(e.to_string()),
    }
}

/// Delete a preset and stop its slots. Returns 1 if it existed.
///
/// # Safety
/// `id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_preset_delete(handle: *mut EngineHandle, id: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let id = match read_cstr(id) {
        Ok(s) => s,
        Err(e) => return err_zero(e),
    };
    match engine.delete_preset(&id) {
        Ok(deleted) => deleted as i32,
        Err(e) => err_zero(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// All saved sessions as a JSON array (caller frees).
#[no_mangle]
pub extern "C" fn chill_sessions(handle: *mut EngineHandle) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    match engine.sessions() {
        Ok(sessions) => json_to_cstr(&sessions),
        Err(e) => err_null(e.to_string()),
    }
}

/// Save the current durations, mix and background. Returns the session JSON.
///
/// # Safety
/// `name` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_session_save(
    handle: *mut EngineHandle,
    name: *const c_char,
) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let name = match read_cstr(name) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    match engine.save_session(&name) {
        Ok(session) => json_to_cstr(&session),
        Err(e) => err_null(e.to_string()),
    }
}

/// Restore a saved session. Returns 1 on success, 0 on error.
///
/// # Safety
/// `id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_session_load(handle: *mut EngineHandle, id: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let id = match read_cstr(id) {
        Ok(s) => s,
        Err(e) => return err_zero(e),
    };
    match engine.load_session(&id) {
        Ok(_) => 1,
        Err(e) => err_zero(e.to_string()),
    }
}

/// Delete a saved session. Returns 1 if it existed.
///
/// # Safety
/// `id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_session_delete(handle: *mut EngineHandle, id: *const c_char) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let id = match read_cstr(id) {
        Ok(s) => s,
        Err(e) => return err_zero(e),
    };
    match engine.delete_session(&id) {
        Ok(deleted) => deleted as i32,
        Err(e) => err_zero(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Background
// ---------------------------------------------------------------------------

/// Select a background animation; NULL clears the selection.
/// Returns 1 if the selection resolved to a record.
///
/// # Safety
/// `id` must be NULL or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_background_select(
    handle: *mut EngineHandle,
    id: *const c_char,
) -> i32 {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_zero(e),
    };
    let id = if id.is_null() {
        None
    } else {
        match read_cstr(id) {
            Ok(s) => Some(s),
            Err(e) => return err_zero(e),
        }
    };
    engine.select_background(id.as_deref()).is_some() as i32
}

/// Show or hide the background. Returns 1 if visible afterwards.
#[no_mangle]
pub extern "C" fn chill_background_toggle(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.toggle_background() as i32,
        Err(e) => err_zero(e),
    }
}

/// Hide or show the UI over a visible background. Returns 1 if hidden afterwards.
#[no_mangle]
pub extern "C" fn chill_ui_hidden_toggle(handle: *mut EngineHandle) -> i32 {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => engine.toggle_ui_hidden() as i32,
        Err(e) => err_zero(e),
    }
}

/// Flip fit/fill and persist it. Returns the new mode string (caller frees).
#[no_mangle]
pub extern "C" fn chill_background_mode_toggle(handle: *mut EngineHandle) -> *mut c_char {
    clear_error();
    match engine_ref(handle) {
        Ok(engine) => json_to_cstr(&engine.toggle_background_mode()),
        Err(e) => err_null(e),
    }
}

// ---------------------------------------------------------------------------
// Raw scroll access
// ---------------------------------------------------------------------------

/// Read a scroll at any path. Returns JSON (caller frees), or NULL if not found.
///
/// # Safety
/// `path` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn chill_read(handle: *mut EngineHandle, path: *const c_char) -> *mut c_char {
    clear_error();
    let engine = match engine_ref(handle) {
        Ok(e) => e,
        Err(e) => return err_null(e),
    };
    let path_str = match read_cstr(path) {
        Ok(s) => s,
        Err(e) => return err_null(e),
    };
    let shell = match engine.shell() {
        Some(shell) => shell,
        None => return err_null("engine has no shell".into()),
    };
    match shell.get(&path_str) {
        Ok(Some(scroll)) => json_to_cstr(&scroll),
        Ok(None) => ptr::null_mut(),
        Err(e) => err_null(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Returns the FFI API version.
#[no_mangle]
pub extern "C" fn chill_version() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_ref<'a>(handle: *mut EngineHandle) -> Result<&'a Engine, String> {
    if handle.is_null() {
        return Err("null engine handle".into());
    }
    let inner = unsafe { &*(handle as *mut EngineHandleInner) };
    Ok(&inner.engine)
}

fn read_cstr(ptr: *const c_char) -> Result<String, String> {
    if ptr.is_null() {
        return Err("null string pointer".into());
    }
    unsafe {
        CStr::from_ptr(ptr)
            .to_str()
            .map(String::from)
            .map_err(|_| "invalid utf-8".into())
    }
}

fn read_collection(ptr: *const c_char) -> Result<Collection, String> {
    let name = read_cstr(ptr)?;
    Collection::parse(&name).ok_or_else(|| format!("unknown collection: {}", name))
}

fn json_to_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_cstr(json),
        Err(e) => err_null(e.to_string()),
    }
}

fn to_cstr(s: String) -> *mut c_char {
    CString::new(s)
        .map(|c| c.into_raw())
        .unwrap_or(ptr::null_mut())
}

fn err_null(msg: String) -> *mut c_char {
    set_error(msg);
    ptr::null_mut()
}

fn err_zero(msg: String) -> i32 {
    set_error(msg);
    0
}

// ---------------------------------------------------------------------------
// FFI Integration Tests
// ---------------------------------------------------------------------------
