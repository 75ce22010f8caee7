//! Scroll path conventions over 9S.
//!
//! Pure functions mapping focus-app concepts to scroll paths.

use crate::models::Collection;

// ---------------------------------------------------------------------------
// Media collections
// ---------------------------------------------------------------------------

pub fn collection_prefix(collection: Collection) -> &'static str {
    match collection {
        Collection::Animations => ANIMATIONS_PREFIX,
        Collection::Sounds => SOUNDS_PREFIX,
    }
}

pub fn media_path(collection: Collection, id: &str) -> String {
    format!("{}/{}", collection_prefix(collection), id)
}

pub const ANIMATIONS_PREFIX: &str = "/chill/animations";
pub const SOUNDS_PREFIX: &str = "/chill/sounds";

// ---------------------------------------------------------------------------
// Whole-list blobs
// ---------------------------------------------------------------------------

pub const PRESETS: &str = "/chill/lists/presets";
pub const SESSIONS: &str = "/chill/lists/sessions";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const SETTINGS_BACKGROUND: &str = "/chill/settings/background";
pub const SETTINGS_ENGINE: &str = "/chill/settings/engine";

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

pub const TIMER_STATE: &str = "/chill/timer/state";

// ---------------------------------------------------------------------------
// Watch patterns
// ---------------------------------------------------------------------------

pub const WATCH_ANIMATIONS: &str = "/chill/animations/**";
pub const WATCH_SOUNDS: &str = "/chill/sounds/**";
pub const WATCH_TIMER: &str = "/chill/timer/**";
pub const WATCH_ALL: &str = "/chill/**";
