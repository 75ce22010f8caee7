//! Import effect: files and directories become embedded media records.
//!
//! Audio files land in `sounds`, images/gifs/videos in `animations`. The
//! whole file is embedded as a data URI, so the record is self-contained.

use std::path::Path;

use lofty::prelude::*;
use lofty::probe::Probe;

use crate::error::{ChillError, ChillResult};
use crate::models::{AnimationKind, Collection, MediaRecord, NewMedia};
use crate::store::MediaStore;

use super::http::{drive_direct_url, extension_from_url};
use super::source::{mime_for_extension, to_data_uri};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "aac", "ogg", "oga", "wav"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

const MAX_SCAN_DEPTH: usize = 32;

/// Where a file of extension `ext` belongs, and its kind for animations.
pub fn classify_extension(ext: &str) -> Option<(Collection, Option<AnimationKind>)> {
    let ext = ext.to_lowercase();
    let ext = ext.as_str();
    if AUDIO_EXTENSIONS.contains(&ext) {
        Some((Collection::Sounds, None))
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some((Collection::Animations, Some(AnimationKind::Video)))
    } else if ext == "gif" {
        Some((Collection::Animations, Some(AnimationKind::Gif)))
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some((Collection::Animations, Some(AnimationKind::Image)))
    } else {
        None
    }
}

/// Import one file. Unknown extensions are `UnsupportedSource`.
pub fn import_file(store: &dyn MediaStore, path: &Path) -> ChillResult<MediaRecord> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let (collection, kind) = classify_extension(&ext)
        .ok_or_else(|| ChillError::UnsupportedSource(path.display().to_string()))?;
    let mime = mime_for_extension(&ext).unwrap_or("application/octet-stream");

    let bytes = std::fs::read(path)?;
    let name = match collection {
        Collection::Sounds => audio_title(path),
        Collection::Animations => file_stem(path),
    };

    let media = NewMedia {
        name,
        kind,
        url: to_data_uri(mime, &bytes),
        volume: None,
    };
    let record = store.add(collection, media)?;
    log::info!("chill: imported {} as {}/{}", path.display(), collection, record.id);
    Ok(record)
}

/// Import every recognised file under `dir`. Per-file failures are logged
/// and skipped; symlinked directories are not followed.
pub fn import_dir(store: &dyn MediaStore, dir: &Path) -> ChillResult<Vec<MediaRecord>> {
    if !dir.is_dir() {
        return Err(ChillError::InvalidInput(format!("not a directory: {}", dir.display())));
    }
    let mut imported = Vec::new();
    scan(store, dir, 0, &mut imported);
    Ok(imported)
}

/// File or directory, whichever `path` is.
pub fn import_path(store: &dyn MediaStore, path: &Path) -> ChillResult<Vec<MediaRecord>> {
    if path.is_dir() {
        import_dir(store, path)
    } else {
        import_file(store, path).map(|r| vec![r])
    }
}

/// Store an external reference without fetching it. Drive share links are
/// rewritten to direct downloads; an animation without a kind is guessed
/// from the URL extension.
pub fn add_url(
    store: &dyn MediaStore,
    collection: Collection,
    name: &str,
    url: &str,
    kind: Option<AnimationKind>,
) -> ChillResult<MediaRecord> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ChillError::InvalidInput("url must not be empty".into()));
    }
    let url = drive_direct_url(url).unwrap_or_else(|| url.to_string());
    let kind = match collection {
        Collection::Sounds => None,
        Collection::Animations => kind.or_else(|| {
            extension_from_url(&url)
                .and_then(|ext| classify_extension(&ext))
                .and_then(|(_, k)| k)
                .or(Some(AnimationKind::Image))
        }),
    };
    store.add(
        collection,
        NewMedia {
            name: name.to_string(),
            kind,
            url,
            volume: None,
        },
    )
}

fn scan(store: &dyn MediaStore, dir: &Path, depth: usize, out: &mut Vec<MediaRecord>) {
    if depth > MAX_SCAN_DEPTH {
        log::warn!("chill: scan depth limit reached at {}", dir.display());
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("chill: cannot read {}: {}", dir.display(), e);
            return;
        }
    };

    let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        let is_symlink = std::fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        if path.is_file() {
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(classify_extension)
                .is_some();
            if !known {
                continue;
            }
            match import_file(store, &path) {
                Ok(record) => out.push(record),
                Err(e) => log::warn!("chill: skipping {}: {}", path.display(), e),
            }
        } else if path.is_dir() && !is_symlink {
            scan(store, &path, depth + 1, out);
        }
    }
}

fn audio_title(path: &Path) -> String {
    Probe::open(path)
        .and_then(|p| p.read())
        .ok()
        .and_then(|tagged| {
            let tag = tagged.primary_tag().or_else(|| tagged.first_tag())?;
            tag.title().map(|s| s.trim().to_string())
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| file_stem(path))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled")
        .to_string()
}
