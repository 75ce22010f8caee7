//! Persistent store contracts and their 9S scroll implementation.
//!
//! Two stores: [`MediaStore`] holds full media records per collection, and
//! [`ListStore`] holds whole-list blobs (presets, saved sessions) and small
//! settings values. Both are collaborators of the core; the cache layer only
//! consumes `list_all` and `get`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use nine_s_shell::Shell;
use serde_json::Value;

use crate::error::{ChillError, ChillResult};
use crate::mixer::clamp_volume;
use crate::models::{Collection, MediaPatch, MediaRecord, NewMedia};
use crate::paths;

/// Per-id record store for the `animations` and `sounds` collections.
pub trait MediaStore: Send + Sync {
    /// Every live record of the collection, payloads included.
    fn list_all(&self, collection: Collection) -> ChillResult<Vec<MediaRecord>>;
    /// One record, or `None` when the id is unknown or deleted.
    fn get(&self, collection: Collection, id: &str) -> ChillResult<Option<MediaRecord>>;
    /// Store a new record; the store assigns `id` and `created_ms`.
    fn add(&self, collection: Collection, media: NewMedia) -> ChillResult<MediaRecord>;
    /// Apply a partial update. Fails with `RecordNotFound`.
    fn update(&self, collection: Collection, id: &str, patch: MediaPatch) -> ChillResult<MediaRecord>;
    /// Returns false when there was nothing to delete.
    fn delete(&self, collection: Collection, id: &str) -> ChillResult<bool>;
}

/// Whole-collection blobs and settings values. No per-id indexing.
pub trait ListStore: Send + Sync {
    fn read_list(&self, path: &str) -> ChillResult<Vec<Value>>;
    fn write_list(&self, path: &str, items: Vec<Value>) -> ChillResult<()>;
    fn read_setting(&self, path: &str) -> ChillResult<Option<Value>>;
    fn write_setting(&self, path: &str, value: Value) -> ChillResult<()>;
}

// ---------------------------------------------------------------------------
// Scroll-backed store
// ---------------------------------------------------------------------------

/// Both stores over one 9S shell.
///
/// Media deletes are soft (`metadata.deleted = true`), so a deleted id keeps
/// its scroll and is never handed out again.
pub struct ShellStore {
    shell: Arc<Shell>,
}

impl ShellStore {
    pub fn new(shell: Shell) -> Self {
        Self { shell: Arc::new(shell) }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    fn live_record(&self, path: &str) -> ChillResult<Option<MediaRecord>> {
        match self.shell.get(path)? {
            Some(scroll) if scroll.metadata.deleted != Some(true) => {
                Ok(Some(serde_json::from_value(scroll.data)?))
            }
            _ => Ok(None),
        }
    }
}

impl MediaStore for ShellStore {
    fn list_all(&self, collection: Collection) -> ChillResult<Vec<MediaRecord>> {
        let all_paths = self.shell.all(paths::collection_prefix(collection))?;
        let mut records = Vec::with_capacity(all_paths.len());
        for path in all_paths {
            match self.live_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => log::warn!("chill: skipping unreadable record {}: {}", path, e),
            }
        }
        records.sort_by(|a, b| a.created_ms.cmp(&b.created_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn get(&self, collection: Collection, id: &str) -> ChillResult<Option<MediaRecord>> {
        self.live_record(&paths::media_path(collection, id))
    }

    fn add(&self, collection: Collection, media: NewMedia) -> ChillResult<MediaRecord> {
        let name = media.name.trim();
        if name.is_empty() {
            return Err(ChillError::InvalidInput("media name must not be empty".into()));
        }
        if media.url.is_empty() {
            return Err(ChillError::InvalidInput("media url must not be empty".into()));
        }

        let id = loop {
            let candidate = next_id();
            if self.shell.get(&paths::media_path(collection, &candidate))?.is_none() {
                break candidate;
            }
        };

        let record = MediaRecord {
            id,
            name: name.to_string(),
            kind: match collection {
                Collection::Animations => media.kind,
                Collection::Sounds => None,
            },
            url: media.url,
            volume: match collection {
                Collection::Sounds => Some(clamp_volume(media.volume.unwrap_or(1.0))),
                Collection::Animations => None,
            },
            created_ms: now_ms(),
        };
        self.shell.put(
            &paths::media_path(collection, &record.id),
            serde_json::to_value(&record)?,
        )?;
        Ok(record)
    }

    fn update(&self, collection: Collection, id: &str, patch: MediaPatch) -> ChillResult<MediaRecord> {
        let path = paths::media_path(collection, id);
        let mut record = self
            .live_record(&path)?
            .ok_or_else(|| ChillError::RecordNotFound { collection, id: id.to_string() })?;
        if matches!(&patch.name, Some(n) if n.trim().is_empty()) {
            return Err(ChillError::InvalidInput("media name must not be empty".into()));
        }
        patch.apply(&mut record);
        self.shell.put(&path, serde_json::to_value(&record)?)?;
        Ok(record)
    }

    fn delete(&self, collection: Collection, id: &str) -> ChillResult<bool> {
        let path = paths::media_path(collection, id);
        match self.shell.get(&path)? {
            Some(mut scroll) if scroll.metadata.deleted != Some(true) => {
                scroll.metadata.deleted = Some(true);
                self.shell.put_scroll(scroll)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl ListStore for ShellStore {
    fn read_list(&self, path: &str) -> ChillResult<Vec<Value>> {
        Ok(self
            .shell
            .get(path)?
            .and_then(|s| s.data["items"].as_array().cloned())
            .unwrap_or_default())
    }

    fn write_list(&self, path: &str, items: Vec<Value>) -> ChillResult<()> {
        self.shell.put(path, serde_json::json!({ "items": items }))?;
        Ok(())
    }

    fn read_setting(&self, path: &str) -> ChillResult<Option<Value>> {
        Ok(self.shell.get(path)?.map(|s| s.data))
    }

    fn write_setting(&self, path: &str, value: Value) -> ChillResult<()> {
        self.shell.put(path, value)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond-timestamp ids, strictly increasing within the process.
pub(crate) fn next_id() -> String {
    let now = now_ms();
    let mut last = LAST_ID.load(Ordering::SeqCst);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ID.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => last = actual,
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::next_id;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a: i64 = next_id().parse().unwrap();
        let b: i64 = next_id().parse().unwrap();
        let c: i64 = next_id().parse().unwrap();
        assert!(a < b && b < c);
    }
}
