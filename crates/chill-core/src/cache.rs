//! Metadata listing and lazy full-record cache.
//!
//! Listing never materialises payloads for the caller; full records are
//! fetched one id at a time and held until explicitly evicted. There is no
//! expiry: a cached record is whatever the store held at first load.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::effects::source::payload_size;
use crate::models::{Collection, MediaMetadata, MediaRecord};
use crate::store::MediaStore;

type CacheKey = (Collection, String);

/// Snapshot of what the cache currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub animations: usize,
    pub sounds: usize,
    /// Estimated decoded payload bytes across every entry.
    pub payload_bytes: usize,
}

pub struct MediaCache {
    store: Arc<dyn MediaStore>,
    entries: Mutex<HashMap<CacheKey, Arc<MediaRecord>>>,
}

impl MediaCache {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MediaStore> {
        &self.store
    }

    /// Payload-free listing. Store failures degrade to an empty list.
    pub fn list_metadata(&self, collection: Collection) -> Vec<MediaMetadata> {
        match self.store.list_all(collection) {
            Ok(records) => records.iter().map(|r| r.metadata(collection)).collect(),
            Err(e) => {
                log::warn!("chill: listing {} failed, showing none: {}", collection, e);
                Vec::new()
            }
        }
    }

    /// One full record straight from the store. Missing ids and load
    /// failures both come back as `None`.
    pub fn load_full(&self, collection: Collection, id: &str) -> Option<MediaRecord> {
        match self.store.get(collection, id) {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                log::debug!("chill: {}/{} not found", collection, id);
                None
            }
            Err(e) => {
                log::warn!("chill: loading {}/{} failed: {}", collection, id, e);
                None
            }
        }
    }

    /// Cached variant of [`load_full`](Self::load_full). After the first
    /// successful load every call for the same id returns the same `Arc`
    /// without touching the store. Misses are not cached.
    pub fn load_full_cached(&self, collection: Collection, id: &str) -> Option<Arc<MediaRecord>> {
        let key = (collection, id.to_string());
        if let Some(hit) = self.entries.lock().get(&key) {
            log::debug!("chill: cache hit {}/{}", collection, id);
            return Some(Arc::clone(hit));
        }

        // Store I/O runs unlocked; a concurrent loader that finished first wins.
        let record = Arc::new(self.load_full(collection, id)?);
        let mut entries = self.entries.lock();
        Some(Arc::clone(entries.entry(key).or_insert(record)))
    }

    /// Load several ids through the cache, skipping the ones that fail.
    pub fn preload(&self, collection: Collection, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| self.load_full_cached(collection, id).is_some())
            .count()
    }

    /// Drop the given ids from memory. The store is untouched.
    pub fn evict<S: AsRef<str>>(&self, collection: Collection, ids: &[S]) {
        let mut entries = self.entries.lock();
        for id in ids {
            entries.remove(&(collection, id.as_ref().to_string()));
        }
    }

    /// Evict every entry of `collection` whose id is not in `used`.
    pub fn retain_only<S: AsRef<str>>(&self, collection: Collection, used: &[S]) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(c, id), _| *c != collection || used.iter().any(|u| u.as_ref() == id));
        before - entries.len()
    }

    pub fn clear_all(&self) {
        self.entries.lock().clear();
    }

    pub fn contains(&self, collection: Collection, id: &str) -> bool {
        self.entries.lock().contains_key(&(collection, id.to_string()))
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let mut stats = CacheStats::default();
        for ((collection, _), record) in entries.iter() {
            match collection {
                Collection::Animations => stats.animations += 1,
                Collection::Sounds => stats.sounds += 1,
            }
            stats.payload_bytes += payload_size(&record.url);
        }
        stats
    }
}
