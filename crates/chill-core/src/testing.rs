//! Test doubles shared by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::effects::{AudioBackend, Voice};
use crate::error::{ChillError, ChillResult};
use crate::models::{Collection, MediaPatch, MediaRecord, NewMedia};
use crate::store::{next_id, ListStore, MediaStore};

/// Backend whose voices refuse to play when the source contains "blocked"
/// and fail to open when it contains "corrupt". Opening a source that
/// contains "slow" parks the caller until [`TestBackend::release`].
#[derive(Default)]
pub(crate) struct TestBackend {
    opened: AtomicUsize,
    parked: AtomicUsize,
    released: Mutex<bool>,
    gate: Condvar,
}

/// Upper bound on how long a test waits on the gate.
const GATE_TIMEOUT: Duration = Duration::from_secs(10);

impl TestBackend {
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Let every parked and future slow open finish.
    pub(crate) fn release(&self) {
        *self.released.lock() = true;
        self.gate.notify_all();
    }

    /// Block until `count` opens are parked on the gate.
    pub(crate) fn wait_parked(&self, count: usize) -> bool {
        let deadline = Instant::now() + GATE_TIMEOUT;
        while self.parked.load(Ordering::SeqCst) < count {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }

    fn park(&self) {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let mut released = self.released.lock();
        while !*released {
            if self.gate.wait_for(&mut released, GATE_TIMEOUT).timed_out() {
                break;
            }
        }
    }
}

impl AudioBackend for TestBackend {
    fn open(&self, source_url: &str) -> ChillResult<Box<dyn Voice>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if source_url.contains("slow") {
            self.park();
        }
        if source_url.contains("corrupt") {
            return Err(ChillError::LoadFailure("corrupt source".into()));
        }
        Ok(Box::new(TestVoice {
            blocked: source_url.contains("blocked"),
            playing: false,
        }))
    }
}

struct TestVoice {
    blocked: bool,
    playing: bool,
}

impl Voice for TestVoice {
    fn set_looping(&mut self, _: bool) {}
    fn set_volume(&mut self, _: f32) {}
    fn rewind(&mut self) {}
    fn play(&mut self) -> ChillResult<()> {
        if self.blocked {
            return Err(ChillError::PlaybackBlocked {
                key: String::new(),
                reason: "no user gesture".into(),
            });
        }
        self.playing = true;
        Ok(())
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn is_playing(&self) -> bool {
        self.playing
    }
}

/// In-memory media store that counts `get` calls and can be switched offline.
#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<BTreeMap<(Collection, String), MediaRecord>>,
    lists: Mutex<BTreeMap<String, Value>>,
    gets: AtomicUsize,
    offline: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn insert(&self, collection: Collection, id: &str, name: &str, url: &str) {
        self.records.lock().insert(
            (collection, id.to_string()),
            MediaRecord {
                id: id.to_string(),
                name: name.to_string(),
                kind: None,
                url: url.to_string(),
                volume: Some(1.0),
                created_ms: 0,
            },
        );
    }

    fn check(&self) -> ChillResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ChillError::StoreUnavailable("quota exceeded".into()))
        } else {
            Ok(())
        }
    }
}

impl MediaStore for MemoryStore {
    fn list_all(&self, collection: Collection) -> ChillResult<Vec<MediaRecord>> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn get(&self, collection: Collection, id: &str) -> ChillResult<Option<MediaRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.records.lock().get(&(collection, id.to_string())).cloned())
    }

    fn add(&self, collection: Collection, media: NewMedia) -> ChillResult<MediaRecord> {
        self.check()?;
        let record = MediaRecord {
            id: next_id(),
            name: media.name,
            kind: media.kind,
            url: media.url,
            volume: media.volume,
            created_ms: 0,
        };
        self.records
            .lock()
            .insert((collection, record.id.clone()), record.clone());
        Ok(record)
    }

    fn update(&self, collection: Collection, id: &str, patch: MediaPatch) -> ChillResult<MediaRecord> {
        self.check()?;
        let mut records = self.records.lock();
        let record = records
            .get_mut(&(collection, id.to_string()))
            .ok_or_else(|| ChillError::RecordNotFound { collection, id: id.to_string() })?;
        patch.apply(record);
        Ok(record.clone())
    }

    fn delete(&self, collection: Collection, id: &str) -> ChillResult<bool> {
        self.check()?;
        Ok(self.records.lock().remove(&(collection, id.to_string())).is_some())
    }
}

impl ListStore for MemoryStore {
    fn read_list(&self, path: &str) -> ChillResult<Vec<Value>> {
        self.check()?;
        Ok(self
            .lists
            .lock()
            .get(path)
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default())
    }

    fn write_list(&self, path: &str, items: Vec<Value>) -> ChillResult<()> {
        self.check()?;
        self.lists.lock().insert(path.to_string(), Value::Array(items));
        Ok(())
    }

    fn read_setting(&self, path: &str) -> ChillResult<Option<Value>> {
        self.check()?;
        Ok(self.lists.lock().get(path).cloned())
    }

    fn write_setting(&self, path: &str, value: Value) -> ChillResult<()> {
        self.check()?;
        self.lists.lock().insert(path.to_string(), value);
        Ok(())
    }
}
