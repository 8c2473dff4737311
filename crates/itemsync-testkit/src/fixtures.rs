//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};

use itemsync_core::{ItemKey, KeyGenerator, Record};
use itemsync_sync::transport::memory::MemoryRemote;
use itemsync_sync::{EventSink, SyncConfig, SyncCoordinator, SyncEvent};

/// Deterministic key generator: `T0000001`, `T0000002`, ...
#[derive(Debug, Default)]
pub struct SequentialKeys {
    next: AtomicUsize,
}

impl SequentialKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys handed out so far.
    pub fn issued(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

impl KeyGenerator for SequentialKeys {
    fn new_key(&self) -> ItemKey {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        key(&format!("T{n:07}"))
    }
}

/// Event sink that remembers every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Only the `DeleteProgress` events, as `(completed, total)`.
    pub fn delete_progress(&self) -> Vec<(usize, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::DeleteProgress { completed, total } => Some((completed, total)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for RecordingSink {
    fn notify(&self, event: SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// A remote, a deterministic key generator and an event recorder.
pub struct TestFixture {
    pub remote: Arc<MemoryRemote>,
    pub keys: Arc<SequentialKeys>,
    pub events: Arc<RecordingSink>,
}

impl TestFixture {
    /// Create a fixture around an empty remote.
    pub fn new() -> Self {
        Self {
            remote: MemoryRemote::new(),
            keys: Arc::new(SequentialKeys::new()),
            events: Arc::new(RecordingSink::new()),
        }
    }

    /// Sync configuration with the given chunk size.
    pub fn config(&self, chunk_size: usize) -> SyncConfig {
        SyncConfig {
            chunk_size,
            ..SyncConfig::default()
        }
    }

    /// A coordinator wired to this fixture's remote, keys and events.
    ///
    /// Panics on a zero chunk size.
    pub fn coordinator(&self, chunk_size: usize) -> SyncCoordinator<Arc<MemoryRemote>> {
        SyncCoordinator::new(Arc::clone(&self.remote), self.config(chunk_size))
            .expect("positive chunk size")
            .with_key_generator(self.keys.clone())
            .with_event_sink(self.events.clone())
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a key, panicking on invalid input.
pub fn key(s: &str) -> ItemKey {
    ItemKey::new(s).unwrap_or_else(|e| panic!("fixture key {s:?}: {e}"))
}

/// A keyless book.
pub fn book(title: &str) -> Record {
    Record::builder("book").field("title", title).build()
}

/// `n` keyless books titled `Book 0`, `Book 1`, ...
pub fn books(n: usize) -> Vec<Record> {
    (0..n).map(|i| book(&format!("Book {i}"))).collect()
}

/// A keyless child note.
pub fn note(text: &str) -> Record {
    Record::builder("note").field("note", text).build()
}

/// A keyless child attachment.
pub fn attachment(title: &str) -> Record {
    Record::builder("attachment").field("title", title).build()
}

/// A raw server field dictionary, as a feed parser would produce it.
pub fn api_object(key: &str, version: u64, parent: Option<&str>) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("key".into(), json!(key));
    object.insert("version".into(), json!(version));
    object.insert(
        "itemType".into(),
        json!(if parent.is_some() { "note" } else { "book" }),
    );
    if let Some(parent) = parent {
        object.insert("parentItem".into(), json!(parent));
    }
    object
}
