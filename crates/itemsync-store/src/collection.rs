//! ItemCollection: the index plus the collection-wide sync state.
//!
//! A collection is an explicit handle. Every sync operation takes it by
//! `&mut`, so one collection never sees overlapping mutations.

use serde_json::{Map, Value};

use itemsync_core::{ItemKey, Record, Version, WriteFailure};

use crate::error::{Result, StoreError};
use crate::index::ItemIndex;

/// A record created before it could be written, awaiting its first
/// successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    /// The record to create.
    pub record: Record,
    /// Why the last attempt failed, if one was made.
    pub last_error: Option<WriteFailure>,
}

impl PendingItem {
    /// Queue a record with no failure history.
    pub fn new(record: Record) -> Self {
        Self {
            record,
            last_error: None,
        }
    }
}

/// The item collection of one library.
#[derive(Debug, Default, Clone)]
pub struct ItemCollection {
    pub(crate) index: ItemIndex,
    pub(crate) version: Version,
    pub(crate) pending_new: Vec<PendingItem>,
}

impl ItemCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The item index.
    pub fn index(&self) -> &ItemIndex {
        &self.index
    }

    /// Mutable access to the item index.
    pub fn index_mut(&mut self) -> &mut ItemIndex {
        &mut self.index
    }

    /// Last version the server confirmed for the whole collection.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Advance the version watermark. Never moves it backwards.
    ///
    /// Returns the watermark after the update.
    pub fn advance_version(&mut self, observed: Version) -> Version {
        self.version = self.version.max(observed);
        self.version
    }

    /// Records waiting for their first successful write.
    pub fn pending_new(&self) -> &[PendingItem] {
        &self.pending_new
    }

    /// Queue a locally created record for a later flush.
    pub fn queue_new(&mut self, record: Record) {
        self.pending_new.push(PendingItem::new(record));
    }

    /// Take the whole pending queue, leaving it empty.
    pub fn take_pending(&mut self) -> Vec<PendingItem> {
        std::mem::take(&mut self.pending_new)
    }

    /// Replace the pending queue.
    pub fn replace_pending(&mut self, pending: Vec<PendingItem>) {
        self.pending_new = pending;
    }

    /// Hydrate records from raw server field dictionaries.
    ///
    /// Each object must carry an identity key. Child links are rebuilt once
    /// all records are in. Returns the loaded keys in input order.
    pub fn load_data_objects(&mut self, objects: Vec<Map<String, Value>>) -> Result<Vec<ItemKey>> {
        let mut loaded = Vec::with_capacity(objects.len());
        for object in objects {
            let record = Record::from_api_object(object)?;
            let key = record.key().cloned().ok_or(StoreError::MissingKey)?;
            self.index.insert_or_replace(record)?;
            loaded.push(key);
        }
        self.index.rebuild_child_links();
        tracing::debug!(count = loaded.len(), "loaded items from data objects");
        Ok(loaded)
    }

    /// Apply a server notice that `key` was deleted remotely.
    ///
    /// Only synced copies are dropped; an unsynced local copy holds data the
    /// server has not seen.
    pub fn remote_delete(&mut self, key: &str) -> bool {
        let removed = self.index.remove_if_synced(key);
        if !removed && self.index.contains(key) {
            tracing::debug!(key, "kept unsynced item despite remote delete");
        }
        removed
    }

    /// Items belonging to the given collection key.
    pub fn find_in_collection(&self, collection_key: &str) -> Vec<&Record> {
        self.index.find_matching(|r| r.in_collection(collection_key))
    }

    /// Drop all items, the pending queue and the watermark.
    pub fn reset(&mut self) {
        self.index.clear();
        self.pending_new.clear();
        self.version = Version::UNESTABLISHED;
    }
}
