//! The Library: one item collection and the engine that syncs it.
//!
//! A `Library` owns its [`ItemCollection`], so every operation runs against
//! an exclusive borrow and operations on one library never overlap.

use std::sync::Arc;

use serde_json::{Map, Value};

use itemsync_core::{ItemKey, KeyGenerator, Record, Version};
use itemsync_store::{CollectionDump, DurableCache, ItemCollection};
use itemsync_sync::{
    DeleteTarget, EventSink, FlushReport, SyncConfig, SyncCoordinator, Transport,
};

use crate::error::Result;

/// Configuration for a Library.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Sync configuration.
    pub sync: SyncConfig,
    /// Hand written records to the durable cache after each chunk.
    pub persist_after_write: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            persist_after_write: true,
        }
    }
}

/// A synchronized item library.
pub struct Library<T: Transport> {
    collection: ItemCollection,
    sync: SyncCoordinator<T>,
    cache: Option<Arc<dyn DurableCache>>,
    config: LibraryConfig,
}

impl<T: Transport> Library<T> {
    /// Create an empty library.
    pub fn new(transport: T, config: LibraryConfig) -> Result<Self> {
        Ok(Self {
            collection: ItemCollection::new(),
            sync: SyncCoordinator::new(transport, config.sync.clone())?,
            cache: None,
            config,
        })
    }

    /// Attach a durable cache.
    ///
    /// Written records are persisted to it only when
    /// [`LibraryConfig::persist_after_write`] is set; it is always available
    /// to [`hydrate_from_cache`](Self::hydrate_from_cache).
    pub fn with_cache(mut self, cache: Arc<dyn DurableCache>) -> Self {
        if self.config.persist_after_write {
            self.sync = self.sync.with_cache(Arc::clone(&cache));
        }
        self.cache = Some(cache);
        self
    }

    /// Use a specific key generator.
    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.sync = self.sync.with_key_generator(keys);
        self
    }

    /// Publish sync events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sync = self.sync.with_event_sink(sink);
        self
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn collection(&self) -> &ItemCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut ItemCollection {
        &mut self.collection
    }

    /// The collection version watermark.
    pub fn version(&self) -> Version {
        self.collection.version()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.collection.index().get(key)
    }

    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<&Record>> {
        self.collection.index().get_many(keys)
    }

    /// Keys the library holds no copy of.
    pub fn keys_not_present<'a>(&self, keys: &'a [ItemKey]) -> Vec<&'a ItemKey> {
        self.collection.index().keys_not_present(keys)
    }

    /// Items filed in the given collection.
    pub fn find_in_collection(&self, collection_key: &str) -> Vec<&Record> {
        self.collection.find_in_collection(collection_key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Hydrate items from raw server field dictionaries.
    pub fn load_data_objects(&mut self, objects: Vec<Map<String, Value>>) -> Result<Vec<ItemKey>> {
        Ok(self.collection.load_data_objects(objects)?)
    }

    /// Hydrate items parsed from a feed and cache them.
    pub async fn add_items_from_feed(
        &mut self,
        objects: Vec<Map<String, Value>>,
    ) -> Result<Vec<ItemKey>> {
        let keys = self.collection.load_data_objects(objects)?;
        if let Some(cache) = &self.cache {
            let records: Vec<Record> = self
                .collection
                .index()
                .get_many(keys.as_slice())
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            if let Err(e) = cache.persist(&records).await {
                tracing::warn!(error = %e, "failed to cache feed items");
            }
        }
        Ok(keys)
    }

    /// Apply a server deletion notice. Unsynced local copies are kept.
    pub async fn remote_delete(&mut self, key: &ItemKey) -> Result<bool> {
        let removed = self.collection.remote_delete(key.as_str());
        if removed {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.remove(std::slice::from_ref(key)).await {
                    tracing::warn!(error = %e, %key, "failed to drop remotely deleted item from cache");
                }
            }
        }
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or update records. See [`SyncCoordinator::write_records`].
    pub async fn write(&mut self, records: Vec<Record>) -> Result<Vec<Record>> {
        Ok(self.sync.write_records(&mut self.collection, records).await?)
    }

    /// Queue a record for creation by the next [`flush_unsynced_new`](Self::flush_unsynced_new).
    pub fn create_later(&mut self, record: Record) {
        self.collection.queue_new(record);
    }

    /// Create every queued record.
    pub async fn flush_unsynced_new(&mut self) -> Result<FlushReport> {
        Ok(self.sync.flush_unsynced_new(&mut self.collection).await?)
    }

    /// Delete items in chunks. See [`SyncCoordinator::delete_records`].
    pub async fn delete(
        &mut self,
        targets: Vec<DeleteTarget<'_>>,
        expected: Option<Version>,
    ) -> Result<()> {
        Ok(self
            .sync
            .delete_records(&mut self.collection, targets, expected)
            .await?)
    }

    /// Delete one item guarded by its version.
    pub async fn delete_one(&mut self, key: &str) -> Result<bool> {
        let Some(record) = self.collection.index().get(key).cloned() else {
            return Ok(false);
        };
        self.sync.delete_record(&mut self.collection, &record).await?;
        Ok(true)
    }

    pub async fn trash(&mut self, keys: &[ItemKey]) -> Result<Vec<Record>> {
        Ok(self.sync.trash_records(&mut self.collection, keys).await?)
    }

    pub async fn untrash(&mut self, keys: &[ItemKey]) -> Result<Vec<Record>> {
        Ok(self.sync.untrash_records(&mut self.collection, keys).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> CollectionDump {
        self.collection.dump()
    }

    /// Replace the collection with a restored snapshot.
    pub fn restore(&mut self, dump: CollectionDump) -> Result<()> {
        self.collection = ItemCollection::restore(dump)?;
        Ok(())
    }

    /// Load every record held by the durable cache into the index.
    ///
    /// Returns the number of records loaded; zero without a cache.
    pub async fn hydrate_from_cache(&mut self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let records = cache.load_all().await?;
        let count = records.len();

        let index = self.collection.index_mut();
        for record in records {
            index.insert_or_replace(record)?;
        }
        index.rebuild_child_links();

        tracing::info!(count, "hydrated library from cache");
        Ok(count)
    }
}
