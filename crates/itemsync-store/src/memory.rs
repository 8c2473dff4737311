//! In-memory implementation of the DurableCache trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use itemsync_core::{ItemKey, Record, RecordDump};

use crate::cache::DurableCache;
use crate::error::{Result, StoreError};

/// In-memory cache implementation.
///
/// All data is lost when the cache is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryCache {
    records: RwLock<BTreeMap<ItemKey, RecordDump>>,
}

impl MemoryCache {
    /// Create a new empty in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

#[async_trait]
impl DurableCache for MemoryCache {
    async fn persist(&self, records: &[Record]) -> Result<()> {
        let mut cached = self.records.write().map_err(poisoned)?;
        for record in records {
            if let Some(key) = record.key() {
                cached.insert(key.clone(), record.dump());
            }
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Record>> {
        let cached = self.records.read().map_err(poisoned)?;
        Ok(cached.values().cloned().map(Record::from_dump).collect())
    }

    async fn remove(&self, keys: &[ItemKey]) -> Result<()> {
        let mut cached = self.records.write().map_err(poisoned)?;
        for key in keys {
            cached.remove(key);
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}
