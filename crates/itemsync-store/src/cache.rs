//! DurableCache trait: the interface for opportunistic local persistence.
//!
//! After a successful write the sync engine hands updated records to a
//! durable cache. Persistence is best-effort: a cache failure is logged by
//! the caller and never undoes an acknowledged write.

use async_trait::async_trait;
use itemsync_core::{ItemKey, Record};

use crate::error::Result;

/// Async interface for key-value persistence of records.
///
/// Implementations include SQLite ([`SqliteCache`](crate::SqliteCache)) and
/// in-memory ([`MemoryCache`](crate::MemoryCache)) for tests.
///
/// # Design Notes
///
/// - **Upsert semantics**: persisting a record whose key is already cached
///   replaces the cached copy.
/// - **Keyless records are skipped**: only records with an identity can be
///   addressed later.
/// - **No child keys**: records are cached in their dump form; child keys
///   are re-derived by the index after loading.
#[async_trait]
pub trait DurableCache: Send + Sync {
    /// Store or replace the given records.
    async fn persist(&self, records: &[Record]) -> Result<()>;

    /// Load every cached record, ordered by key.
    async fn load_all(&self) -> Result<Vec<Record>>;

    /// Drop cached copies of the given keys. Unknown keys are ignored.
    async fn remove(&self, keys: &[ItemKey]) -> Result<()>;

    /// Number of cached records.
    async fn len(&self) -> Result<usize>;
}
