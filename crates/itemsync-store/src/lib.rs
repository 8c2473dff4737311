//! # itemsync store
//!
//! Local state for itemsync: the item index, the collection sync state,
//! snapshots, and durable caches.
//!
//! ## Key Types
//!
//! - [`ItemIndex`] - Key → record map with parent/child back-references
//! - [`ItemCollection`] - Index plus version watermark and pending-new queue
//! - [`CollectionDump`] - Transportable snapshot (JSON or CBOR)
//! - [`DurableCache`] - Async trait for opportunistic persistence
//! - [`SqliteCache`] - SQLite-backed cache
//! - [`MemoryCache`] - In-memory cache for tests
//!
//! ## Usage
//!
//! ```rust
//! use itemsync_core::{ItemKey, Record, Version};
//! use itemsync_store::ItemCollection;
//!
//! let mut collection = ItemCollection::new();
//! let book = Record::builder("book")
//!     .key(ItemKey::new("BOOK0001").unwrap())
//!     .version(Version(3))
//!     .synced()
//!     .build();
//! collection.index_mut().insert_or_replace(book).unwrap();
//!
//! let restored = ItemCollection::restore(collection.dump()).unwrap();
//! assert!(restored.index().contains("BOOK0001"));
//! ```
//!
//! ## Design Notes
//!
//! - **Child keys are derived**: never persisted, rebuilt after bulk loads
//! - **Remote deletes spare unsynced copies**: see [`ItemIndex::remove_if_synced`]
//! - **Watermark is monotonic**: [`ItemCollection::advance_version`] never moves back

pub mod cache;
pub mod collection;
pub mod error;
pub mod index;
pub mod memory;
pub mod migration;
pub mod snapshot;
pub mod sqlite;

pub use cache::DurableCache;
pub use collection::{ItemCollection, PendingItem};
pub use error::{Result, StoreError};
pub use index::ItemIndex;
pub use memory::MemoryCache;
pub use snapshot::CollectionDump;
pub use sqlite::SqliteCache;
