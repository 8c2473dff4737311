//! # itemsync
//!
//! Client-side synchronization core for a library of hierarchical items
//! (records with child notes and attachments) kept consistent with a
//! versioned remote store through a batched write/delete API.
//!
//! ## Overview
//!
//! - **Records**: field maps with an immutable identity and a server version
//! - **Index**: key → record map with derived parent/child back-references
//! - **Sync**: chunked, strictly sequential writes and deletes that reconcile
//!   every response into the index and advance a version watermark
//! - **Snapshots**: JSON or CBOR dumps that restore the full index
//!
//! ## Usage
//!
//! ```rust,no_run
//! use itemsync::{Library, LibraryConfig, Record};
//! use itemsync::sync::transport::memory::MemoryRemote;
//!
//! async fn example() -> itemsync::Result<()> {
//!     let mut library = Library::new(MemoryRemote::new(), LibraryConfig::default())?;
//!
//!     let book = Record::builder("book")
//!         .field("title", "Dune")
//!         .note(Record::builder("note").field("note", "<p>spice</p>").build())
//!         .build();
//!     let written = library.write(vec![book]).await?;
//!     assert_eq!(written.len(), 2);
//!
//!     let snapshot = library.snapshot();
//!     library.restore(snapshot)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `itemsync::core` - Records, keys, versions, chunking
//! - `itemsync::store` - Index, collection state, snapshots, caches
//! - `itemsync::sync` - Transport, wire messages, coordinator

pub mod error;
pub mod library;

// Re-export component crates
pub use itemsync_core as core;
pub use itemsync_store as store;
pub use itemsync_sync as sync;

// Re-export main types for convenience
pub use error::{LibraryError, Result};
pub use library::{Library, LibraryConfig};

// Re-export commonly used types
pub use itemsync_core::{ItemKey, Record, RecordBuilder, Version, WriteFailure};
pub use itemsync_store::{CollectionDump, ItemCollection, SqliteCache};
pub use itemsync_sync::{
    DeleteTarget, Endpoint, FlushReport, LibraryTarget, SyncConfig, SyncError, SyncEvent,
};
