//! # itemsync sync
//!
//! Chunked write/delete synchronization against a versioned remote item
//! store.
//!
//! ## Protocol Overview
//!
//! 1. **Expand**: each record is followed by its notes, then its attachments
//! 2. **Chunk**: operations are split into requests of at most 50 objects
//! 3. **Dispatch**: chunks are sent strictly in order, one at a time
//! 4. **Reconcile**: each response's `success`/`unchanged`/`failed` buckets
//!    are applied to the index and the version watermark advances
//!
//! A transport failure stops the operation at the failing chunk; chunks
//! already reconciled stay applied and are reported in
//! [`SyncError::Incomplete`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use itemsync_sync::{SyncConfig, SyncCoordinator};
//!
//! let sync = SyncCoordinator::new(transport, SyncConfig::default())?;
//! let written = sync.write_records(&mut collection, records).await?;
//! ```

pub mod coordinator;
pub mod error;
pub mod events;
pub mod messages;
pub mod transport;

pub use coordinator::{DeleteTarget, FlushReport, SyncConfig, SyncCoordinator};
pub use error::{Result, SyncError};
pub use events::{EventSink, SyncEvent};
pub use messages::{Endpoint, LibraryKind, LibraryTarget, WriteResponse};
pub use transport::{Method, Request, Response, Transport};
