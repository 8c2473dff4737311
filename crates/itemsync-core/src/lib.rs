//! # itemsync core
//!
//! Pure primitives for itemsync: records, identities, versions and chunking.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Record`] - A library item with parent linkage and a JSON field set
//! - [`ItemKey`] - Stable string identity of an item
//! - [`Version`] - Server-assigned, monotonically increasing version number
//! - [`Batcher`] - Splits operation lists into request-sized chunks
//! - [`KeyGenerator`] - Mints identities for new local items

pub mod batch;
pub mod error;
pub mod keys;
pub mod record;
pub mod types;

pub use batch::{Batcher, DEFAULT_CHUNK_SIZE};
pub use error::{CoreError, Result};
pub use keys::{KeyGenerator, RandomKeyGenerator, KEY_ALPHABET, KEY_LENGTH};
pub use record::{field, Record, RecordBuilder, RecordDump};
pub use types::{ItemKey, Version, WriteFailure};
