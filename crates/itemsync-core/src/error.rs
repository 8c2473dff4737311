//! Error types for itemsync core.

use thiserror::Error;

use crate::types::ItemKey;

/// Errors raised by records, keys and chunking.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid item key: {0:?}")]
    InvalidKey(String),

    #[error("item already has key {existing}, refusing to assign {new}")]
    KeyAlreadyAssigned { existing: ItemKey, new: ItemKey },

    #[error("chunk size must be positive")]
    InvalidChunkSize,

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
