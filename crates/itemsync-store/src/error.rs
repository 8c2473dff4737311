//! Error types for the store module.

use itemsync_core::CoreError;
use thiserror::Error;

/// Errors that can occur in the index, snapshots and durable caches.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Dump serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record without an identity key cannot be indexed or cached.
    #[error("record has no identity key")]
    MissingKey,

    /// Record-level error.
    #[error("record error: {0}")]
    Core(#[from] CoreError),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding cache state was poisoned.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
