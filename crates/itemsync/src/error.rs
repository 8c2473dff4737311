//! Error types for the library facade.

use itemsync_core::CoreError;
use itemsync_store::StoreError;
use itemsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Record-level error.
    #[error("record error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl LibraryError {
    /// The sync error behind this one, if any.
    pub fn as_sync(&self) -> Option<&SyncError> {
        match self {
            LibraryError::Sync(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for Library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;
