//! Error types for the sync module.

use itemsync_core::{CoreError, ItemKey, Record, Version, WriteFailure};
use itemsync_store::StoreError;
use thiserror::Error;

/// Errors that can occur during write, delete and flush operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request could not be completed at all.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("http status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The server refused a precondition (HTTP 412).
    #[error("version conflict on {}: expected version {version}", .key.as_ref().map(ItemKey::as_str).unwrap_or("library"))]
    RecordConflict {
        key: Option<ItemKey>,
        version: Version,
    },

    /// Individual records were rejected inside a processed request.
    #[error("{} record(s) rejected by server", .0.len())]
    Rejected(Vec<WriteFailure>),

    /// The response could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A request body could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The operation stopped part-way; `written` holds every record already
    /// applied to the local index.
    #[error("incomplete after {} record(s): {source}", .written.len())]
    Incomplete {
        written: Vec<Record>,
        source: Box<SyncError>,
    },

    /// Local store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Record-level error.
    #[error("record error: {0}")]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Wrap `source` with the records applied before it occurred.
    pub fn incomplete(written: Vec<Record>, source: SyncError) -> Self {
        SyncError::Incomplete {
            written,
            source: Box::new(source),
        }
    }

    /// Records applied before the failure. Empty for non-partial errors.
    pub fn written(&self) -> &[Record] {
        match self {
            SyncError::Incomplete { written, .. } => written,
            _ => &[],
        }
    }

    /// The innermost cause, looking through `Incomplete`.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Incomplete { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the failure is a version conflict.
    pub fn is_conflict(&self) -> bool {
        match self.root() {
            SyncError::RecordConflict { .. } => true,
            SyncError::Rejected(failures) => failures.iter().any(WriteFailure::is_conflict),
            _ => false,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
