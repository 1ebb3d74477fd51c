//! Error types for the index crate.

use quire_types::BufferPath;

use crate::engine::DatasetKey;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No object specs are registered for the dataset.
    #[error("dataset not loaded: {0}")]
    NotRegistered(DatasetKey),

    /// The index id is unknown for this dataset.
    #[error("no such index: {0}")]
    UnknownIndex(String),

    /// A query or key expression failed to parse.
    #[error("invalid expression {expression:?}: {reason}")]
    Parse { expression: String, reason: String },

    /// An expression failed for one object. Builds log and skip these.
    #[error("evaluation failed for {path}: {reason}")]
    Evaluation { path: BufferPath, reason: String },

    /// An object spec could not decode or encode an object.
    #[error("cannot decode {path}: {reason}")]
    Decode { path: BufferPath, reason: String },

    /// No registered spec claims the object path.
    #[error("no object spec claims {0}")]
    Unclaimed(BufferPath),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("background task failed: {0}")]
    Join(String),

    #[error("store error: {0}")]
    Store(#[from] quire_store::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
