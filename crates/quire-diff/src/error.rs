//! Error types for the diff crate.

use quire_types::BufferPath;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The changeset and the current buffers cover different paths.
    /// This is a caller bug: current content must be read for exactly the
    /// changeset's paths.
    #[error("changeset and current buffers differ in paths (missing: {missing:?}, extra: {extra:?})")]
    PathSetMismatch {
        missing: Vec<BufferPath>,
        extra: Vec<BufferPath>,
    },

    /// Strict validation found a change without a reference value.
    #[error("no reference value supplied for {0}")]
    MissingReference(BufferPath),

    /// A path from a Git tree is not a valid buffer path.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] quire_types::TypeError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] quire_store::StoreError),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
