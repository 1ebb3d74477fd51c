use std::path::PathBuf;

use quire_types::TypeError;

/// Errors from buffer store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The working copy does not exist or is not a Git repository.
    #[error("not a git repository: {0}")]
    NotAGitRepository(PathBuf),

    /// A ref or commit could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path read from disk or Git could not be turned into a buffer path.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] TypeError),

    /// LFS pointer resolution failed.
    #[error("LFS error: {0}")]
    Lfs(String),

    /// Working tree traversal failed.
    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("directory listing error: {0}")]
    Listing(#[from] walkdir::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
