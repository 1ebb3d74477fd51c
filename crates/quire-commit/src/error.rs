use std::path::PathBuf;

use quire_types::BufferPath;

/// Errors that can occur while preparing or creating a commit.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The changeset contains no paths.
    #[error("changeset is empty")]
    EmptyChangeset,

    /// Author name or email is blank.
    #[error("author name and email are required")]
    MissingAuthor,

    /// Commit message is blank.
    #[error("commit message is required")]
    MissingCommitMessage,

    /// A change declares an encoding other than binary or UTF-8.
    #[error("unsupported encoding {encoding:?} for {path}")]
    UnsupportedEncoding { path: BufferPath, encoding: String },

    /// A change declared as UTF-8 carries invalid UTF-8.
    #[error("content of {0} is not valid UTF-8")]
    InvalidUtf8(BufferPath),

    /// A tree operation was asked to act on the repository root.
    #[error("tree operations require a non-root path")]
    RootTree,

    /// The subtree to delete or move does not exist.
    #[error("tree not found: {0}")]
    TreeNotFound(BufferPath),

    /// The destination of a move already exists or overlaps the source.
    #[error("cannot move tree to {0}: target exists or overlaps the source")]
    TargetExists(BufferPath),

    /// A source file for an external buffer does not exist.
    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    /// Conflict detection failed.
    #[error("diff error: {0}")]
    Diff(#[from] quire_diff::DiffError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] quire_store::StoreError),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for commit operations.
pub type CommitResult<T> = Result<T, CommitError>;
