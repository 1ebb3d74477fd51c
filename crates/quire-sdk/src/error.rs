use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(#[from] quire_session::SessionError),

    #[error("store error: {0}")]
    Store(#[from] quire_store::StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] quire_diff::DiffError),

    #[error("commit error: {0}")]
    Commit(#[from] quire_commit::CommitError),

    #[error("sync error: {0}")]
    Sync(#[from] quire_sync::SyncError),

    #[error("index error: {0}")]
    Index(#[from] quire_index::IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SdkResult<T> = Result<T, SdkError>;
