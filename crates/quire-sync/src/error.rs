use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("path already exists: {0}")]
    PathOccupied(PathBuf),

    #[error("authentication failed for {url}")]
    RemoteAuth { url: String },

    #[error("remote unreachable: {url}: {reason}")]
    RemoteUnreachable { url: String, reason: String },

    #[error("local branch {branch} has diverged from origin")]
    Diverged { branch: String },

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("no origin remote configured")]
    NoOrigin,

    #[error("HEAD does not point to a branch")]
    DetachedHead,

    #[error("invalid branch name {name:?}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] quire_store::StoreError),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Classify a transport-level git2 failure against `url`.
    pub(crate) fn from_transport(err: git2::Error, url: &str) -> Self {
        match (err.code(), err.class()) {
            (git2::ErrorCode::Auth, _) => SyncError::RemoteAuth { url: url.to_string() },
            (_, git2::ErrorClass::Http) if err.message().contains("401") || err.message().contains("403") => {
                SyncError::RemoteAuth { url: url.to_string() }
            }
            (_, git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh | git2::ErrorClass::Ssl) => {
                SyncError::RemoteUnreachable {
                    url: url.to_string(),
                    reason: err.message().to_string(),
                }
            }
            _ => SyncError::Git(err),
        }
    }

    /// `true` for failures a user can fix by supplying other credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::RemoteAuth { .. })
    }
}
