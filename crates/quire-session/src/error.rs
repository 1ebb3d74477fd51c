use std::path::PathBuf;

use quire_types::Operation;

/// Errors produced while coordinating access to a working copy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Another operation holds the working copy and this one may not queue,
    /// or the queue is full.
    #[error("{workdir} is busy, cannot start {operation}")]
    LockBusy { workdir: PathBuf, operation: Operation },

    /// Waited too long for the working copy.
    #[error("timed out after {waited_ms}ms waiting to {operation} {workdir}")]
    LockTimeout {
        workdir: PathBuf,
        operation: Operation,
        waited_ms: u64,
    },

    /// The session was shut down.
    #[error("session for {0} is closed")]
    Closed(PathBuf),

    /// The blocking job panicked or was cancelled by the runtime.
    #[error("job failed to complete: {0}")]
    Join(String),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
