//! Status types streamed to subscribers while the worker runs operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mutating operation currently holding a working copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    Clone,
    Pull,
    Push,
    Commit,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Init => "init",
            Operation::Clone => "clone",
            Operation::Pull => "pull",
            Operation::Push => "push",
            Operation::Commit => "commit",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Progress of a long-running step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: String,
    pub loaded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Progress {
    pub fn new(phase: impl Into<String>, loaded: u64, total: Option<u64>) -> Self {
        Self {
            phase: phase.into(),
            loaded,
            total,
        }
    }
}

/// Details of a busy working copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyStatus {
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_error: Option<String>,
    #[serde(default)]
    pub awaiting_password: bool,
}

impl BusyStatus {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            progress: None,
            network_error: None,
            awaiting_password: false,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Status of a working copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoStatus {
    #[default]
    Ready,
    Busy(BusyStatus),
}

impl RepoStatus {
    pub fn busy(operation: Operation) -> Self {
        RepoStatus::Busy(BusyStatus::new(operation))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, RepoStatus::Busy(_))
    }

    /// The operation holding the working copy, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            RepoStatus::Ready => None,
            RepoStatus::Busy(busy) => Some(busy.operation),
        }
    }
}

/// Build status of an object index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// Objects currently in the index.
    pub object_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// `true` once a build ran to the end without being stopped.
    pub complete: bool,
}

impl IndexStatus {
    pub fn completed(object_count: usize) -> Self {
        Self {
            object_count,
            progress: None,
            complete: true,
        }
    }
}

/// Change classification of a buffer between two trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Unchanged,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Removed => "removed",
            ChangeStatus::Unchanged => "unchanged",
        };
        f.write_str(name)
    }
}
