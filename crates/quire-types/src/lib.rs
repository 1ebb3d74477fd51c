//! Foundation types for Quire.
//!
//! Every other Quire crate depends on `quire-types`. The types here describe
//! the content of a Git working copy as a tree of opaque byte buffers and the
//! requests and outcomes exchanged with the repository worker.
//!
//! # Key Types
//!
//! - [`BufferPath`] — Normalized, root-relative, slash-separated buffer path
//! - [`BufferChange`] / [`BufferChangeset`] — Expected and new buffer content per path
//! - [`BufferDataset`] — Current content per path (`None` for absent buffers)
//! - [`Author`] — Commit author identity
//! - [`CommitHash`] — Git commit identifier (SHA-1)
//! - [`CommitOutcome`] — New commit hash or the set of conflicting paths
//! - [`RepoStatus`] — `ready` or `busy` with operation details
//! - [`IndexStatus`] — Progress of an object index build
//! - [`ChangeStatus`] — Per-path change classification between two trees

pub mod auth;
pub mod author;
pub mod buffer;
pub mod commit;
pub mod error;
pub mod path;
pub mod status;

pub use auth::GitAuthentication;
pub use author::Author;
pub use buffer::{BufferChange, BufferChangeset, BufferDataset, BufferEncoding, ExpectedValue};
pub use commit::{CommitHash, CommitOutcome};
pub use error::TypeError;
pub use path::BufferPath;
pub use status::{BusyStatus, ChangeStatus, IndexStatus, Operation, Progress, RepoStatus};
