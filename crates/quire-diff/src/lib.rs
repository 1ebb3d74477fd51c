//! Change detection for Quire.
//!
//! Decides whether a changeset can be applied safely against current buffer
//! content, and computes which buffers changed between two commits.
//!
//! # Key Types
//!
//! - [`find_conflicts`] -- Pure compare of expected against current buffer content
//! - [`changed_buffers_between`] -- Per-path [`ChangeStatus`](quire_types::ChangeStatus) between two commits
//! - [`sync_status`] -- Local commits compared with the `origin` remote-tracking branch

pub mod conflict;
pub mod error;
pub mod tree_diff;

pub use conflict::find_conflicts;
pub use error::{DiffError, DiffResult};
pub use tree_diff::{changed_buffers_between, sync_status, ChangeSet};
