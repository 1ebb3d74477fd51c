//! Commit orchestration for Quire.
//!
//! Turns buffer changesets into Git commits. Every operation here is
//! blocking and expects the caller to hold the working copy's session lock.
//!
//! # Pipeline
//!
//! 1. Validate the request (non-empty changeset, author, message, encodings).
//! 2. Read current content for exactly the changeset's paths and check for
//!    conflicts (skipped for the very first commit).
//! 3. Write or remove files, stage them, and commit.
//! 4. On failure, restore the affected paths from HEAD and re-raise.
//!
//! # Key Types
//!
//! - [`CommitRequest`] -- Author, message, changeset, and validation switch
//! - [`update_buffers`] -- Apply a changeset as one commit
//! - [`delete_tree`] / [`move_tree`] -- Subtree operations without per-buffer checks
//! - [`add_external_buffers`] -- Copy files from the filesystem into buffers

pub mod error;
pub mod maintenance;
pub mod orchestrator;
pub mod request;
pub mod tree_ops;
pub mod validation;
mod writer;

pub use error::{CommitError, CommitResult};
pub use maintenance::{add_external_buffers, commit_outstanding_changes, discard_uncommitted_changes};
pub use orchestrator::update_buffers;
pub use request::CommitRequest;
pub use tree_ops::{delete_tree, move_tree};
pub use validation::{validate_authoring, validate_request};
