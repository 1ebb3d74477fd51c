//! Buffer storage for Quire.
//!
//! A working copy is a Git repository whose files are treated as opaque byte
//! buffers addressed by [`BufferPath`](quire_types::BufferPath). This crate
//! reads buffers from the working tree and from historical commits, lists
//! buffer paths, and resolves Git LFS pointers on read.
//!
//! There is no write API here. Every mutation goes through the commit
//! orchestrator, under the session lock and after conflict checks.
//!
//! # Key Types
//!
//! - [`BufferReader`] -- Read-only access to buffers (trait)
//! - [`WorkingTree`] -- Reads buffers from a working copy on disk
//! - [`InMemoryBufferStore`] -- `BTreeMap`-backed reader for tests and embedding
//! - [`LfsPointer`] / [`LfsResolver`] / [`HttpLfsResolver`] -- LFS pointer handling
//!
//! # Design Rules
//!
//! 1. Missing buffers read as `None`, never as an error.
//! 2. The `.git` directory and ignored files are never buffers.
//! 3. LFS content is resolved at read time only and never written back.

pub mod error;
pub mod lfs;
pub mod listing;
pub mod memory;
pub mod reader;
pub mod repo;
pub mod revision;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use lfs::{resolve_lfs_pointers, HttpLfsResolver, LfsPointer, LfsResolver};
pub use listing::{list_all_buffer_paths, list_directory, walk_buffer_paths};
pub use memory::InMemoryBufferStore;
pub use reader::{read_buffers, read_tree, WorkingTree};
pub use repo::{
    commit_hash, commit_oid, current_commit, find_commit, head_commit, open_repository,
    workdir_is_valid,
};
pub use revision::{
    blob_at, choose_most_recent_commit, read_buffers_at_revision, read_tree_at_revision,
    tree_buffers,
};
pub use traits::BufferReader;
