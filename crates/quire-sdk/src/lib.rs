//! High-level SDK for Quire.
//!
//! [`Quire`] is the repository worker: it owns one session per working
//! copy, the object index engine, and saved remote credentials, and exposes
//! every operation as an async method. This is the main entry point for
//! applications embedding Quire.

pub mod buffers;
pub mod config;
pub mod datasets;
pub mod error;
pub mod repository;

pub use config::{AuthorConfig, QuireConfig, RemoteConfig};
pub use error::{SdkError, SdkResult};
pub use repository::Quire;

// Re-export key types
pub use quire_index::{
    DatasetKey, IndexDescription, JsonObjectSpec, ObjectChange, ObjectChangeset, ObjectSpec, DEFAULT_INDEX_ID,
};
pub use quire_session::StatusStream;
pub use quire_sync::{PullResult, RemoteDescription};
pub use quire_types::{
    Author, BufferChange, BufferChangeset, BufferDataset, BufferPath, ChangeStatus, CommitHash,
    CommitOutcome, GitAuthentication, IndexStatus, RepoStatus,
};
