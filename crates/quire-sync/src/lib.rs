//! Sync engine for Quire working copies.
//!
//! Every operation is blocking and expects the caller to hold the working
//! copy's session lock where it mutates. Credentials are passed per call and
//! only persisted through an explicit [`CredentialStore`].
//!
//! # Key Types
//!
//! - [`PullResult`] - HEAD before and after a pull
//! - [`RemoteDescription`] - branches and push access of a remote
//! - [`CredentialStore`] - saved remote passwords, looked up by host then URL

pub mod auth;
pub mod error;
pub mod local;
pub mod names;
pub mod remote;
pub mod types;

pub use auth::{remote_callbacks, resolve_auth, save_auth, CredentialStore, InMemoryCredentialStore};
pub use error::{SyncError, SyncResult};
pub use local::{add_origin, delete_origin, delete_working_copy, init, origin_url};
pub use names::{normalize_url, validate_branch_name, ORIGIN};
pub use remote::{clone, describe_remote, pull, push, ProgressFn};
pub use types::{PullResult, RemoteDescription};
