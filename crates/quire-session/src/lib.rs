//! Working-copy sessions for Quire.
//!
//! One [`RepoSession`] exists per working-copy path. It serializes mutating
//! operations with a queue of bounded length and a wait timeout, runs their
//! blocking work off the async runtime, and streams the copy's
//! [`RepoStatus`](quire_types::RepoStatus) to subscribers.
//!
//! # Key Types
//!
//! - [`RepoSession`] - lock and status channel for one working copy
//! - [`SessionRegistry`] - sessions keyed by path
//! - [`BusyReporter`] - progress handle passed to running jobs
//! - [`SessionConfig`] - timeouts, queue bound, and throttling

pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod status;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use registry::SessionRegistry;
pub use session::{RepoSession, SessionGuard};
pub use status::{BusyReporter, StatusStream};
