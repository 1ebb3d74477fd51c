//! Object indexes for Quire datasets.
//!
//! A dataset is a directory of a working copy whose buffers are grouped into
//! objects by [`ObjectSpec`]s. The engine decodes every object into a JSON
//! value and keeps a default index ordered by object path, plus filtered
//! indexes selected and ordered by small expressions over `obj` and
//! `objPath`.
//!
//! # Key Types
//!
//! - [`IndexEngine`] -- Builds, queries and refreshes indexes per dataset
//! - [`DatasetKey`] -- Working copy plus dataset directory
//! - [`ObjectSpec`] -- Maps buffers to objects and decodes them (trait)
//! - [`JsonObjectSpec`] -- One `.json` buffer per object
//! - [`Expression`] -- Parsed query or sort-key expression
//! - [`IndexCache`] -- Persisted default-index snapshots keyed by commit (trait)
//!
//! # Design Rules
//!
//! 1. Filtered indexes are built from the finished default index.
//! 2. An object whose query or sort key fails to evaluate is logged and
//!    excluded; the build goes on.
//! 3. A stopped build keeps what it has and reports itself incomplete.
//! 4. Only the latest build of an index publishes its result.

pub mod cache;
pub mod engine;
pub mod error;
pub mod expr;
pub mod spec;

pub use cache::{DirectoryIndexCache, InMemoryIndexCache, IndexCache, IndexSnapshot};
pub use engine::{index_id, DatasetKey, IndexConfig, IndexDescription, IndexEngine, DEFAULT_INDEX_ID};
pub use error::{IndexError, IndexResult};
pub use expr::Expression;
pub use spec::{JsonObjectSpec, ObjectBuffers, ObjectChange, ObjectChangeset, ObjectSpec};
