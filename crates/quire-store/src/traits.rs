use std::collections::BTreeMap;

use bytes::Bytes;
use quire_types::{BufferDataset, BufferPath};

use crate::error::StoreResult;

/// Read-only access to buffers.
///
/// All implementations must satisfy these invariants:
/// - A missing buffer reads as `Ok(None)`.
/// - `read_tree` returns every buffer at or below `root`, keyed by full path.
/// - Reads never mutate the underlying storage.
pub trait BufferReader: Send + Sync {
    /// Read one buffer.
    fn read(&self, path: &BufferPath) -> StoreResult<Option<Bytes>>;

    /// Read every buffer at or below `root`.
    fn read_tree(&self, root: &BufferPath) -> StoreResult<BTreeMap<BufferPath, Bytes>>;

    /// Paths of every buffer at or below `root`, sorted.
    fn list_paths(&self, root: &BufferPath) -> StoreResult<Vec<BufferPath>> {
        Ok(self.read_tree(root)?.into_keys().collect())
    }

    /// Read several buffers. Default implementation calls `read()` for each path.
    fn read_batch(&self, paths: &[BufferPath]) -> StoreResult<BufferDataset> {
        paths
            .iter()
            .map(|path| Ok((path.clone(), self.read(path)?)))
            .collect()
    }
}
