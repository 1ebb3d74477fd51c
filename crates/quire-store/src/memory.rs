use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use quire_types::BufferPath;

use crate::error::StoreResult;
use crate::traits::BufferReader;

/// In-memory, `BTreeMap`-based buffer reader.
///
/// Intended for tests and embedding. Buffers are held behind a `RwLock` and
/// can be changed between reads to simulate commits.
pub struct InMemoryBufferStore {
    buffers: RwLock<BTreeMap<BufferPath, Bytes>>,
}

impl InMemoryBufferStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            buffers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert or replace a buffer.
    pub fn insert(&self, path: BufferPath, content: impl Into<Bytes>) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, content.into());
    }

    /// Remove a buffer. Returns `true` if it existed.
    pub fn remove(&self, path: &BufferPath) -> bool {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    /// Number of buffers currently stored.
    pub fn len(&self) -> usize {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBufferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: AsRef<str>, C: Into<Bytes>> FromIterator<(P, C)> for InMemoryBufferStore {
    /// Build a store from `(path, content)` pairs. Invalid paths are skipped.
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let store = Self::new();
        for (path, content) in iter {
            if let Ok(path) = BufferPath::new(path.as_ref()) {
                store.insert(path, content);
            }
        }
        store
    }
}

impl BufferReader for InMemoryBufferStore {
    fn read(&self, path: &BufferPath) -> StoreResult<Option<Bytes>> {
        let map = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(path).cloned())
    }

    fn read_tree(&self, root: &BufferPath) -> StoreResult<BTreeMap<BufferPath, Bytes>> {
        let map = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map
            .iter()
            .filter(|(path, _)| path.is_within(root))
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect())
    }

    fn list_paths(&self, root: &BufferPath) -> StoreResult<Vec<BufferPath>> {
        let map = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.keys().filter(|path| path.is_within(root)).cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryBufferStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBufferStore")
            .field("buffer_count", &self.len())
            .finish()
    }
}
