//! Persisted default-index snapshots.
//!
//! A snapshot records the decoded objects of a dataset together with the
//! commit they were read at. Registration reuses a snapshot only when HEAD
//! still points at that commit.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use quire_types::{BufferPath, CommitHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::engine::DatasetKey;
use crate::error::{IndexError, IndexResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub commit: CommitHash,
    pub objects: BTreeMap<BufferPath, Value>,
}

/// Storage for [`IndexSnapshot`]s keyed by dataset.
pub trait IndexCache: Send + Sync {
    fn load(&self, key: &DatasetKey) -> IndexResult<Option<IndexSnapshot>>;
    fn store(&self, key: &DatasetKey, snapshot: &IndexSnapshot) -> IndexResult<()>;
    fn invalidate(&self, key: &DatasetKey) -> IndexResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryIndexCache {
    snapshots: RwLock<HashMap<DatasetKey, IndexSnapshot>>,
}

impl InMemoryIndexCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexCache for InMemoryIndexCache {
    fn load(&self, key: &DatasetKey) -> IndexResult<Option<IndexSnapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshots.get(key).cloned())
    }

    fn store(&self, key: &DatasetKey, snapshot: &IndexSnapshot) -> IndexResult<()> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(key.clone(), snapshot.clone());
        Ok(())
    }

    fn invalidate(&self, key: &DatasetKey) -> IndexResult<()> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        snapshots.remove(key);
        Ok(())
    }
}

/// One JSON file per dataset in a cache directory.
#[derive(Clone, Debug)]
pub struct DirectoryIndexCache {
    dir: PathBuf,
}

impl DirectoryIndexCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &DatasetKey) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(key.workdir().as_os_str().as_encoded_bytes());
        hasher.update(&[0]);
        hasher.update(key.dataset_dir().as_str().as_bytes());
        let name = hex::encode(&hasher.finalize().as_bytes()[..16]);
        self.dir.join(format!("{name}.json"))
    }
}

impl IndexCache for DirectoryIndexCache {
    fn load(&self, key: &DatasetKey) -> IndexResult<Option<IndexSnapshot>> {
        let file = self.file_for(key);
        let content = match fs::read(&file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                debug!(file = %file.display(), error = %e, "discarding unreadable index snapshot");
                Ok(None)
            }
        }
    }

    fn store(&self, key: &DatasetKey, snapshot: &IndexSnapshot) -> IndexResult<()> {
        fs::create_dir_all(&self.dir)?;
        let file = self.file_for(key);
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        fs::rename(&tmp, &file).map_err(|e| IndexError::Cache(format!("{}: {e}", file.display())))?;
        debug!(file = %file.display(), objects = snapshot.objects.len(), "stored index snapshot");
        Ok(())
    }

    fn invalidate(&self, key: &DatasetKey) -> IndexResult<()> {
        match fs::remove_file(self.file_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
