//! Buffer reads from the working tree on disk.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use quire_types::{BufferDataset, BufferPath};
use tracing::debug;

use crate::error::StoreResult;
use crate::listing::walk_buffer_paths;
use crate::traits::BufferReader;

/// Read exactly `paths` from the working tree. Missing buffers are `None`.
pub fn read_buffers(workdir: &Path, paths: &[BufferPath]) -> StoreResult<BufferDataset> {
    WorkingTree::new(workdir).read_batch(paths)
}

/// Read every buffer at or below `root` from the working tree.
pub fn read_tree(workdir: &Path, root: &BufferPath) -> StoreResult<BTreeMap<BufferPath, Bytes>> {
    WorkingTree::new(workdir).read_tree(root)
}

/// [`BufferReader`] over a working copy directory.
#[derive(Clone, Debug)]
pub struct WorkingTree {
    workdir: PathBuf,
}

impl WorkingTree {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

impl BufferReader for WorkingTree {
    fn read(&self, path: &BufferPath) -> StoreResult<Option<Bytes>> {
        let full = path.to_fs_path(&self.workdir);
        match std::fs::read(&full) {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound) => Ok(None),
            // Directories are not buffers.
            Err(_) if full.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_tree(&self, root: &BufferPath) -> StoreResult<BTreeMap<BufferPath, Bytes>> {
        let mut buffers = BTreeMap::new();
        for path in walk_buffer_paths(&self.workdir, root)? {
            if let Some(content) = self.read(&path)? {
                buffers.insert(path, content);
            }
        }
        debug!(root = %root, count = buffers.len(), "read working tree");
        Ok(buffers)
    }

    fn list_paths(&self, root: &BufferPath) -> StoreResult<Vec<BufferPath>> {
        walk_buffer_paths(&self.workdir, root)
    }
}
