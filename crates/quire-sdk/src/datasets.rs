//! Datasets: object specs over a directory and the indexes built on them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use quire_index::{DatasetKey, IndexDescription, ObjectChangeset, ObjectSpec};
use quire_types::{Author, BufferPath, CommitOutcome, IndexStatus};
use serde_json::Value;

use crate::error::SdkResult;
use crate::repository::Quire;

impl Quire {
    /// Load `dataset_dir` of a working copy with `specs` and start building
    /// its default index.
    pub async fn ds_load(
        &self,
        workdir: &Path,
        dataset_dir: BufferPath,
        specs: Vec<Arc<dyn ObjectSpec>>,
    ) -> SdkResult<DatasetKey> {
        Ok(self.index().register_object_specs(workdir, dataset_dir, specs).await)
    }

    /// Drop a dataset's index state. Returns `false` if it was not loaded.
    pub fn ds_unload(&self, dataset: &DatasetKey) -> bool {
        self.index().deregister_object_specs(dataset)
    }

    pub fn ds_stop_indexing(&self, dataset: &DatasetKey) -> SdkResult<()> {
        Ok(self.index().stop_indexing(dataset)?)
    }

    pub fn ds_index_get_or_create(
        &self,
        dataset: &DatasetKey,
        query: &str,
        sort_key: Option<&str>,
    ) -> SdkResult<String> {
        Ok(self.index().get_or_create_filtered_index(dataset, query, sort_key)?)
    }

    pub fn ds_index_describe(&self, dataset: &DatasetKey, index_id: Option<&str>) -> SdkResult<IndexDescription> {
        Ok(self.index().describe_index(dataset, index_id)?)
    }

    /// Wait for the current build of an index to finish or stop.
    pub async fn ds_index_wait(&self, dataset: &DatasetKey, index_id: Option<&str>) -> SdkResult<IndexStatus> {
        Ok(self.index().wait_for_index(dataset, index_id).await?)
    }

    pub fn ds_index_get_object(
        &self,
        dataset: &DatasetKey,
        index_id: Option<&str>,
        position: usize,
    ) -> SdkResult<Option<BufferPath>> {
        Ok(self.index().get_object_at_position(dataset, index_id, position)?)
    }

    pub fn ds_index_locate_position(
        &self,
        dataset: &DatasetKey,
        index_id: Option<&str>,
        path: &BufferPath,
    ) -> SdkResult<Option<usize>> {
        Ok(self.index().locate_position_of_path(dataset, index_id, path)?)
    }

    pub fn ds_index_count_objects(&self, dataset: &DatasetKey, index_id: Option<&str>) -> SdkResult<usize> {
        Ok(self.index().count_objects(dataset, index_id)?)
    }

    /// Decode objects from current buffers; paths relative to the dataset.
    pub async fn ds_read_objects(
        &self,
        dataset: &DatasetKey,
        paths: &[BufferPath],
    ) -> SdkResult<BTreeMap<BufferPath, Option<Value>>> {
        Ok(self.index().read_objects(dataset, paths).await?)
    }

    /// Commit object-level changes: each object's old and new value are
    /// encoded into buffers by the dataset's spec and go through the same
    /// conflict check as [`Quire::repo_update_buffers`]. Conflicts name
    /// buffer paths.
    pub async fn ds_update_objects(
        &self,
        dataset: &DatasetKey,
        author: Author,
        message: &str,
        changes: ObjectChangeset,
        skip_validation: bool,
    ) -> SdkResult<CommitOutcome> {
        let changeset = self.index().encode_object_changes(dataset, &changes)?;
        self.repo_update_buffers(dataset.workdir(), author, message, changeset, skip_validation)
            .await
    }
}
