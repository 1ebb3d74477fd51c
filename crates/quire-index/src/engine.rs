//! Per-dataset object indexes.
//!
//! Registering specs for a dataset starts an asynchronous build of the
//! default index: every object any spec claims, decoded, ordered by object
//! path. Filtered indexes are ordered subsequences of the default index,
//! chosen and sorted by expressions and built once the default index is
//! done. Builds yield between batches and stop early when the dataset's
//! indexing is stopped, leaving what they have queryable and incomplete.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use quire_store::{current_commit, BufferReader, WorkingTree};
use quire_types::{BufferChange, BufferChangeset, BufferPath, CommitHash, IndexStatus, Progress};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{IndexCache, IndexSnapshot};
use crate::error::{IndexError, IndexResult};
use crate::expr::{compare_values, Expression, Scope};
use crate::spec::{ObjectBuffers, ObjectChangeset, ObjectSpec};

/// Id of the unfiltered index of every dataset.
pub const DEFAULT_INDEX_ID: &str = "default";

/// Identifies a dataset: a directory inside a working copy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    workdir: PathBuf,
    dataset_dir: BufferPath,
}

impl DatasetKey {
    pub fn new(workdir: impl Into<PathBuf>, dataset_dir: BufferPath) -> Self {
        Self {
            workdir: workdir.into(),
            dataset_dir,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn dataset_dir(&self) -> &BufferPath {
        &self.dataset_dir
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workdir.display(), self.dataset_dir)
    }
}

/// Id of the filtered index for a query and optional sort key.
///
/// The same expressions always yield the same id.
pub fn index_id(query: &str, sort_key: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(&[0]);
    if let Some(key) = sort_key {
        hasher.update(&[1]);
        hasher.update(key.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Objects processed between status updates and yields.
    pub progress_interval: usize,
    /// Where default-index snapshots are kept across restarts.
    pub cache_dir: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            progress_interval: 100,
            cache_dir: None,
        }
    }
}

/// Current state of an index plus a stream of future states.
#[derive(Debug)]
pub struct IndexDescription {
    pub id: String,
    pub query: Option<String>,
    pub sort_key: Option<String>,
    pub status: IndexStatus,
    pub stream: watch::Receiver<IndexStatus>,
}

// ---------------------------------------------------------------------------
// Index state
// ---------------------------------------------------------------------------

struct IndexState {
    id: String,
    query: Option<Expression>,
    sort_key: Option<Expression>,
    paths: RwLock<Vec<BufferPath>>,
    /// Number of the latest build; only that build may publish.
    build: Mutex<u64>,
    status: watch::Sender<IndexStatus>,
    finished: watch::Sender<bool>,
}

impl IndexState {
    fn new(id: String, query: Option<Expression>, sort_key: Option<Expression>) -> Self {
        Self {
            id,
            query,
            sort_key,
            paths: RwLock::new(Vec::new()),
            build: Mutex::new(0),
            status: watch::channel(IndexStatus::default()).0,
            finished: watch::channel(false).0,
        }
    }

    /// Start a new build, superseding any running one. Returns its number.
    fn begin(&self) -> u64 {
        let mut build = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        *build += 1;
        self.finished.send_replace(false);
        let object_count = self.len();
        self.status.send_replace(IndexStatus {
            object_count,
            progress: Some(Progress::new("indexing", 0, None)),
            complete: false,
        });
        *build
    }

    fn is_superseded(&self, build: u64) -> bool {
        *self.build.lock().unwrap_or_else(PoisonError::into_inner) != build
    }

    fn progress(&self, build: u64, loaded: usize, total: usize) {
        let current = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != build {
            return;
        }
        let object_count = self.len();
        self.status.send_replace(IndexStatus {
            object_count,
            progress: Some(Progress::new("indexing", loaded as u64, Some(total as u64))),
            complete: false,
        });
    }

    /// Publish the result of `build`. Returns `false`, publishing nothing,
    /// when a newer build has begun.
    fn finish(&self, build: u64, paths: Vec<BufferPath>, complete: bool) -> bool {
        let current = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != build {
            return false;
        }
        self.publish(paths, complete);
        true
    }

    /// Publish new contents outside of a build.
    fn replace(&self, paths: Vec<BufferPath>, complete: bool) {
        let _current = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(paths, complete);
    }

    fn publish(&self, paths: Vec<BufferPath>, complete: bool) {
        let object_count = paths.len();
        *self.paths.write().unwrap_or_else(PoisonError::into_inner) = paths;
        self.status.send_replace(IndexStatus {
            object_count,
            progress: None,
            complete,
        });
        self.finished.send_replace(true);
    }

    async fn wait_finished(&self) {
        let mut finished = self.finished.subscribe();
        while !*finished.borrow_and_update() {
            if finished.changed().await.is_err() {
                return;
            }
        }
    }

    fn len(&self) -> usize {
        self.paths.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn is_complete(&self) -> bool {
        self.status.borrow().complete
    }

    fn describe(&self) -> IndexDescription {
        IndexDescription {
            id: self.id.clone(),
            query: self.query.as_ref().map(|q| q.source().to_string()),
            sort_key: self.sort_key.as_ref().map(|k| k.source().to_string()),
            status: self.status.borrow().clone(),
            stream: self.status.subscribe(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Objects grouped for decoding: object path, spec index, buffer paths.
type ObjectGroup = (BufferPath, usize, Vec<BufferPath>);

struct Dataset {
    key: DatasetKey,
    specs: Vec<Arc<dyn ObjectSpec>>,
    reader: Arc<dyn BufferReader>,
    objects: RwLock<BTreeMap<BufferPath, Arc<Value>>>,
    default: Arc<IndexState>,
    filtered: Mutex<HashMap<String, Arc<IndexState>>>,
    generation: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    progress_interval: usize,
}

impl Dataset {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_stopped(&self, generation: u64) -> bool {
        self.generation() != generation
    }

    /// Make every running build stop at its next checkpoint.
    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn state(&self, id: Option<&str>) -> IndexResult<Arc<IndexState>> {
        match id {
            None | Some(DEFAULT_INDEX_ID) => Ok(Arc::clone(&self.default)),
            Some(id) => self
                .filtered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(id)
                .cloned()
                .ok_or_else(|| IndexError::UnknownIndex(id.to_string())),
        }
    }

    fn absolute(&self, relative: &BufferPath) -> IndexResult<BufferPath> {
        self.key
            .dataset_dir
            .join(relative.as_str())
            .map_err(|e| IndexError::Store(e.into()))
    }

    /// The first spec claiming `object` as an object path.
    fn spec_for(&self, object: &BufferPath) -> Option<&Arc<dyn ObjectSpec>> {
        self.specs
            .iter()
            .find(|spec| spec.object_path_for(object).as_ref() == Some(object))
    }

    fn relative(&self, absolute: &BufferPath) -> Option<BufferPath> {
        absolute
            .strip_root(&self.key.dataset_dir)
            .and_then(|rest| BufferPath::parse_root(rest).ok())
    }

    /// Group dataset buffers (full paths) by the object they belong to. The
    /// first spec claiming a buffer wins.
    fn group_objects(&self, buffers: &[BufferPath]) -> BTreeMap<BufferPath, (usize, Vec<BufferPath>)> {
        let mut groups: BTreeMap<BufferPath, (usize, Vec<BufferPath>)> = BTreeMap::new();
        for buffer in buffers {
            let Some(relative) = self.relative(buffer) else {
                continue;
            };
            let claimed = self
                .specs
                .iter()
                .enumerate()
                .find_map(|(i, spec)| spec.object_path_for(&relative).map(|object| (i, object)));
            if let Some((spec, object)) = claimed {
                groups.entry(object).or_insert_with(|| (spec, Vec::new())).1.push(relative);
            }
        }
        groups
    }

    fn decode(&self, spec: usize, object: &BufferPath, buffers: &[BufferPath]) -> IndexResult<Value> {
        let mut contents = ObjectBuffers::new();
        for buffer in buffers {
            let Some(content) = self.reader.read(&self.absolute(buffer)?)? else {
                continue;
            };
            let key = buffer
                .strip_root(object)
                .and_then(|rest| BufferPath::parse_root(rest).ok())
                .unwrap_or_else(|| buffer.clone());
            contents.insert(key, content);
        }
        self.specs[spec].decode(object, &contents)
    }

    /// Decode `object` from current buffers. `None` if no spec claims any
    /// buffer at that path.
    fn load_object(&self, object: &BufferPath) -> IndexResult<Option<Value>> {
        let listing = self.reader.list_paths(&self.absolute(object)?)?;
        let mut groups = self.group_objects(&listing);
        match groups.remove(object) {
            Some((spec, buffers)) => self.decode(spec, object, &buffers).map(Some),
            None => Ok(None),
        }
    }

    /// Objects affected by changes to `buffers` (full paths), freshly
    /// decoded. `None` marks an object that no longer exists or no longer
    /// decodes.
    fn reload(&self, buffers: &[BufferPath]) -> IndexResult<Vec<(BufferPath, Option<Value>)>> {
        let mut affected = BTreeSet::new();
        for buffer in buffers {
            let Some(relative) = self.relative(buffer) else {
                continue;
            };
            affected.extend(self.specs.iter().filter_map(|spec| spec.object_path_for(&relative)));
        }

        let mut reloaded = Vec::with_capacity(affected.len());
        for object in affected {
            let value = match self.load_object(&object) {
                Ok(value) => value,
                Err(e @ (IndexError::Decode { .. } | IndexError::Json(_))) => {
                    warn!(dataset = %self.key, object = %object, error = %e, "dropping object that no longer decodes");
                    None
                }
                Err(e) => return Err(e),
            };
            reloaded.push((object, value));
        }
        Ok(reloaded)
    }

    fn snapshot(&self, commit: CommitHash) -> IndexSnapshot {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        IndexSnapshot {
            commit,
            objects: objects.iter().map(|(path, value)| (path.clone(), (**value).clone())).collect(),
        }
    }

    fn install(&self, build: u64, objects: BTreeMap<BufferPath, Arc<Value>>, complete: bool) {
        let paths: Vec<BufferPath> = objects.keys().cloned().collect();
        *self.objects.write().unwrap_or_else(PoisonError::into_inner) = objects;
        self.default.finish(build, paths, complete);
    }

    async fn build_default(self: Arc<Self>, generation: u64, build: u64, cache: Option<(Arc<dyn IndexCache>, CommitHash)>) {
        if let Some((cache, commit)) = &cache {
            match cache.load(&self.key) {
                Ok(Some(snapshot)) if snapshot.commit == *commit => {
                    let objects = snapshot
                        .objects
                        .into_iter()
                        .map(|(path, value)| (path, Arc::new(value)))
                        .collect::<BTreeMap<_, _>>();
                    info!(dataset = %self.key, objects = objects.len(), commit = %commit.short_hex(), "restored default index from cache");
                    self.install(build, objects, true);
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!(dataset = %self.key, error = %e, "index cache unavailable"),
            }
        }

        let listing = {
            let dataset = Arc::clone(&self);
            tokio::task::spawn_blocking(move || dataset.reader.list_paths(&dataset.key.dataset_dir)).await
        };
        let listing = match listing {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                warn!(dataset = %self.key, error = %e, "failed to list dataset buffers");
                self.install(build, BTreeMap::new(), false);
                return;
            }
            Err(e) => {
                warn!(dataset = %self.key, error = %e, "listing task failed");
                self.install(build, BTreeMap::new(), false);
                return;
            }
        };

        let groups: Vec<ObjectGroup> = self
            .group_objects(&listing)
            .into_iter()
            .map(|(object, (spec, buffers))| (object, spec, buffers))
            .collect();
        let total = groups.len();
        debug!(dataset = %self.key, objects = total, "building default index");

        let mut objects = BTreeMap::new();
        let mut processed = 0;
        for batch in groups.chunks(self.progress_interval.max(1)) {
            if self.is_stopped(generation) {
                info!(dataset = %self.key, processed, total, "default index build stopped");
                self.install(build, objects, false);
                return;
            }

            let dataset = Arc::clone(&self);
            let batch = batch.to_vec();
            let decoded = tokio::task::spawn_blocking(move || {
                batch
                    .into_iter()
                    .map(|(object, spec, buffers)| {
                        let value = dataset.decode(spec, &object, &buffers);
                        (object, value)
                    })
                    .collect::<Vec<_>>()
            })
            .await;

            let decoded = match decoded {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(dataset = %self.key, error = %e, "decode task failed");
                    self.install(build, objects, false);
                    return;
                }
            };
            processed += decoded.len();
            for (object, value) in decoded {
                match value {
                    Ok(value) => {
                        objects.insert(object, Arc::new(value));
                    }
                    Err(e) => warn!(dataset = %self.key, object = %object, error = %e, "skipping object"),
                }
            }
            self.default.progress(build, processed, total);
            tokio::task::yield_now().await;
        }

        info!(dataset = %self.key, objects = objects.len(), "default index built");

        if let Some((cache, commit)) = cache {
            let snapshot = IndexSnapshot {
                commit,
                objects: objects.iter().map(|(path, value)| (path.clone(), (**value).clone())).collect(),
            };
            let key = self.key.clone();
            let stored = tokio::task::spawn_blocking(move || cache.store(&key, &snapshot)).await;
            if let Ok(Err(e)) = stored {
                warn!(dataset = %self.key, error = %e, "failed to store index snapshot");
            }
        }
        self.install(build, objects, true);
    }

    async fn build_filtered(self: Arc<Self>, state: Arc<IndexState>, generation: u64, build: u64) {
        self.default.wait_finished().await;

        let Some(query) = state.query.as_ref() else {
            state.finish(build, Vec::new(), false);
            return;
        };
        let snapshot: Vec<(BufferPath, Arc<Value>)> = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(path, value)| (path.clone(), Arc::clone(value)))
            .collect();
        let total = snapshot.len();
        let interval = self.progress_interval.max(1);

        let mut matched: Vec<(BufferPath, Option<Value>)> = Vec::new();
        let mut complete = true;
        for (i, (path, value)) in snapshot.iter().enumerate() {
            if i > 0 && i % interval == 0 {
                if state.is_superseded(build) {
                    debug!(index = %state.id, "filtered build superseded");
                    return;
                }
                if self.is_stopped(generation) {
                    complete = false;
                    break;
                }
                state.progress(build, i, total);
                tokio::task::yield_now().await;
            }

            let obj_path = format!("/{path}");
            let scope = Scope {
                obj: value,
                obj_path: &obj_path,
            };
            match query.matches(&scope) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    let err = IndexError::Evaluation {
                        path: path.clone(),
                        reason: e.to_string(),
                    };
                    warn!(index = %state.id, error = %err, "query failed, excluding object");
                    continue;
                }
            }

            let key = match state.sort_key.as_ref().map(|key| key.evaluate(&scope)) {
                None => None,
                Some(Ok(key)) => Some(key),
                Some(Err(e)) => {
                    let err = IndexError::Evaluation {
                        path: path.clone(),
                        reason: e.to_string(),
                    };
                    warn!(index = %state.id, error = %err, "sort key failed, excluding object");
                    continue;
                }
            };
            matched.push((path.clone(), key));
        }

        if state.sort_key.is_some() {
            matched.sort_by(|(_, a), (_, b)| match (a, b) {
                (Some(a), Some(b)) => compare_values(a, b),
                _ => std::cmp::Ordering::Equal,
            });
        }

        let paths = matched.into_iter().map(|(path, _)| path).collect();
        if state.finish(build, paths, complete) {
            debug!(index = %state.id, total, complete, "filtered index built");
        } else {
            debug!(index = %state.id, "filtered build superseded");
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Object indexes for every loaded dataset.
///
/// Methods that start builds spawn tokio tasks and must be called from
/// within a runtime.
pub struct IndexEngine {
    config: IndexConfig,
    cache: Option<Arc<dyn IndexCache>>,
    datasets: RwLock<HashMap<DatasetKey, Arc<Dataset>>>,
}

impl IndexEngine {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            cache: None,
            datasets: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn IndexCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Load a dataset of a working copy and start building its default
    /// index. Replaces any earlier registration of the same dataset.
    pub async fn register_object_specs(
        &self,
        workdir: &Path,
        dataset_dir: BufferPath,
        specs: Vec<Arc<dyn ObjectSpec>>,
    ) -> DatasetKey {
        let key = DatasetKey::new(workdir, dataset_dir);
        let commit = {
            let workdir = workdir.to_path_buf();
            tokio::task::spawn_blocking(move || current_commit(&workdir).ok())
                .await
                .ok()
                .flatten()
        };
        self.register_with_reader(key.clone(), specs, Arc::new(WorkingTree::new(workdir)), commit);
        key
    }

    /// Register a dataset backed by any [`BufferReader`]. `commit` tags
    /// the cached snapshot; without it the cache is bypassed.
    pub fn register_with_reader(
        &self,
        key: DatasetKey,
        specs: Vec<Arc<dyn ObjectSpec>>,
        reader: Arc<dyn BufferReader>,
        commit: Option<CommitHash>,
    ) {
        self.deregister_object_specs(&key);

        let dataset = Arc::new(Dataset {
            key: key.clone(),
            specs,
            reader,
            objects: RwLock::new(BTreeMap::new()),
            default: Arc::new(IndexState::new(DEFAULT_INDEX_ID.to_string(), None, None)),
            filtered: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
            progress_interval: self.config.progress_interval,
        });
        self.datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::clone(&dataset));

        let cache = self.cache.clone().zip(commit);
        let generation = dataset.generation();
        let build = dataset.default.begin();
        let task = tokio::spawn(Arc::clone(&dataset).build_default(generation, build, cache));
        dataset.track(task);
        info!(dataset = %key, specs = dataset.specs.len(), "registered object specs");
    }

    /// Stop indexing and drop all index state of a dataset.
    pub fn deregister_object_specs(&self, key: &DatasetKey) -> bool {
        let removed = self
            .datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(dataset) => {
                dataset.stop();
                dataset.abort_tasks();
                info!(dataset = %key, "deregistered object specs");
                true
            }
            None => false,
        }
    }

    /// Cancel running builds. Their indexes keep what they had and report
    /// incomplete.
    pub fn stop_indexing(&self, key: &DatasetKey) -> IndexResult<()> {
        let dataset = self.dataset(key)?;
        dataset.stop();
        info!(dataset = %key, "stopped indexing");
        Ok(())
    }

    /// Datasets registered for a working copy.
    pub fn datasets_in(&self, workdir: &Path) -> Vec<DatasetKey> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|key| key.workdir == workdir)
            .cloned()
            .collect()
    }

    /// Id of the index selecting objects for which `query` is truthy,
    /// ordered by `sort_key` if given. Starts a build on first request.
    pub fn get_or_create_filtered_index(
        &self,
        key: &DatasetKey,
        query: &str,
        sort_key: Option<&str>,
    ) -> IndexResult<String> {
        let dataset = self.dataset(key)?;
        let id = index_id(query, sort_key);

        let state = {
            let mut filtered = dataset.filtered.lock().unwrap_or_else(PoisonError::into_inner);
            if filtered.contains_key(&id) {
                return Ok(id);
            }
            let query = Expression::parse(query)?;
            let sort_key = sort_key.map(Expression::parse).transpose()?;
            let state = Arc::new(IndexState::new(id.clone(), Some(query), sort_key));
            filtered.insert(id.clone(), Arc::clone(&state));
            state
        };

        let generation = dataset.generation();
        let build = state.begin();
        let task = tokio::spawn(Arc::clone(&dataset).build_filtered(state, generation, build));
        dataset.track(task);
        debug!(dataset = %key, index = %id, "created filtered index");
        Ok(id)
    }

    /// Status and status stream of an index; `None` is the default index.
    pub fn describe_index(&self, key: &DatasetKey, id: Option<&str>) -> IndexResult<IndexDescription> {
        Ok(self.dataset(key)?.state(id)?.describe())
    }

    /// Wait until the current build of an index has finished or stopped.
    pub async fn wait_for_index(&self, key: &DatasetKey, id: Option<&str>) -> IndexResult<IndexStatus> {
        let state = self.dataset(key)?.state(id)?;
        state.wait_finished().await;
        let status = state.status.borrow().clone();
        Ok(status)
    }

    pub fn get_object_at_position(
        &self,
        key: &DatasetKey,
        id: Option<&str>,
        position: usize,
    ) -> IndexResult<Option<BufferPath>> {
        let state = self.dataset(key)?.state(id)?;
        let paths = state.paths.read().unwrap_or_else(PoisonError::into_inner);
        Ok(paths.get(position).cloned())
    }

    pub fn locate_position_of_path(
        &self,
        key: &DatasetKey,
        id: Option<&str>,
        path: &BufferPath,
    ) -> IndexResult<Option<usize>> {
        let state = self.dataset(key)?.state(id)?;
        let paths = state.paths.read().unwrap_or_else(PoisonError::into_inner);
        let position = if state.query.is_none() {
            paths.binary_search(path).ok()
        } else {
            paths.iter().position(|p| p == path)
        };
        Ok(position)
    }

    pub fn count_objects(&self, key: &DatasetKey, id: Option<&str>) -> IndexResult<usize> {
        Ok(self.dataset(key)?.state(id)?.len())
    }

    /// Decode objects from current buffers. Paths no spec claims, and
    /// objects that fail to decode, map to `None`.
    pub async fn read_objects(
        &self,
        key: &DatasetKey,
        paths: &[BufferPath],
    ) -> IndexResult<BTreeMap<BufferPath, Option<Value>>> {
        let dataset = self.dataset(key)?;
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut objects = BTreeMap::new();
            for path in paths {
                let value = match dataset.load_object(&path) {
                    Ok(value) => value,
                    Err(e @ (IndexError::Decode { .. } | IndexError::Json(_))) => {
                        warn!(dataset = %dataset.key, object = %path, error = %e, "object does not decode");
                        None
                    }
                    Err(e) => return Err(e),
                };
                objects.insert(path, value);
            }
            Ok(objects)
        })
        .await
        .map_err(|e| IndexError::Join(e.to_string()))?
    }

    /// Buffer changes (full paths) that turn each object from its old value
    /// into its new one. Both values go through the claiming spec's
    /// encoder, so expected buffers are compared against what that encoder
    /// writes.
    pub fn encode_object_changes(
        &self,
        key: &DatasetKey,
        changes: &ObjectChangeset,
    ) -> IndexResult<BufferChangeset> {
        let dataset = self.dataset(key)?;
        let mut changeset = BufferChangeset::new();
        for (object, change) in changes {
            let spec = dataset
                .spec_for(object)
                .ok_or_else(|| IndexError::Unclaimed(object.clone()))?;
            let encode = |value: &Option<Value>| match value {
                Some(value) => spec.encode(object, value),
                None => Ok(ObjectBuffers::new()),
            };
            let old = encode(&change.old_value)?;
            let new = encode(&change.new_value)?;

            let buffers: BTreeSet<&BufferPath> = old.keys().chain(new.keys()).collect();
            for buffer in buffers {
                let relative = object
                    .join(buffer.as_str())
                    .map_err(|e| IndexError::Store(e.into()))?;
                changeset.insert(
                    dataset.absolute(&relative)?,
                    BufferChange {
                        old_value: old.get(buffer).cloned().into(),
                        new_value: new.get(buffer).cloned(),
                        encoding: None,
                    },
                );
            }
        }
        debug!(dataset = %key, objects = changes.len(), buffers = changeset.len(), "encoded object changes");
        Ok(changeset)
    }

    /// Update the default index for changed buffers (full paths) and
    /// rebuild every filtered index. With `commit`, the refreshed default
    /// index is cached under it.
    pub async fn refresh(
        &self,
        key: &DatasetKey,
        changed: &[BufferPath],
        commit: Option<CommitHash>,
    ) -> IndexResult<()> {
        let dataset = self.dataset(key)?;
        dataset.default.wait_finished().await;

        let reloaded = {
            let dataset = Arc::clone(&dataset);
            let changed = changed.to_vec();
            tokio::task::spawn_blocking(move || dataset.reload(&changed))
                .await
                .map_err(|e| IndexError::Join(e.to_string()))??
        };
        if reloaded.is_empty() {
            return Ok(());
        }

        let complete = dataset.default.is_complete();
        let paths = {
            let mut objects = dataset.objects.write().unwrap_or_else(PoisonError::into_inner);
            for (object, value) in &reloaded {
                match value {
                    Some(value) => {
                        objects.insert(object.clone(), Arc::new(value.clone()));
                    }
                    None => {
                        objects.remove(object);
                    }
                }
            }
            objects.keys().cloned().collect::<Vec<_>>()
        };
        dataset.default.replace(paths, complete);

        let filtered: Vec<Arc<IndexState>> = dataset
            .filtered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let generation = dataset.generation();
        for state in filtered {
            let build = state.begin();
            let task = tokio::spawn(Arc::clone(&dataset).build_filtered(state, generation, build));
            dataset.track(task);
        }
        info!(dataset = %key, objects = reloaded.len(), "refreshed index");

        if let (Some(cache), Some(commit), true) = (self.cache.clone(), commit, complete) {
            let snapshot = dataset.snapshot(commit);
            let key = key.clone();
            tokio::task::spawn_blocking(move || cache.store(&key, &snapshot))
                .await
                .map_err(|e| IndexError::Join(e.to_string()))??;
        }
        Ok(())
    }

    /// Stop and drop every dataset.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<Dataset>> = self
            .datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, dataset)| dataset)
            .collect();
        for dataset in &drained {
            dataset.stop();
            dataset.abort_tasks();
        }
        debug!(datasets = drained.len(), "index engine shut down");
    }

    fn dataset(&self, key: &DatasetKey) -> IndexResult<Arc<Dataset>> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| IndexError::NotRegistered(key.clone()))
    }
}

impl Default for IndexEngine {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("IndexEngine")
            .field("datasets", &datasets)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
