use std::path::Path;
use std::sync::Arc;

use quire_index::{DirectoryIndexCache, IndexEngine};
use quire_session::{BusyReporter, RepoSession, SessionRegistry, StatusStream};
use quire_store::{current_commit, walk_buffer_paths, workdir_is_valid};
use quire_sync::{
    resolve_auth, save_auth, CredentialStore, InMemoryCredentialStore, PullResult, RemoteDescription,
    SyncError,
};
use quire_types::{BufferPath, CommitHash, GitAuthentication, Operation, Progress, RepoStatus};
use tracing::{debug, info, warn};

use crate::config::QuireConfig;
use crate::error::{SdkError, SdkResult};

/// The repository worker: every operation on every working copy goes
/// through one `Quire`.
///
/// Mutating operations are serialized per working copy and run on the
/// blocking pool. Reads take no lock.
pub struct Quire {
    config: QuireConfig,
    sessions: SessionRegistry,
    index: IndexEngine,
    credentials: Arc<dyn CredentialStore>,
}

impl Quire {
    pub fn new(config: QuireConfig) -> Self {
        let mut index = IndexEngine::new(config.index.clone());
        if let Some(dir) = &config.index.cache_dir {
            index = index.with_cache(Arc::new(DirectoryIndexCache::new(dir)));
        }
        Self {
            sessions: SessionRegistry::new(config.session.clone()),
            index,
            credentials: Arc::new(InMemoryCredentialStore::new()),
            config,
        }
    }

    /// Use `store` for saved remote passwords instead of process memory.
    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    // ---- Sync operations ----

    /// Create an empty repository at `workdir` with HEAD on `default_branch`
    /// (the configured default when `None`).
    pub async fn git_init(&self, workdir: &Path, default_branch: Option<&str>) -> SdkResult<()> {
        let branch = default_branch
            .unwrap_or(self.config.remote.default_branch.as_str())
            .to_string();
        let target = workdir.to_path_buf();
        self.session(workdir)
            .run_exclusive(Operation::Init, move |_| {
                quire_sync::init(&target, &branch).map_err(SdkError::from)
            })
            .await
    }

    /// Clone `url` into `workdir`. Refuses to wait if the path is busy.
    pub async fn git_clone(
        &self,
        workdir: &Path,
        url: &str,
        auth: GitAuthentication,
        branch: Option<&str>,
    ) -> SdkResult<()> {
        let auth = self.effective_auth(url, auth);
        let (target, url, branch) = (workdir.to_path_buf(), url.to_string(), branch.map(str::to_string));
        self.session(workdir)
            .try_run_exclusive(Operation::Clone, move |reporter| {
                let on_progress = |progress: Progress| reporter.progress(progress);
                quire_sync::clone(&target, &url, &auth, branch.as_deref(), &on_progress)
                    .map_err(|e| report_sync_failure(reporter, e))
            })
            .await
    }

    /// Fast-forward the current branch from `origin` and refresh loaded
    /// datasets with whatever changed.
    pub async fn git_pull(&self, workdir: &Path, auth: GitAuthentication) -> SdkResult<PullResult> {
        let auth = self.auth_for_origin(workdir, auth).await?;
        let target = workdir.to_path_buf();
        let result = self
            .session(workdir)
            .run_exclusive(Operation::Pull, move |reporter| {
                let on_progress = |progress: Progress| reporter.progress(progress);
                quire_sync::pull(&target, &auth, &on_progress).map_err(|e| report_sync_failure(reporter, e))
            })
            .await?;

        if let (true, Some(after)) = (result.changed(), result.oid_after_pull) {
            self.refresh_datasets(workdir, result.oid_before_pull, after).await;
        }
        Ok(result)
    }

    pub async fn git_push(&self, workdir: &Path, auth: GitAuthentication) -> SdkResult<()> {
        let auth = self.auth_for_origin(workdir, auth).await?;
        let target = workdir.to_path_buf();
        self.session(workdir)
            .run_exclusive(Operation::Push, move |reporter| {
                let on_progress = |progress: Progress| reporter.progress(progress);
                quire_sync::push(&target, &auth, &on_progress).map_err(|e| report_sync_failure(reporter, e))
            })
            .await
    }

    pub async fn git_describe_remote(&self, url: &str, auth: GitAuthentication) -> SdkResult<RemoteDescription> {
        let auth = self.effective_auth(url, auth);
        let url = url.to_string();
        blocking(move || quire_sync::describe_remote(&url, &auth).map_err(SdkError::from)).await
    }

    pub async fn git_add_origin(&self, workdir: &Path, url: &str) -> SdkResult<()> {
        let (target, url) = (workdir.to_path_buf(), url.to_string());
        self.session(workdir)
            .run_exclusive(Operation::Commit, move |_| {
                quire_sync::add_origin(&target, &url).map_err(SdkError::from)
            })
            .await
    }

    pub async fn git_delete_origin(&self, workdir: &Path) -> SdkResult<()> {
        let target = workdir.to_path_buf();
        self.session(workdir)
            .run_exclusive(Operation::Commit, move |_| {
                quire_sync::delete_origin(&target).map_err(SdkError::from)
            })
            .await
    }

    /// Remove the working copy from disk. Refuses to wait if the path is
    /// busy. Datasets of the working copy are unloaded and its session is
    /// closed.
    pub async fn git_delete(&self, workdir: &Path) -> SdkResult<()> {
        let target = workdir.to_path_buf();
        self.session(workdir)
            .try_run_exclusive(Operation::Delete, move |_| {
                quire_sync::delete_working_copy(&target).map_err(SdkError::from)
            })
            .await?;

        for key in self.index.datasets_in(workdir) {
            self.index.deregister_object_specs(&key);
        }
        self.sessions.close(workdir);
        Ok(())
    }

    /// Whether `workdir` holds a usable repository.
    pub async fn git_workdir_validate(&self, workdir: &Path) -> SdkResult<bool> {
        let target = workdir.to_path_buf();
        blocking(move || Ok(workdir_is_valid(&target))).await
    }

    /// Reset tracked buffers to HEAD, everywhere or below `path_spec`.
    pub async fn git_discard_uncommitted_changes(
        &self,
        workdir: &Path,
        path_spec: Option<BufferPath>,
    ) -> SdkResult<()> {
        let (target, spec) = (workdir.to_path_buf(), path_spec.clone());
        self.session(workdir)
            .run_exclusive(Operation::Commit, move |_| {
                quire_commit::discard_uncommitted_changes(&target, spec.as_ref()).map_err(SdkError::from)
            })
            .await?;

        self.refresh_subtree(workdir, path_spec.unwrap_or_else(BufferPath::root))
            .await;
        Ok(())
    }

    /// Remember a password for `username` at the remote's host.
    pub fn git_save_credentials(&self, url: &str, username: &str, password: &str) {
        save_auth(self.credentials.as_ref(), url, username, password);
    }

    // ---- Status ----

    /// Subscribe to status changes of a working copy.
    pub fn stream_status(&self, workdir: &Path) -> SdkResult<StatusStream> {
        Ok(self.session(workdir).subscribe()?)
    }

    pub fn repo_status(&self, workdir: &Path) -> RepoStatus {
        self.session(workdir).latest_status()
    }

    /// Close every status stream and stop all indexing.
    pub fn destroy(&self) {
        self.index.shutdown();
        self.sessions.shutdown_all();
        info!("repository worker destroyed");
    }

    // ---- Accessors ----

    pub fn config(&self) -> &QuireConfig {
        &self.config
    }

    pub fn index(&self) -> &IndexEngine {
        &self.index
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ---- Internals ----

    pub(crate) fn session(&self, workdir: &Path) -> Arc<RepoSession> {
        self.sessions.get_or_create(workdir)
    }

    /// Fill in a saved password when the caller brought none.
    fn effective_auth(&self, url: &str, auth: GitAuthentication) -> GitAuthentication {
        if auth.password.is_some() {
            return auth;
        }
        let username = auth.username.clone().or_else(|| self.config.remote.username.clone());
        match username {
            Some(username) => resolve_auth(self.credentials.as_ref(), url, &username),
            None => auth,
        }
    }

    async fn auth_for_origin(&self, workdir: &Path, auth: GitAuthentication) -> SdkResult<GitAuthentication> {
        if auth.password.is_some() {
            return Ok(auth);
        }
        let target = workdir.to_path_buf();
        let origin = blocking(move || quire_sync::origin_url(&target).map_err(SdkError::from)).await?;
        Ok(match origin {
            Some(url) => self.effective_auth(&url, auth),
            None => auth,
        })
    }

    /// Update loaded datasets of `workdir` for the move from `before` to
    /// `after`. Failures are logged; the index catches up on next load.
    pub(crate) async fn refresh_datasets(&self, workdir: &Path, before: Option<CommitHash>, after: CommitHash) {
        for key in self.index.datasets_in(workdir) {
            let (target, root) = (workdir.to_path_buf(), key.dataset_dir().clone());
            let changed = blocking(move || {
                let changes = quire_diff::changed_buffers_between(&target, before.as_ref(), &after, &root, false)?;
                Ok(changes.into_keys().collect::<Vec<_>>())
            })
            .await;

            let result = match changed {
                Ok(paths) if paths.is_empty() => continue,
                Ok(paths) => {
                    debug!(dataset = %key, changed = paths.len(), "refreshing dataset");
                    self.index.refresh(&key, &paths, Some(after)).await.map_err(SdkError::from)
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(dataset = %key, error = %e, "index refresh failed");
            }
        }
    }

    /// Refresh loaded datasets for every buffer currently at or below
    /// `root`.
    async fn refresh_subtree(&self, workdir: &Path, root: BufferPath) {
        let commit = {
            let target = workdir.to_path_buf();
            blocking(move || Ok(current_commit(&target).ok())).await.ok().flatten()
        };
        for key in self.index.datasets_in(workdir) {
            let scope = if root.is_within(key.dataset_dir()) {
                root.clone()
            } else if key.dataset_dir().is_within(&root) {
                key.dataset_dir().clone()
            } else {
                continue;
            };
            let target = workdir.to_path_buf();
            let listed = blocking(move || walk_buffer_paths(&target, &scope).map_err(SdkError::from)).await;
            let result = match listed {
                Ok(paths) => self.index.refresh(&key, &paths, commit).await.map_err(SdkError::from),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(dataset = %key, error = %e, "index refresh failed");
            }
        }
    }
}

impl Default for Quire {
    fn default() -> Self {
        Self::new(QuireConfig::default())
    }
}

impl std::fmt::Debug for Quire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quire")
            .field("sessions", &self.sessions.len())
            .field("index", &self.index)
            .finish()
    }
}

/// Surface transport trouble on the status stream before failing.
fn report_sync_failure(reporter: &BusyReporter, err: SyncError) -> SdkError {
    match &err {
        SyncError::RemoteUnreachable { reason, .. } => reporter.network_error(reason.clone()),
        SyncError::RemoteAuth { .. } => reporter.awaiting_password(),
        _ => {}
    }
    err.into()
}

/// Run blocking work on the blocking pool.
pub(crate) async fn blocking<T, F>(job: F) -> SdkResult<T>
where
    F: FnOnce() -> SdkResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| SdkError::Internal(e.to_string()))?
}
