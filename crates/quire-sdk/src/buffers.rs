//! Buffer reads, listings and commits on a working copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use quire_commit::CommitRequest;
use quire_diff::ChangeSet;
use quire_store::HttpLfsResolver;
use quire_sync::SyncError;
use quire_types::{
    Author, BufferChangeset, BufferDataset, BufferPath, CommitHash, CommitOutcome, GitAuthentication,
    Operation,
};
use tracing::debug;

use crate::error::{SdkError, SdkResult};
use crate::repository::{blocking, Quire};

impl Quire {
    // ---- Commits ----

    /// Apply `changeset` as one commit if every expected value still holds.
    ///
    /// Conflicts come back in the outcome, not as an error, and leave the
    /// working copy untouched.
    pub async fn repo_update_buffers(
        &self,
        workdir: &Path,
        author: Author,
        message: &str,
        changeset: BufferChangeset,
        skip_validation: bool,
    ) -> SdkResult<CommitOutcome> {
        let mut request = CommitRequest::new(author, message, changeset);
        if skip_validation {
            request = request.skip_validation();
        }
        self.commit_with(workdir, move |target| quire_commit::update_buffers(target, &request))
            .await
    }

    /// Copy files from the filesystem into buffers, keyed by absolute source
    /// path.
    pub async fn repo_add_external_buffers(
        &self,
        workdir: &Path,
        author: Author,
        message: &str,
        sources: BTreeMap<PathBuf, BufferPath>,
    ) -> SdkResult<CommitOutcome> {
        let message = message.to_string();
        self.commit_with(workdir, move |target| {
            quire_commit::add_external_buffers(target, &sources, &author, &message)
        })
        .await
    }

    pub async fn repo_delete_tree(
        &self,
        workdir: &Path,
        author: Author,
        message: &str,
        root: BufferPath,
    ) -> SdkResult<CommitOutcome> {
        let message = message.to_string();
        self.commit_with(workdir, move |target| {
            quire_commit::delete_tree(target, &root, &author, &message)
        })
        .await
    }

    pub async fn repo_move_tree(
        &self,
        workdir: &Path,
        author: Author,
        message: &str,
        old_root: BufferPath,
        new_root: BufferPath,
    ) -> SdkResult<CommitOutcome> {
        let message = message.to_string();
        self.commit_with(workdir, move |target| {
            quire_commit::move_tree(target, &old_root, &new_root, &author, &message)
        })
        .await
    }

    /// Commit every working-tree change not yet committed.
    pub async fn repo_commit_outstanding_changes(
        &self,
        workdir: &Path,
        author: Author,
        message: &str,
    ) -> SdkResult<CommitOutcome> {
        let message = message.to_string();
        self.commit_with(workdir, move |target| {
            quire_commit::commit_outstanding_changes(target, &author, &message)
        })
        .await
    }

    /// Run a commit job under the session lock and refresh loaded datasets
    /// if it produced a commit.
    async fn commit_with<F>(&self, workdir: &Path, job: F) -> SdkResult<CommitOutcome>
    where
        F: FnOnce(&Path) -> quire_commit::CommitResult<CommitOutcome> + Send + 'static,
    {
        let target = workdir.to_path_buf();
        let (before, outcome) = self
            .session(workdir)
            .run_exclusive(Operation::Commit, move |_| {
                let before = quire_store::current_commit(&target).ok();
                let outcome = job(&target)?;
                Ok::<_, SdkError>((before, outcome))
            })
            .await?;

        if let Some(after) = outcome.new_commit_hash {
            self.refresh_datasets(workdir, before, after).await;
        }
        Ok(outcome)
    }

    // ---- Reads ----

    /// Every buffer at or below `root`.
    ///
    /// With `lfs`, Git LFS pointers are replaced by their content, fetched
    /// from the `origin` remote with those credentials.
    pub async fn repo_read_buffers(
        &self,
        workdir: &Path,
        root: BufferPath,
        lfs: Option<GitAuthentication>,
    ) -> SdkResult<BTreeMap<BufferPath, Bytes>> {
        let target = workdir.to_path_buf();
        let wants_origin = lfs.is_some();
        let (buffers, origin) = blocking(move || {
            let buffers = quire_store::read_tree(&target, &root)?;
            let origin = if wants_origin {
                quire_sync::origin_url(&target)?
            } else {
                None
            };
            Ok((buffers, origin))
        })
        .await?;

        let Some(auth) = lfs else {
            return Ok(buffers);
        };
        let origin = origin.ok_or(SdkError::Sync(SyncError::NoOrigin))?;
        let resolver = HttpLfsResolver::for_remote(&origin, auth);
        debug!(workdir = %workdir.display(), endpoint = resolver.endpoint(), "resolving LFS pointers");
        Ok(quire_store::resolve_lfs_pointers(buffers, &resolver).await)
    }

    /// Every buffer at or below `root` as of `commit`.
    pub async fn repo_read_buffers_at_version(
        &self,
        workdir: &Path,
        root: BufferPath,
        commit: CommitHash,
    ) -> SdkResult<BTreeMap<BufferPath, Bytes>> {
        let target = workdir.to_path_buf();
        blocking(move || Ok(quire_store::read_tree_at_revision(&target, &commit, &root)?)).await
    }

    /// Current content of exactly `paths`; absent buffers map to `None`.
    pub async fn repo_get_buffer_dataset(
        &self,
        workdir: &Path,
        paths: Vec<BufferPath>,
    ) -> SdkResult<BufferDataset> {
        let target = workdir.to_path_buf();
        blocking(move || Ok(quire_store::read_buffers(&target, &paths)?)).await
    }

    pub async fn repo_get_current_commit(&self, workdir: &Path) -> SdkResult<CommitHash> {
        let target = workdir.to_path_buf();
        blocking(move || Ok(quire_store::current_commit(&target)?)).await
    }

    /// The candidate authored most recently, judged by HEAD's history.
    pub async fn repo_choose_most_recent_commit(
        &self,
        workdir: &Path,
        candidates: Vec<CommitHash>,
    ) -> SdkResult<CommitHash> {
        if candidates.is_empty() {
            return Err(SdkError::InvalidOperation("no candidate commits given".into()));
        }
        let target = workdir.to_path_buf();
        blocking(move || Ok(quire_store::choose_most_recent_commit(&target, &candidates)?)).await
    }

    /// Buffers at or below `root` that changed from `before` to `after`.
    /// Without `before`, everything in `after` counts as added.
    pub async fn repo_resolve_changes(
        &self,
        workdir: &Path,
        root: BufferPath,
        before: Option<CommitHash>,
        after: CommitHash,
    ) -> SdkResult<ChangeSet> {
        let target = workdir.to_path_buf();
        blocking(move || {
            Ok(quire_diff::changed_buffers_between(&target, before.as_ref(), &after, &root, false)?)
        })
        .await
    }

    // ---- Listings ----

    /// Immediate children of `prefix`, optionally only files containing
    /// `content_substring`.
    pub async fn repo_list_directory(
        &self,
        workdir: &Path,
        prefix: BufferPath,
        content_substring: Option<String>,
    ) -> SdkResult<Vec<BufferPath>> {
        let target = workdir.to_path_buf();
        blocking(move || {
            Ok(quire_store::list_directory(&target, &prefix, content_substring.as_deref())?)
        })
        .await
    }

    pub async fn repo_list_all_buffer_paths(&self, workdir: &Path) -> SdkResult<Vec<BufferPath>> {
        let target = workdir.to_path_buf();
        blocking(move || Ok(quire_store::list_all_buffer_paths(&target)?)).await
    }

    /// Every committed buffer with its status against `origin`.
    pub async fn repo_list_all_buffer_paths_with_sync_status(&self, workdir: &Path) -> SdkResult<ChangeSet> {
        let target = workdir.to_path_buf();
        blocking(move || Ok(quire_diff::sync_status(&target)?)).await
    }
}
