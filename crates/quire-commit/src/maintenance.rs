//! Less common mutations: importing external files, committing stray
//! working-tree changes, and discarding them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use git2::build::CheckoutBuilder;
use git2::{IndexAddOption, ResetType};
use quire_store::{commit_hash, head_commit, open_repository};
use quire_types::{Author, BufferPath, CommitOutcome};
use tracing::{debug, info};

use crate::error::{CommitError, CommitResult};
use crate::validation::validate_authoring;
use crate::writer::{apply_changes, commit_index, restore_paths};

/// Copy files from the filesystem into buffers, overwriting existing ones,
/// in one commit.
///
/// Every source must exist before anything is written; a missing source
/// fails with `SourceMissing` and leaves the working copy untouched.
pub fn add_external_buffers(
    workdir: &Path,
    sources: &BTreeMap<PathBuf, BufferPath>,
    author: &Author,
    message: &str,
) -> CommitResult<CommitOutcome> {
    validate_authoring(author, message)?;
    if sources.is_empty() {
        return Err(CommitError::EmptyChangeset);
    }
    for source in sources.keys() {
        if !source.is_file() {
            return Err(CommitError::SourceMissing(source.clone()));
        }
    }

    let mut changes = Vec::with_capacity(sources.len());
    for (source, target) in sources {
        let content = std::fs::read(source)?;
        changes.push((target.clone(), Some(Bytes::from(content))));
    }

    let repo = open_repository(workdir)?;
    let result = apply_changes(&repo, workdir, &changes)
        .and_then(|()| commit_index(&repo, author, message));

    match result {
        Ok(Some(oid)) => {
            let hash = commit_hash(oid)?;
            info!(workdir = %workdir.display(), commit = %hash.short_hex(), files = changes.len(), "imported external buffers");
            Ok(CommitOutcome::committed(hash))
        }
        Ok(None) => Ok(CommitOutcome::unchanged()),
        Err(e) => {
            let affected: BTreeSet<BufferPath> = changes.into_iter().map(|(path, _)| path).collect();
            restore_paths(&repo, workdir, &affected);
            Err(e)
        }
    }
}

/// Stage every working-tree change, including deletions, and commit it.
pub fn commit_outstanding_changes(
    workdir: &Path,
    author: &Author,
    message: &str,
) -> CommitResult<CommitOutcome> {
    validate_authoring(author, message)?;
    let repo = open_repository(workdir)?;

    let mut index = repo.index()?;
    index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"], None)?;
    index.write()?;

    match commit_index(&repo, author, message)? {
        Some(oid) => {
            let hash = commit_hash(oid)?;
            info!(workdir = %workdir.display(), commit = %hash.short_hex(), "committed outstanding changes");
            Ok(CommitOutcome::committed(hash))
        }
        None => Ok(CommitOutcome::unchanged()),
    }
}

/// Reset tracked buffers to HEAD, optionally only below `path_spec`.
///
/// Untracked files are left in place. A repository without commits has
/// nothing to reset to and is left alone.
pub fn discard_uncommitted_changes(workdir: &Path, path_spec: Option<&BufferPath>) -> CommitResult<()> {
    let repo = open_repository(workdir)?;
    let Some(head) = head_commit(&repo)? else {
        debug!(workdir = %workdir.display(), "no commits, nothing to discard");
        return Ok(());
    };

    match path_spec.filter(|spec| !spec.is_root()) {
        Some(spec) => {
            repo.reset_default(Some(head.as_object()), [spec.as_str()])?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force().path(spec.as_str());
            repo.checkout_head(Some(&mut checkout))?;
        }
        None => {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.reset(head.as_object(), ResetType::Hard, Some(&mut checkout))?;
        }
    }

    info!(workdir = %workdir.display(), path_spec = ?path_spec.map(BufferPath::as_str), "discarded uncommitted changes");
    Ok(())
}
