//! Commit-to-commit buffer changes.
//!
//! Compares the trees of two commits and classifies every affected buffer
//! as added, modified, or removed. Optionally reports untouched buffers as
//! unchanged so callers get a complete listing.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{Delta, DiffOptions, Repository};
use quire_store::{commit_hash, find_commit, head_commit, open_repository, StoreError};
use quire_types::{BufferPath, ChangeStatus, CommitHash};
use tracing::debug;

use crate::error::DiffResult;

/// Per-path change classification.
pub type ChangeSet = BTreeMap<BufferPath, ChangeStatus>;

/// Buffers at or below `root` that changed between `before` and `after`.
///
/// `before = None` compares against the empty tree, so every buffer in
/// `after` is reported as added. With `include_unchanged`, buffers present
/// in `after` and untouched are reported as [`ChangeStatus::Unchanged`].
pub fn changed_buffers_between(
    workdir: &Path,
    before: Option<&CommitHash>,
    after: &CommitHash,
    root: &BufferPath,
    include_unchanged: bool,
) -> DiffResult<ChangeSet> {
    let repo = open_repository(workdir)?;
    let old_tree = match before {
        Some(hash) => Some(find_commit(&repo, hash)?.tree()?),
        None => None,
    };
    let new_tree = find_commit(&repo, after)?.tree()?;
    diff_trees(&repo, old_tree.as_ref(), &new_tree, root, include_unchanged)
}

/// Local changes relative to the `origin` remote-tracking branch.
///
/// Lists every buffer in HEAD along with its status compared to
/// `refs/remotes/origin/<current branch>`. Without a tracking ref, HEAD is
/// compared with itself and everything is unchanged.
pub fn sync_status(workdir: &Path) -> DiffResult<ChangeSet> {
    let repo = open_repository(workdir)?;
    let head = head_commit(&repo)?.ok_or_else(|| StoreError::NotFound("HEAD".into()))?;

    let tracking = tracking_commit(&repo)?.unwrap_or_else(|| head.clone());
    debug!(
        head = %commit_hash(head.id())?.short_hex(),
        tracking = %commit_hash(tracking.id())?.short_hex(),
        "computing sync status"
    );

    let old_tree = tracking.tree()?;
    let new_tree = head.tree()?;
    diff_trees(&repo, Some(&old_tree), &new_tree, &BufferPath::root(), true)
}

fn tracking_commit(repo: &Repository) -> DiffResult<Option<git2::Commit<'_>>> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(_) => return Ok(None),
    };
    let Some(branch) = head.shorthand() else {
        return Ok(None);
    };
    match repo.refname_to_id(&format!("refs/remotes/origin/{branch}")) {
        Ok(oid) => Ok(Some(repo.find_commit(oid)?)),
        Err(_) => Ok(None),
    }
}

fn diff_trees(
    repo: &Repository,
    old_tree: Option<&git2::Tree<'_>>,
    new_tree: &git2::Tree<'_>,
    root: &BufferPath,
    include_unchanged: bool,
) -> DiffResult<ChangeSet> {
    let mut options = DiffOptions::new();
    if !root.is_root() {
        options.pathspec(root.as_str());
    }
    let diff = repo.diff_tree_to_tree(old_tree, Some(new_tree), Some(&mut options))?;

    let mut changes = ChangeSet::new();
    if include_unchanged {
        for path in quire_store::tree_buffers(repo, new_tree, root)?.into_keys() {
            changes.insert(path, ChangeStatus::Unchanged);
        }
    }

    for delta in diff.deltas() {
        let (file, status) = match delta.status() {
            Delta::Added => (delta.new_file(), ChangeStatus::Added),
            Delta::Deleted => (delta.old_file(), ChangeStatus::Removed),
            Delta::Modified | Delta::Typechange => (delta.new_file(), ChangeStatus::Modified),
            _ => continue,
        };
        let Some(raw) = file.path().and_then(|p| p.to_str()) else {
            continue;
        };
        let path = BufferPath::new(raw)?;
        if path.is_within(root) {
            changes.insert(path, status);
        }
    }
    Ok(changes)
}
