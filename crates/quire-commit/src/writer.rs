//! Working tree, index, and commit plumbing shared by the commit operations.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use bytes::Bytes;
use git2::{Oid, Repository, Signature};
use quire_store::{blob_at, head_commit, tree_buffers, walk_buffer_paths};
use quire_types::{Author, BufferPath};
use tracing::{debug, warn};

use crate::error::CommitResult;

/// Write or remove each buffer in the working tree and stage the result.
pub(crate) fn apply_changes(
    repo: &Repository,
    workdir: &Path,
    changes: &[(BufferPath, Option<Bytes>)],
) -> CommitResult<()> {
    let mut index = repo.index()?;
    for (path, content) in changes {
        let full = path.to_fs_path(workdir);
        match content {
            Some(content) => {
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full, content)?;
                index.add_path(Path::new(path.as_str()))?;
            }
            None => {
                remove_file_if_present(&full)?;
                prune_empty_parents(workdir, path);
                index.remove_path(Path::new(path.as_str()))?;
            }
        }
    }
    index.write()?;
    Ok(())
}

/// Commit the current index as `author`.
///
/// Returns `None` when the index tree equals HEAD's tree (or is empty in a
/// repository without commits): nothing would change.
pub(crate) fn commit_index(
    repo: &Repository,
    author: &Author,
    message: &str,
) -> CommitResult<Option<Oid>> {
    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let head = head_commit(repo)?;

    match &head {
        Some(parent) if parent.tree_id() == tree_id => return Ok(None),
        None if tree.is_empty() => return Ok(None),
        _ => {}
    }

    let signature = Signature::now(author.name.trim(), author.email.trim())?;
    let parents: Vec<&git2::Commit<'_>> = head.iter().collect();
    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    debug!(commit = %oid, "created commit");
    Ok(Some(oid))
}

/// Put `paths` back to their state in HEAD, in both the working tree and the
/// index. Paths absent from HEAD are removed.
///
/// Each path is restored independently: one that cannot be restored is
/// logged and the rest still are.
pub(crate) fn restore_paths(repo: &Repository, workdir: &Path, paths: &BTreeSet<BufferPath>) {
    if let Err(e) = try_restore_paths(repo, workdir, paths) {
        warn!(error = %e, count = paths.len(), "failed to restore paths from HEAD");
    }
}

/// Put every buffer at or below `root` back to its state in HEAD.
pub(crate) fn restore_subtree(repo: &Repository, workdir: &Path, root: &BufferPath) {
    let mut paths: BTreeSet<BufferPath> = match walk_buffer_paths(workdir, root) {
        Ok(paths) => paths.into_iter().collect(),
        Err(e) => {
            warn!(root = %root, error = %e, "failed to list subtree for restore");
            BTreeSet::new()
        }
    };
    if let Ok(Some(head)) = head_commit(repo) {
        if let Ok(tree) = head.tree() {
            if let Ok(committed) = tree_buffers(repo, &tree, root) {
                paths.extend(committed.into_keys());
            }
        }
    }
    restore_paths(repo, workdir, &paths);
}

fn try_restore_paths(
    repo: &Repository,
    workdir: &Path,
    paths: &BTreeSet<BufferPath>,
) -> CommitResult<()> {
    let head = head_commit(repo)?;
    let tree = match &head {
        Some(commit) => Some(commit.tree()?),
        None => None,
    };

    let mut index = repo.index()?;
    let mut failed = 0usize;
    for path in paths {
        if let Err(e) = restore_one(repo, workdir, tree.as_ref(), &mut index, path) {
            warn!(path = %path, error = %e, "failed to restore path from HEAD");
            failed += 1;
        }
    }
    index.write()?;
    debug!(count = paths.len(), failed, "restored paths from HEAD");
    Ok(())
}

fn restore_one(
    repo: &Repository,
    workdir: &Path,
    tree: Option<&git2::Tree<'_>>,
    index: &mut git2::Index,
    path: &BufferPath,
) -> CommitResult<()> {
    let full = path.to_fs_path(workdir);
    let committed = match tree {
        Some(tree) => blob_at(repo, tree, path)?,
        None => None,
    };
    match committed {
        Some(content) => {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full, &content)?;
            index.add_path(Path::new(path.as_str()))?;
        }
        None => {
            // A directory here was never written by the failed operation.
            if !full.is_dir() {
                remove_file_if_present(&full)?;
                prune_empty_parents(workdir, path);
            }
            if index.get_path(Path::new(path.as_str()), 0).is_some() {
                index.remove_path(Path::new(path.as_str()))?;
            }
        }
    }
    Ok(())
}

fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove directories left empty by a deletion, up to the working copy root.
pub(crate) fn prune_empty_parents(workdir: &Path, path: &BufferPath) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.is_root() {
            break;
        }
        // `remove_dir` fails on non-empty directories, which ends the walk.
        if fs::remove_dir(dir.to_fs_path(workdir)).is_err() {
            break;
        }
        current = dir.parent();
    }
}
