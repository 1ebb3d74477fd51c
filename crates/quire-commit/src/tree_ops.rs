//! Subtree delete and move.
//!
//! These skip per-buffer validation: the caller names a whole subtree and
//! every buffer below it is affected. On failure the touched subtrees are
//! restored from HEAD before the error propagates.

use std::fs;
use std::path::Path;

use git2::{Index, Repository};
use quire_store::{commit_hash, head_commit, open_repository, walk_buffer_paths, StoreError};
use quire_types::{Author, BufferPath, CommitOutcome};
use tracing::{debug, info};

use crate::error::{CommitError, CommitResult};
use crate::validation::validate_authoring;
use crate::writer::{commit_index, prune_empty_parents, restore_subtree};

/// Delete every buffer at or below `root` in one commit.
///
/// Requires HEAD to resolve. Deleting a subtree that does not exist is a
/// no-op and returns an unchanged outcome.
pub fn delete_tree(
    workdir: &Path,
    root: &BufferPath,
    author: &Author,
    message: &str,
) -> CommitResult<CommitOutcome> {
    validate_authoring(author, message)?;
    if root.is_root() {
        return Err(CommitError::RootTree);
    }
    let repo = open_repository(workdir)?;
    require_head(&repo, workdir)?;

    let result = remove_subtree(&repo, workdir, root)
        .and_then(|()| commit_index(&repo, author, message));

    finish(&repo, workdir, result, &[root], "deleted tree")
}

/// Move every buffer at or below `old_root` to the same relative location
/// below `new_root`, in one commit.
///
/// Fails with `TreeNotFound` if `old_root` does not exist and with
/// `TargetExists` if `new_root` exists or the two roots overlap.
pub fn move_tree(
    workdir: &Path,
    old_root: &BufferPath,
    new_root: &BufferPath,
    author: &Author,
    message: &str,
) -> CommitResult<CommitOutcome> {
    validate_authoring(author, message)?;
    if old_root.is_root() || new_root.is_root() {
        return Err(CommitError::RootTree);
    }
    if new_root.is_within(old_root) || old_root.is_within(new_root) {
        return Err(CommitError::TargetExists(new_root.clone()));
    }

    let repo = open_repository(workdir)?;
    require_head(&repo, workdir)?;

    let source = old_root.to_fs_path(workdir);
    let target = new_root.to_fs_path(workdir);
    if !source.exists() {
        return Err(CommitError::TreeNotFound(old_root.clone()));
    }
    if target.exists() {
        return Err(CommitError::TargetExists(new_root.clone()));
    }

    let result = rename_subtree(&repo, workdir, old_root, new_root)
        .and_then(|()| commit_index(&repo, author, message));

    finish(&repo, workdir, result, &[old_root, new_root], "moved tree")
}

fn require_head(repo: &Repository, workdir: &Path) -> CommitResult<()> {
    match head_commit(repo)? {
        Some(_) => Ok(()),
        None => Err(StoreError::NotAGitRepository(workdir.to_path_buf()).into()),
    }
}

fn remove_subtree(repo: &Repository, workdir: &Path, root: &BufferPath) -> CommitResult<()> {
    let full = root.to_fs_path(workdir);
    if full.is_dir() {
        fs::remove_dir_all(&full)?;
    } else if full.exists() {
        fs::remove_file(&full)?;
    }
    prune_empty_parents(workdir, root);

    let mut index = repo.index()?;
    let removed = unstage_subtree(&mut index, root)?;
    index.write()?;
    debug!(root = %root, removed, "removed subtree from index");
    Ok(())
}

fn rename_subtree(
    repo: &Repository,
    workdir: &Path,
    old_root: &BufferPath,
    new_root: &BufferPath,
) -> CommitResult<()> {
    let target = new_root.to_fs_path(workdir);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(old_root.to_fs_path(workdir), &target)?;
    prune_empty_parents(workdir, old_root);

    let mut index = repo.index()?;
    unstage_subtree(&mut index, old_root)?;
    for path in walk_buffer_paths(workdir, new_root)? {
        index.add_path(Path::new(path.as_str()))?;
    }
    index.write()?;
    Ok(())
}

/// Drop every index entry at or below `root`. Paths are matched literally,
/// so glob characters in `root` have no special meaning.
fn unstage_subtree(index: &mut Index, root: &BufferPath) -> CommitResult<usize> {
    let staged: Vec<BufferPath> = index
        .iter()
        .filter_map(|entry| {
            let raw = std::str::from_utf8(&entry.path).ok()?;
            BufferPath::new(raw).ok()
        })
        .filter(|path| path.is_within(root))
        .collect();
    for path in &staged {
        index.remove_path(Path::new(path.as_str()))?;
    }
    Ok(staged.len())
}

fn finish(
    repo: &Repository,
    workdir: &Path,
    result: CommitResult<Option<git2::Oid>>,
    roots: &[&BufferPath],
    what: &str,
) -> CommitResult<CommitOutcome> {
    match result {
        Ok(Some(oid)) => {
            let hash = commit_hash(oid)?;
            info!(workdir = %workdir.display(), commit = %hash.short_hex(), "{what}");
            Ok(CommitOutcome::committed(hash))
        }
        Ok(None) => {
            // Nothing staged changed; put back whatever was touched on disk.
            for root in roots {
                restore_subtree(repo, workdir, root);
            }
            Ok(CommitOutcome::unchanged())
        }
        Err(e) => {
            for root in roots {
                restore_subtree(repo, workdir, root);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::test_support::*;
    use crate::orchestrator::update_buffers;
    use quire_store::list_all_buffer_paths;
    use quire_types::BufferChange;

    fn seed(dir: &Path) -> Repository {
        let repo = init_repo(dir);
        update_buffers(
            dir,
            &request(vec![
                ("data/a.json", BufferChange::create("{\"t\":1}")),
                ("data/nested/b.json", BufferChange::create("{\"t\":2}")),
                ("other.txt", BufferChange::create("o")),
            ]),
        )
        .unwrap();
        repo
    }

    fn listed(dir: &Path) -> Vec<String> {
        list_all_buffer_paths(dir)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn delete_tree_removes_every_descendant() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seed(dir.path());

        let outcome = delete_tree(dir.path(), &path("data"), &author(), "drop data").unwrap();
        assert!(outcome.is_committed());
        assert_eq!(listed(dir.path()), vec!["other.txt"]);

        let head = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(head.get_path(Path::new("data")).is_err());
        assert!(head.get_path(Path::new("other.txt")).is_ok());
    }

    #[test]
    fn delete_missing_tree_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let outcome = delete_tree(dir.path(), &path("absent"), &author(), "noop").unwrap();
        assert!(outcome.is_unchanged());
    }

    #[test]
    fn delete_tree_requires_commits() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let err = delete_tree(dir.path(), &path("data"), &author(), "drop").unwrap_err();
        assert!(matches!(
            err,
            CommitError::Store(StoreError::NotAGitRepository(_))
        ));
    }

    #[test]
    fn root_cannot_be_deleted() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        assert!(matches!(
            delete_tree(dir.path(), &BufferPath::root(), &author(), "all"),
            Err(CommitError::RootTree)
        ));
    }

    #[test]
    fn move_tree_relocates_buffers() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        let outcome =
            move_tree(dir.path(), &path("data"), &path("archive/data"), &author(), "archive").unwrap();
        assert!(outcome.is_committed());
        assert_eq!(
            listed(dir.path()),
            vec!["archive/data/a.json", "archive/data/nested/b.json", "other.txt"]
        );
    }

    fn staged_differences(dir: &Path) -> usize {
        let repo = Repository::open(dir).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        let index = repo.index().unwrap();
        let n = repo.diff_tree_to_index(Some(&tree), Some(&index), None).unwrap().deltas().len();
        n
    }

    #[test]
    fn glob_characters_in_roots_match_literally() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seed(dir.path());
        update_buffers(
            dir.path(),
            &request(vec![
                ("data1/x.txt", BufferChange::create("x")),
                ("data[1]/y.txt", BufferChange::create("y")),
                ("data*/z.txt", BufferChange::create("z")),
            ]),
        )
        .unwrap();

        let outcome = delete_tree(dir.path(), &path("data[1]"), &author(), "drop").unwrap();
        assert!(outcome.is_committed());
        let head = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(head.get_path(Path::new("data[1]/y.txt")).is_err());
        assert!(head.get_path(Path::new("data1/x.txt")).is_ok());
        assert!(!dir.path().join("data[1]").exists());

        let outcome = move_tree(dir.path(), &path("data*"), &path("moved?"), &author(), "mv").unwrap();
        assert!(outcome.is_committed());
        let head = repo.head().unwrap().peel_to_tree().unwrap();
        assert!(head.get_path(Path::new("moved?/z.txt")).is_ok());
        assert!(head.get_path(Path::new("data*/z.txt")).is_err());
        assert!(head.get_path(Path::new("data/a.json")).is_ok());
        assert!(head.get_path(Path::new("data1/x.txt")).is_ok());
        assert_eq!(staged_differences(dir.path()), 0);
    }

    #[test]
    fn failed_delete_restores_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seed(dir.path());
        let head = head_id(&repo);

        std::fs::write(dir.path().join(".git/index.lock"), "").unwrap();
        assert!(delete_tree(dir.path(), &path("data"), &author(), "drop").is_err());
        std::fs::remove_file(dir.path().join(".git/index.lock")).unwrap();

        assert_eq!(listed(dir.path()), vec!["data/a.json", "data/nested/b.json", "other.txt"]);
        assert_eq!(std::fs::read(dir.path().join("data/nested/b.json")).unwrap(), b"{\"t\":2}");
        assert_eq!(head_id(&repo), head);
        assert_eq!(staged_differences(dir.path()), 0);
    }

    #[test]
    fn failed_move_restores_both_roots() {
        let dir = tempfile::tempdir().unwrap();
        let repo = seed(dir.path());
        let head = head_id(&repo);

        std::fs::write(dir.path().join(".git/index.lock"), "").unwrap();
        assert!(move_tree(dir.path(), &path("data"), &path("archive/data"), &author(), "mv").is_err());
        std::fs::remove_file(dir.path().join(".git/index.lock")).unwrap();

        assert_eq!(listed(dir.path()), vec!["data/a.json", "data/nested/b.json", "other.txt"]);
        assert!(!dir.path().join("archive").exists());
        assert_eq!(head_id(&repo), head);
        assert_eq!(staged_differences(dir.path()), 0);

        // A target below an existing file fails before anything moves.
        assert!(move_tree(dir.path(), &path("data"), &path("other.txt/data"), &author(), "mv").is_err());
        assert_eq!(listed(dir.path()), vec!["data/a.json", "data/nested/b.json", "other.txt"]);
        assert_eq!(staged_differences(dir.path()), 0);
    }

    #[test]
    fn move_tree_rejects_existing_or_overlapping_target() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());

        assert!(matches!(
            move_tree(dir.path(), &path("data"), &path("other.txt"), &author(), "m"),
            Err(CommitError::TargetExists(_))
        ));
        assert!(matches!(
            move_tree(dir.path(), &path("data"), &path("data/inner"), &author(), "m"),
            Err(CommitError::TargetExists(_))
        ));
        assert!(matches!(
            move_tree(dir.path(), &path("missing"), &path("elsewhere"), &author(), "m"),
            Err(CommitError::TreeNotFound(_))
        ));
    }
}
