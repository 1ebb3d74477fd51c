use std::collections::BTreeSet;
use std::path::Path;

use bytes::Bytes;
use quire_diff::find_conflicts;
use quire_store::{commit_hash, head_commit, open_repository, read_buffers};
use quire_types::{BufferPath, CommitOutcome};
use tracing::{debug, info};

use crate::error::CommitResult;
use crate::request::CommitRequest;
use crate::validation::validate_request;
use crate::writer::{apply_changes, commit_index, restore_paths};

/// Apply a changeset to the working copy as a single commit.
///
/// The caller must hold the session lock. Returns the conflicting paths
/// without touching the working copy when any expected value disagrees with
/// current content. A repository without commits skips conflict detection.
pub fn update_buffers(workdir: &Path, request: &CommitRequest) -> CommitResult<CommitOutcome> {
    validate_request(request)?;

    let repo = open_repository(workdir)?;
    let paths: Vec<BufferPath> = request.changeset.keys().cloned().collect();

    if head_commit(&repo)?.is_some() {
        let current = read_buffers(workdir, &paths)?;
        let conflicts = find_conflicts(&request.changeset, &current, !request.skip_validation)?;
        if !conflicts.is_empty() {
            info!(
                workdir = %workdir.display(),
                conflicts = conflicts.len(),
                "changeset rejected due to conflicts"
            );
            return Ok(CommitOutcome::conflicted(conflicts));
        }
    } else {
        debug!(workdir = %workdir.display(), "no commits yet, skipping conflict check");
    }

    let changes: Vec<(BufferPath, Option<Bytes>)> = request
        .changeset
        .iter()
        .map(|(path, change)| (path.clone(), change.new_value.clone()))
        .collect();

    let result = apply_changes(&repo, workdir, &changes)
        .and_then(|()| commit_index(&repo, &request.author, &request.message));

    match result {
        Ok(Some(oid)) => {
            let hash = commit_hash(oid)?;
            info!(
                workdir = %workdir.display(),
                commit = %hash.short_hex(),
                buffers = changes.len(),
                "committed changeset"
            );
            Ok(CommitOutcome::committed(hash))
        }
        Ok(None) => {
            debug!(workdir = %workdir.display(), "changeset matches HEAD, nothing to commit");
            Ok(CommitOutcome::unchanged())
        }
        Err(e) => {
            let affected: BTreeSet<BufferPath> = paths.into_iter().collect();
            restore_paths(&repo, workdir, &affected);
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use git2::Repository;
    use quire_types::{Author, BufferChange, BufferChangeset, BufferPath};

    use crate::request::CommitRequest;

    pub fn init_repo(dir: &Path) -> Repository {
        Repository::init(dir).unwrap()
    }

    pub fn author() -> Author {
        Author::new("Ada", "ada@example.org")
    }

    pub fn path(s: &str) -> BufferPath {
        BufferPath::new(s).unwrap()
    }

    pub fn request(changes: Vec<(&str, BufferChange)>) -> CommitRequest {
        let changeset: BufferChangeset = changes
            .into_iter()
            .map(|(p, change)| (path(p), change))
            .collect();
        CommitRequest::new(author(), "test commit", changeset)
    }

    pub fn head_id(repo: &Repository) -> Option<git2::Oid> {
        repo.head().ok().and_then(|h| h.target())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use quire_store::{current_commit, read_buffers};
    use quire_types::BufferChange;

    #[test]
    fn first_commit_creates_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());

        let outcome =
            update_buffers(dir.path(), &request(vec![("a/b.txt", BufferChange::create("hi"))])).unwrap();
        assert!(outcome.is_committed());
        assert_eq!(
            outcome.new_commit_hash.unwrap(),
            current_commit(dir.path()).unwrap()
        );

        let read = read_buffers(dir.path(), &[path("a/b.txt")]).unwrap();
        assert_eq!(read[&path("a/b.txt")], Some(Bytes::from_static(b"hi")));
        assert!(head_id(&repo).is_some());
    }

    #[test]
    fn conflicting_changeset_leaves_head_and_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        update_buffers(dir.path(), &request(vec![("a/b.txt", BufferChange::create("hi"))])).unwrap();
        let head_before = head_id(&repo);

        let outcome = update_buffers(
            dir.path(),
            &request(vec![
                ("a/b.txt", BufferChange::update("stale", "new")),
                ("c.txt", BufferChange::create("c")),
            ]),
        )
        .unwrap();

        assert_eq!(outcome.conflicts.iter().collect::<Vec<_>>(), vec![&path("a/b.txt")]);
        assert!(outcome.new_commit_hash.is_none());
        assert_eq!(head_id(&repo), head_before);
        assert!(!dir.path().join("c.txt").exists());
        assert_eq!(std::fs::read(dir.path().join("a/b.txt")).unwrap(), b"hi");
    }

    #[test]
    fn deletion_removes_buffer_and_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        update_buffers(
            dir.path(),
            &request(vec![
                ("keep.txt", BufferChange::create("k")),
                ("d/gone.txt", BufferChange::create("g")),
            ]),
        )
        .unwrap();

        let outcome =
            update_buffers(dir.path(), &request(vec![("d/gone.txt", BufferChange::delete("g"))])).unwrap();
        assert!(outcome.is_committed());
        assert!(!dir.path().join("d").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn identical_resubmission_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        update_buffers(dir.path(), &request(vec![("a.txt", BufferChange::create("same"))])).unwrap();
        let head_before = head_id(&repo);

        let outcome =
            update_buffers(dir.path(), &request(vec![("a.txt", BufferChange::update("same", "same"))])).unwrap();
        assert!(outcome.is_unchanged());
        assert_eq!(head_id(&repo), head_before);
    }

    #[test]
    fn first_commit_with_empty_changeset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let err = update_buffers(dir.path(), &request(vec![])).unwrap_err();
        assert!(matches!(err, crate::CommitError::EmptyChangeset));
    }

    #[test]
    fn unchecked_changes_require_skip_validation() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        update_buffers(dir.path(), &request(vec![("a.txt", BufferChange::create("1"))])).unwrap();

        let strict = request(vec![("a.txt", BufferChange::unchecked(Some(Bytes::from_static(b"2"))))]);
        assert!(update_buffers(dir.path(), &strict).is_err());

        let lenient = strict.skip_validation();
        assert!(update_buffers(dir.path(), &lenient).unwrap().is_committed());
    }

    /// The index on disk, compared against HEAD's tree.
    fn staged_differences(dir: &std::path::Path) -> usize {
        let repo = git2::Repository::open(dir).unwrap();
        let tree = repo.head().unwrap().peel_to_tree().unwrap();
        let index = repo.index().unwrap();
        let n = repo.diff_tree_to_index(Some(&tree), Some(&index), None).unwrap().deltas().len();
        n
    }

    #[test]
    fn failed_write_restores_working_tree_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        update_buffers(dir.path(), &request(vec![("a.txt", BufferChange::create("1"))])).unwrap();
        let head = head_id(&repo);

        // An untracked directory where a buffer is to be created.
        std::fs::create_dir_all(dir.path().join("z.txt/inner")).unwrap();
        std::fs::write(dir.path().join("z.txt/inner/keep"), "k").unwrap();

        let failing = request(vec![
            ("a.txt", BufferChange::update("1", "2")),
            ("z.txt", BufferChange::create("z")),
        ]);
        assert!(update_buffers(dir.path(), &failing).is_err());

        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"1");
        assert!(dir.path().join("z.txt/inner/keep").is_file());
        assert_eq!(head_id(&repo), head);
        assert_eq!(staged_differences(dir.path()), 0);
    }

    #[test]
    fn locked_index_restores_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        update_buffers(
            dir.path(),
            &request(vec![("a.txt", BufferChange::create("1")), ("b/c.txt", BufferChange::create("c"))]),
        )
        .unwrap();
        let head = head_id(&repo);

        std::fs::write(dir.path().join(".git/index.lock"), "").unwrap();
        let failing = request(vec![
            ("a.txt", BufferChange::update("1", "2")),
            ("b/c.txt", BufferChange::delete("c")),
            ("new.txt", BufferChange::create("n")),
        ]);
        assert!(update_buffers(dir.path(), &failing).is_err());
        std::fs::remove_file(dir.path().join(".git/index.lock")).unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"1");
        assert_eq!(std::fs::read(dir.path().join("b/c.txt")).unwrap(), b"c");
        assert!(!dir.path().join("new.txt").exists());
        assert_eq!(head_id(&repo), head);
        assert_eq!(staged_differences(dir.path()), 0);
    }

    #[test]
    fn repository_metadata_cannot_be_targeted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        update_buffers(dir.path(), &request(vec![("a.txt", BufferChange::create("1"))])).unwrap();
        let head = head_id(&repo);

        for raw in [r#"{".git/HEAD": {"new_value": null}}"#, r#"{"x/.Git/config": {"new_value": null}}"#] {
            assert!(serde_json::from_str::<quire_types::BufferChangeset>(raw).is_err());
        }
        assert!(BufferPath::new(".git/HEAD").is_err());

        assert!(repo.head().is_ok());
        assert_eq!(head_id(&repo), head);
        assert!(dir.path().join(".git/HEAD").is_file());
    }

    #[test]
    fn not_a_repository_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = update_buffers(
            &dir.path().join("missing"),
            &request(vec![("a.txt", BufferChange::create("1"))]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::CommitError::Store(quire_store::StoreError::NotAGitRepository(_))
        ));
    }
}
