//! Repository handles and commit resolution shared by the other Quire crates.

use std::path::Path;

use git2::{ErrorCode, Oid, Repository};
use quire_types::CommitHash;

use crate::error::{StoreError, StoreResult};

/// Open the repository rooted at `workdir`.
///
/// Fails with [`StoreError::NotAGitRepository`] when the path is missing or
/// holds no repository.
pub fn open_repository(workdir: &Path) -> StoreResult<Repository> {
    match Repository::open(workdir) {
        Ok(repo) => Ok(repo),
        Err(e) if e.code() == ErrorCode::NotFound => {
            Err(StoreError::NotAGitRepository(workdir.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// The commit HEAD points to, or `None` for a repository without commits.
pub fn head_commit(repo: &Repository) -> StoreResult<Option<git2::Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Hash of the commit HEAD points to.
pub fn current_commit(workdir: &Path) -> StoreResult<CommitHash> {
    let repo = open_repository(workdir)?;
    let commit = head_commit(&repo)?.ok_or_else(|| StoreError::NotFound("HEAD".into()))?;
    commit_hash(commit.id())
}

/// Returns `true` if `workdir` holds a repository whose HEAD resolves.
pub fn workdir_is_valid(workdir: &Path) -> bool {
    match open_repository(workdir) {
        Ok(repo) => matches!(head_commit(&repo), Ok(Some(_))),
        Err(_) => false,
    }
}

/// Convert a git object id into a [`CommitHash`].
pub fn commit_hash(oid: Oid) -> StoreResult<CommitHash> {
    Ok(CommitHash::from_slice(oid.as_bytes())?)
}

/// Convert a [`CommitHash`] into a git object id.
pub fn commit_oid(hash: &CommitHash) -> StoreResult<Oid> {
    Ok(Oid::from_bytes(hash.as_bytes())?)
}

/// Resolve a commit by hash, mapping a missing object to `NotFound`.
pub fn find_commit<'r>(repo: &'r Repository, hash: &CommitHash) -> StoreResult<git2::Commit<'r>> {
    match repo.find_commit(commit_oid(hash)?) {
        Ok(commit) => Ok(commit),
        Err(e) if e.code() == ErrorCode::NotFound => {
            Err(StoreError::NotFound(format!("commit {hash}")))
        }
        Err(e) => Err(e.into()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn missing_directory_is_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_repository(&dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, StoreError::NotAGitRepository(_)));
    }

    #[test]
    fn fresh_repository_has_no_head_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        assert!(head_commit(&repo).unwrap().is_none());
        assert!(!workdir_is_valid(dir.path()));
        assert!(matches!(
            current_commit(dir.path()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn current_commit_matches_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_files(&repo, &[("a.txt", b"a")], "first");
        assert!(workdir_is_valid(dir.path()));
        let hash = current_commit(dir.path()).unwrap();
        assert_eq!(commit_oid(&hash).unwrap(), oid);
    }

    #[test]
    fn unknown_commit_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.txt", b"a")], "first");
        let missing = CommitHash::from_raw([7; 20]);
        assert!(matches!(
            find_commit(&repo, &missing),
            Err(StoreError::NotFound(_))
        ));
    }
}
