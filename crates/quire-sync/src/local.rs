//! Operations that touch only the local repository.

use std::fs;
use std::path::Path;

use git2::{Repository, RepositoryInitOptions};
use quire_store::open_repository;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::names::{branch_name, normalize_url, validate_branch_name, ORIGIN};

/// Create an empty repository at `workdir` whose HEAD points to
/// `default_branch`.
///
/// Fails with `PathOccupied` if anything exists at `workdir`. The directory
/// is removed again if repository creation fails.
pub fn init(workdir: &Path, default_branch: &str) -> SyncResult<()> {
    validate_branch_name(default_branch)?;
    if workdir.exists() {
        return Err(SyncError::PathOccupied(workdir.to_path_buf()));
    }
    fs::create_dir_all(workdir)?;

    let mut options = RepositoryInitOptions::new();
    options.initial_head(default_branch);
    if let Err(e) = Repository::init_opts(workdir, &options) {
        remove_partial(workdir);
        return Err(e.into());
    }

    info!(workdir = %workdir.display(), branch = default_branch, "initialized repository");
    Ok(())
}

/// Point the `origin` remote at `url`, replacing any previous origin.
pub fn add_origin(workdir: &Path, url: &str) -> SyncResult<()> {
    let repo = open_repository(workdir)?;
    let url = normalize_url(url);
    if repo.find_remote(ORIGIN).is_ok() {
        repo.remote_set_url(ORIGIN, &url)?;
    } else {
        repo.remote(ORIGIN, &url)?;
    }
    info!(workdir = %workdir.display(), url = %url, "set origin");
    Ok(())
}

/// Remove the `origin` remote. Missing origin is not an error.
pub fn delete_origin(workdir: &Path) -> SyncResult<()> {
    let repo = open_repository(workdir)?;
    match repo.remote_delete(ORIGIN) {
        Ok(()) => {
            info!(workdir = %workdir.display(), "deleted origin");
            Ok(())
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// URL of `origin`, if configured.
pub fn origin_url(workdir: &Path) -> SyncResult<Option<String>> {
    let repo = open_repository(workdir)?;
    let url = match repo.find_remote(ORIGIN) {
        Ok(remote) => remote.url().map(str::to_string),
        Err(_) => None,
    };
    Ok(url)
}

/// Remove a working copy from disk. Only directories holding a repository
/// are removed.
pub fn delete_working_copy(workdir: &Path) -> SyncResult<()> {
    open_repository(workdir)?;
    fs::remove_dir_all(workdir)?;
    info!(workdir = %workdir.display(), "deleted working copy");
    Ok(())
}

/// Branch HEAD points to, whether or not it has commits yet.
pub(crate) fn current_branch(repo: &Repository) -> SyncResult<String> {
    let head = repo.find_reference("HEAD")?;
    head.symbolic_target()
        .and_then(branch_name)
        .map(str::to_string)
        .ok_or(SyncError::DetachedHead)
}

pub(crate) fn remove_partial(workdir: &Path) {
    if let Err(e) = fs::remove_dir_all(workdir) {
        warn!(workdir = %workdir.display(), error = %e, "failed to remove partially created working copy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_sets_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("repo");
        init(&workdir, "trunk").unwrap();

        let repo = Repository::open(&workdir).unwrap();
        assert_eq!(current_branch(&repo).unwrap(), "trunk");
    }

    #[test]
    fn init_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = init(dir.path(), "main").unwrap_err();
        assert!(matches!(err, SyncError::PathOccupied(_)));
    }

    #[test]
    fn init_rejects_bad_branch_without_creating_anything() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("repo");
        assert!(matches!(
            init(&workdir, "bad branch"),
            Err(SyncError::InvalidBranchName { .. })
        ));
        assert!(!workdir.exists());
    }

    #[test]
    fn origin_can_be_set_replaced_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("repo");
        init(&workdir, "main").unwrap();

        add_origin(&workdir, "https://example.org/a/").unwrap();
        assert_eq!(origin_url(&workdir).unwrap().as_deref(), Some("https://example.org/a.git"));

        add_origin(&workdir, "https://example.org/b.git").unwrap();
        assert_eq!(origin_url(&workdir).unwrap().as_deref(), Some("https://example.org/b.git"));

        delete_origin(&workdir).unwrap();
        assert_eq!(origin_url(&workdir).unwrap(), None);
        delete_origin(&workdir).unwrap();
    }

    #[test]
    fn delete_only_removes_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        fs::create_dir(&plain).unwrap();
        assert!(delete_working_copy(&plain).is_err());
        assert!(plain.exists());

        let workdir = dir.path().join("repo");
        init(&workdir, "main").unwrap();
        delete_working_copy(&workdir).unwrap();
        assert!(!workdir.exists());
    }
}
