//! Network operations against `origin` or an arbitrary URL.

use std::cell::RefCell;
use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Direction, FetchOptions, PushOptions, Remote, Repository};
use quire_store::{commit_hash, open_repository};
use quire_types::{CommitHash, GitAuthentication, Progress};
use tracing::{debug, info, warn};

use crate::auth::remote_callbacks;
use crate::error::{SyncError, SyncResult};
use crate::local::{current_branch, remove_partial};
use crate::names::{branch_name, branch_ref, normalize_url, validate_branch_name, ORIGIN};
use crate::types::{PullResult, RemoteDescription};

/// Receives progress of a transfer or checkout.
pub type ProgressFn<'a> = &'a (dyn Fn(Progress) + Send + Sync);

/// Clone `url` into `workdir`.
///
/// Fails with `PathOccupied` if anything exists at `workdir`. `auth` is
/// used for this call only. A partially created directory is removed on
/// failure.
pub fn clone(
    workdir: &Path,
    url: &str,
    auth: &GitAuthentication,
    branch: Option<&str>,
    on_progress: ProgressFn<'_>,
) -> SyncResult<()> {
    if let Some(branch) = branch {
        validate_branch_name(branch)?;
    }
    if workdir.exists() {
        return Err(SyncError::PathOccupied(workdir.to_path_buf()));
    }
    let url = normalize_url(url);

    let mut callbacks = remote_callbacks(auth);
    callbacks.transfer_progress(|stats| {
        on_progress(Progress::new(
            "receiving objects",
            stats.received_objects() as u64,
            Some(stats.total_objects() as u64),
        ));
        true
    });
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);

    let mut checkout = CheckoutBuilder::new();
    checkout.progress(|_path, done, total| {
        on_progress(Progress::new("checkout", done as u64, Some(total as u64)));
    });

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch).with_checkout(checkout);
    if let Some(branch) = branch {
        builder.branch(branch);
    }

    match builder.clone(&url, workdir) {
        Ok(_) => {
            info!(workdir = %workdir.display(), url = %url, "cloned repository");
            Ok(())
        }
        Err(e) => {
            if workdir.exists() {
                remove_partial(workdir);
            }
            Err(SyncError::from_transport(e, &url))
        }
    }
}

/// Fetch `origin` and fast-forward the current branch.
///
/// A branch that has diverged from origin fails with `Diverged` and the
/// working copy is not touched. Uncommitted changes that the new tree would
/// overwrite make the checkout fail before HEAD moves.
pub fn pull(workdir: &Path, auth: &GitAuthentication, on_progress: ProgressFn<'_>) -> SyncResult<PullResult> {
    let repo = open_repository(workdir)?;
    let branch = current_branch(&repo)?;
    let local_ref = branch_ref(&branch);
    let tracking_ref = format!("refs/remotes/{ORIGIN}/{branch}");
    let before = repo.refname_to_id(&local_ref).ok();

    let mut remote = repo.find_remote(ORIGIN).map_err(|_| SyncError::NoOrigin)?;
    let url = remote.url().unwrap_or_default().to_string();
    fetch_branch(&mut remote, &branch, &tracking_ref, auth, on_progress, &url)?;

    let Ok(fetched) = repo.refname_to_id(&tracking_ref) else {
        debug!(workdir = %workdir.display(), branch = %branch, "origin has no such branch, nothing to pull");
        return pull_result(before, before);
    };

    let annotated = repo.find_annotated_commit(fetched)?;
    let (analysis, _) = repo.merge_analysis(&[&annotated])?;

    if analysis.is_up_to_date() {
        debug!(workdir = %workdir.display(), "already up to date");
        return pull_result(before, before);
    }
    if !(analysis.is_fast_forward() || analysis.is_unborn()) {
        return Err(SyncError::Diverged { branch });
    }

    fast_forward(&repo, &local_ref, fetched, before.is_none())?;
    info!(workdir = %workdir.display(), branch = %branch, commit = %fetched, "fast-forwarded from origin");
    pull_result(before, Some(fetched))
}

/// Push the current branch to `origin`.
///
/// Rejections by the remote, including non-fast-forward, surface as
/// `PushRejected`. Nothing is retried.
pub fn push(workdir: &Path, auth: &GitAuthentication, on_progress: ProgressFn<'_>) -> SyncResult<()> {
    let repo = open_repository(workdir)?;
    let branch = current_branch(&repo)?;
    let mut remote = repo.find_remote(ORIGIN).map_err(|_| SyncError::NoOrigin)?;
    let url = remote.url().unwrap_or_default().to_string();
    let refspec = format!("{0}:{0}", branch_ref(&branch));

    let rejection: RefCell<Option<String>> = RefCell::new(None);
    {
        let mut callbacks = remote_callbacks(auth);
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
            }
            Ok(())
        });
        callbacks.push_transfer_progress(|current, total, _bytes| {
            on_progress(Progress::new("sending objects", current as u64, Some(total as u64)));
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut options)) {
            if is_non_fast_forward(&e) {
                return Err(SyncError::PushRejected(e.message().to_string()));
            }
            return Err(SyncError::from_transport(e, &url));
        }
    }

    if let Some(message) = rejection.into_inner() {
        warn!(workdir = %workdir.display(), reason = %message, "push rejected");
        return Err(SyncError::PushRejected(message));
    }
    info!(workdir = %workdir.display(), branch = %branch, "pushed to origin");
    Ok(())
}

/// Inspect `url` without cloning it.
///
/// A push-mode connection decides `can_push`; the ref listing itself comes
/// from a fetch-mode connection. The main branch is the one HEAD points to.
pub fn describe_remote(url: &str, auth: &GitAuthentication) -> SyncResult<RemoteDescription> {
    let url = normalize_url(url);
    let mut remote = Remote::create_detached(url.as_str())?;

    let can_push = match remote.connect_auth(Direction::Push, Some(remote_callbacks(auth)), None) {
        Ok(_connection) => true,
        Err(e) => {
            debug!(url = %url, error = %e, "push connection refused");
            false
        }
    };

    let heads: Vec<(String, git2::Oid, Option<String>)> = {
        let connection = remote
            .connect_auth(Direction::Fetch, Some(remote_callbacks(auth)), None)
            .map_err(|e| SyncError::from_transport(e, &url))?;
        let listed = connection
            .list()?
            .iter()
            .map(|head| {
                (
                    head.name().to_string(),
                    head.oid(),
                    head.symref_target().map(str::to_string),
                )
            })
            .collect();
        listed
    };

    let branches: Vec<(String, git2::Oid)> = heads
        .iter()
        .filter_map(|(name, oid, _)| branch_name(name).map(|b| (b.to_string(), *oid)))
        .collect();

    let head = heads.iter().find(|(name, _, _)| name == "HEAD");
    let main = head.and_then(|(_, head_oid, symref)| {
        let by_symref = symref
            .as_deref()
            .and_then(branch_name)
            .and_then(|target| branches.iter().find(|(b, _)| b == target));
        by_symref.or_else(|| branches.iter().find(|(_, oid)| oid == head_oid))
    });

    let current_commit = match main {
        Some((_, oid)) => Some(commit_hash(*oid)?),
        None => None,
    };

    Ok(RemoteDescription {
        is_blank: heads.iter().all(|(_, oid, _)| oid.is_zero()),
        can_push,
        main_branch_name: main.map(|(b, _)| b.clone()),
        current_commit,
        available_branches: branches.into_iter().map(|(b, _)| b).collect(),
    })
}

fn fetch_branch(
    remote: &mut Remote<'_>,
    branch: &str,
    tracking_ref: &str,
    auth: &GitAuthentication,
    on_progress: ProgressFn<'_>,
    url: &str,
) -> SyncResult<()> {
    let mut callbacks = remote_callbacks(auth);
    callbacks.transfer_progress(|stats| {
        on_progress(Progress::new(
            "receiving objects",
            stats.received_objects() as u64,
            Some(stats.total_objects() as u64),
        ));
        true
    });
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);

    let refspec = format!("+{}:{tracking_ref}", branch_ref(branch));
    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(|e| SyncError::from_transport(e, url))
}

fn fast_forward(repo: &Repository, local_ref: &str, target: git2::Oid, unborn: bool) -> SyncResult<()> {
    let commit = repo.find_commit(target)?;
    let mut checkout = CheckoutBuilder::new();
    if unborn {
        checkout.force();
    } else {
        checkout.safe();
    }
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;

    match repo.find_reference(local_ref) {
        Ok(mut reference) => {
            reference.set_target(target, "pull: fast-forward")?;
        }
        Err(_) => {
            repo.reference(local_ref, target, true, "pull: initial")?;
        }
    }
    repo.set_head(local_ref)?;
    Ok(())
}

fn pull_result(before: Option<git2::Oid>, after: Option<git2::Oid>) -> SyncResult<PullResult> {
    let hash = |oid: Option<git2::Oid>| -> SyncResult<Option<CommitHash>> {
        oid.map(commit_hash).transpose().map_err(SyncError::from)
    };
    Ok(PullResult {
        oid_before_pull: hash(before)?,
        oid_after_pull: hash(after)?,
    })
}

fn is_non_fast_forward(err: &git2::Error) -> bool {
    let message = err.message();
    err.code() == git2::ErrorCode::NotFastForward
        || message.contains("non-fast-forward")
        || message.contains("non-fastforwardable")
        || message.contains("fetch first")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{add_origin, init};
    use git2::Signature;
    use std::fs;
    use std::path::PathBuf;

    fn quiet(_: Progress) {}

    fn commit_file(workdir: &Path, name: &str, content: &str) -> git2::Oid {
        let repo = Repository::open(workdir).unwrap();
        fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.org").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "test", &tree, &parents).unwrap()
    }

    /// A bare remote holding one commit on `main`.
    fn seeded_remote(root: &Path) -> (PathBuf, git2::Oid) {
        let bare = root.join("remote.git");
        let mut options = git2::RepositoryInitOptions::new();
        options.bare(true).initial_head("main");
        Repository::init_opts(&bare, &options).unwrap();

        let seed = root.join("seed");
        init(&seed, "main").unwrap();
        let oid = commit_file(&seed, "a.txt", "first");
        add_origin(&seed, bare.to_str().unwrap()).unwrap();
        push(&seed, &GitAuthentication::anonymous(), &quiet).unwrap();
        (bare, oid)
    }

    #[test]
    fn clone_checks_out_remote_content() {
        let dir = tempfile::tempdir().unwrap();
        let (bare, _) = seeded_remote(dir.path());

        let workdir = dir.path().join("clone");
        clone(&workdir, bare.to_str().unwrap(), &GitAuthentication::anonymous(), None, &quiet).unwrap();
        assert_eq!(fs::read_to_string(workdir.join("a.txt")).unwrap(), "first");
    }

    #[test]
    fn failed_clone_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("clone");
        let missing = dir.path().join("nowhere.git");

        assert!(clone(&workdir, missing.to_str().unwrap(), &GitAuthentication::anonymous(), None, &quiet).is_err());
        assert!(!workdir.exists());
    }

    #[test]
    fn clone_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let (bare, _) = seeded_remote(dir.path());
        let err = clone(dir.path(), bare.to_str().unwrap(), &GitAuthentication::anonymous(), None, &quiet)
            .unwrap_err();
        assert!(matches!(err, SyncError::PathOccupied(_)));
    }

    #[test]
    fn pull_reports_before_and_after() {
        let dir = tempfile::tempdir().unwrap();
        let (bare, first) = seeded_remote(dir.path());
        let url = bare.to_str().unwrap();
        let auth = GitAuthentication::anonymous();

        let reader = dir.path().join("reader");
        clone(&reader, url, &auth, None, &quiet).unwrap();

        let second = commit_file(&dir.path().join("seed"), "b.txt", "second");
        push(&dir.path().join("seed"), &auth, &quiet).unwrap();

        let result = pull(&reader, &auth, &quiet).unwrap();
        assert_eq!(result.oid_before_pull, Some(commit_hash(first).unwrap()));
        assert_eq!(result.oid_after_pull, Some(commit_hash(second).unwrap()));
        assert!(result.changed());
        assert_eq!(fs::read_to_string(reader.join("b.txt")).unwrap(), "second");

        let again = pull(&reader, &auth, &quiet).unwrap();
        assert!(!again.changed());
    }

    #[test]
    fn diverged_pull_and_stale_push_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (bare, _) = seeded_remote(dir.path());
        let url = bare.to_str().unwrap();
        let auth = GitAuthentication::anonymous();

        let other = dir.path().join("other");
        clone(&other, url, &auth, None, &quiet).unwrap();

        commit_file(&dir.path().join("seed"), "a.txt", "from seed");
        push(&dir.path().join("seed"), &auth, &quiet).unwrap();

        let local = commit_file(&other, "c.txt", "from other");
        assert!(matches!(push(&other, &auth, &quiet), Err(SyncError::PushRejected(_))));
        assert!(matches!(pull(&other, &auth, &quiet), Err(SyncError::Diverged { .. })));
        assert_eq!(Repository::open(&other).unwrap().head().unwrap().target(), Some(local));
    }

    #[test]
    fn pull_without_origin_fails() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("repo");
        init(&workdir, "main").unwrap();
        commit_file(&workdir, "a.txt", "a");
        assert!(matches!(
            pull(&workdir, &GitAuthentication::anonymous(), &quiet),
            Err(SyncError::NoOrigin)
        ));
    }

    #[test]
    fn describe_seeded_and_blank_remotes() {
        let dir = tempfile::tempdir().unwrap();
        let (bare, first) = seeded_remote(dir.path());
        let auth = GitAuthentication::anonymous();

        let described = describe_remote(bare.to_str().unwrap(), &auth).unwrap();
        assert!(!described.is_blank);
        assert_eq!(described.main_branch_name.as_deref(), Some("main"));
        assert_eq!(described.current_commit, Some(commit_hash(first).unwrap()));
        assert_eq!(described.available_branches, vec!["main".to_string()]);

        let blank = dir.path().join("blank.git");
        Repository::init_bare(&blank).unwrap();
        let described = describe_remote(blank.to_str().unwrap(), &auth).unwrap();
        assert!(described.is_blank);
        assert!(described.main_branch_name.is_none());
        assert!(described.available_branches.is_empty());
    }

    #[test]
    fn remote_with_only_tags_is_not_blank() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("tags.git");
        let repo = Repository::init_bare(&bare).unwrap();
        let tree = repo.find_tree(repo.treebuilder(None).unwrap().write().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.org").unwrap();
        repo.commit(Some("refs/tags/v1"), &sig, &sig, "tagged", &tree, &[]).unwrap();

        let described = describe_remote(bare.to_str().unwrap(), &GitAuthentication::anonymous()).unwrap();
        assert!(!described.is_blank);
        assert!(described.available_branches.is_empty());
        assert!(described.main_branch_name.is_none());
    }
}
