//! Buffer reads against historical commits.

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use git2::{ErrorCode, ObjectType, Repository, Sort, Tree, TreeWalkMode, TreeWalkResult};
use quire_types::{BufferDataset, BufferPath, CommitHash};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::repo::{commit_hash, find_commit, head_commit, open_repository};

/// Read exactly `paths` as they were at `commit`. Missing buffers are `None`.
pub fn read_buffers_at_revision(
    workdir: &Path,
    commit: &CommitHash,
    paths: &[BufferPath],
) -> StoreResult<BufferDataset> {
    let repo = open_repository(workdir)?;
    let tree = find_commit(&repo, commit)?.tree()?;
    paths
        .iter()
        .map(|path| Ok((path.clone(), blob_at(&repo, &tree, path)?)))
        .collect()
}

/// Read every buffer at or below `root` as it was at `commit`.
pub fn read_tree_at_revision(
    workdir: &Path,
    commit: &CommitHash,
    root: &BufferPath,
) -> StoreResult<BTreeMap<BufferPath, Bytes>> {
    let repo = open_repository(workdir)?;
    let tree = find_commit(&repo, commit)?.tree()?;
    let buffers = tree_buffers(&repo, &tree, root)?;
    debug!(commit = %commit.short_hex(), root = %root, count = buffers.len(), "read tree at revision");
    Ok(buffers)
}

/// Every blob at or below `root` in `tree`.
pub fn tree_buffers(
    repo: &Repository,
    tree: &Tree<'_>,
    root: &BufferPath,
) -> StoreResult<BTreeMap<BufferPath, Bytes>> {
    let mut entries = Vec::new();
    let mut walk_error = None;

    tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() != Some(ObjectType::Blob) {
            return TreeWalkResult::Ok;
        }
        let Some(name) = entry.name() else {
            return TreeWalkResult::Skip;
        };
        match BufferPath::new(&format!("{dir}{name}")) {
            Ok(path) if path.is_within(root) => entries.push((path, entry.id())),
            Ok(_) => {}
            Err(e) => {
                walk_error = Some(e);
                return TreeWalkResult::Abort;
            }
        }
        TreeWalkResult::Ok
    })?;

    if let Some(e) = walk_error {
        return Err(e.into());
    }

    let mut buffers = BTreeMap::new();
    for (path, oid) in entries {
        let blob = repo.find_blob(oid)?;
        buffers.insert(path, Bytes::copy_from_slice(blob.content()));
    }
    Ok(buffers)
}

/// Content of the blob at `path` in `tree`, or `None` if absent or not a blob.
pub fn blob_at(repo: &Repository, tree: &Tree<'_>, path: &BufferPath) -> StoreResult<Option<Bytes>> {
    let entry = match tree.get_path(Path::new(path.as_str())) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if entry.kind() != Some(ObjectType::Blob) {
        return Ok(None);
    }
    let blob = repo.find_blob(entry.id())?;
    Ok(Some(Bytes::copy_from_slice(blob.content())))
}

/// Pick the most recent of `candidates`.
///
/// The first candidate reached walking back from HEAD wins. Candidates not
/// in HEAD's history are ranked by author time. Fails with `NotFound` when no
/// candidate resolves.
pub fn choose_most_recent_commit(
    workdir: &Path,
    candidates: &[CommitHash],
) -> StoreResult<CommitHash> {
    let repo = open_repository(workdir)?;

    let mut resolved = Vec::new();
    for candidate in candidates {
        match find_commit(&repo, candidate) {
            Ok(commit) => resolved.push((*candidate, commit.author().when().seconds())),
            Err(StoreError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    if resolved.is_empty() {
        return Err(StoreError::NotFound("none of the candidate commits".into()));
    }

    if let Some(head) = head_commit(&repo)? {
        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(head.id())?;
        for oid in walk {
            let hash = commit_hash(oid?)?;
            if resolved.iter().any(|(candidate, _)| *candidate == hash) {
                return Ok(hash);
            }
        }
    }

    resolved.sort_by_key(|(_, time)| std::cmp::Reverse(*time));
    Ok(resolved[0].0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::test_support::*;

    #[test]
    fn historical_reads_see_old_content() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_files(&repo, &[("a.txt", b"v1"), ("d/b.txt", b"b")], "first");
        commit_files(&repo, &[("a.txt", b"v2")], "second");

        let first = commit_hash(first).unwrap();
        let a = BufferPath::new("a.txt").unwrap();
        let missing = BufferPath::new("nope.txt").unwrap();
        let dataset = read_buffers_at_revision(dir.path(), &first, &[a.clone(), missing.clone()]).unwrap();
        assert_eq!(dataset[&a], Some(Bytes::from_static(b"v1")));
        assert_eq!(dataset[&missing], None);
    }

    #[test]
    fn tree_at_revision_is_scoped_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_files(&repo, &[("a.txt", b"a"), ("d/b.txt", b"b"), ("d/e/c.txt", b"c")], "first");
        let hash = commit_hash(oid).unwrap();

        let tree = read_tree_at_revision(dir.path(), &hash, &BufferPath::new("d").unwrap()).unwrap();
        let names: Vec<&str> = tree.keys().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["d/b.txt", "d/e/c.txt"]);
    }

    #[test]
    fn most_recent_commit_follows_history() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_hash(commit_files(&repo, &[("a.txt", b"1")], "1")).unwrap();
        let second = commit_hash(commit_files(&repo, &[("a.txt", b"2")], "2")).unwrap();
        let third = commit_hash(commit_files(&repo, &[("a.txt", b"3")], "3")).unwrap();

        assert_eq!(choose_most_recent_commit(dir.path(), &[first, second]).unwrap(), second);
        assert_eq!(choose_most_recent_commit(dir.path(), &[third, first]).unwrap(), third);
    }

    #[test]
    fn candidates_outside_history_rank_by_author_time() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_files(&repo, &[("a.txt", b"1")], "base");
        let tree = repo.find_commit(base).unwrap().tree().unwrap();

        let at = |seconds| git2::Signature::new("Test", "test@example.org", &git2::Time::new(seconds, 0)).unwrap();
        // Authored late, committed early.
        let authored_late = repo.commit(None, &at(2_000_000), &at(1_000_000), "late", &tree, &[]).unwrap();
        // Authored early, committed late.
        let committed_late = repo.commit(None, &at(1_000_000), &at(3_000_000), "early", &tree, &[]).unwrap();

        let candidates = [commit_hash(committed_late).unwrap(), commit_hash(authored_late).unwrap()];
        assert_eq!(
            choose_most_recent_commit(dir.path(), &candidates).unwrap(),
            commit_hash(authored_late).unwrap()
        );
    }

    #[test]
    fn most_recent_commit_requires_a_known_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_files(&repo, &[("a.txt", b"1")], "1");
        let unknown = CommitHash::from_raw([9; 20]);
        assert!(matches!(
            choose_most_recent_commit(dir.path(), &[unknown]),
            Err(StoreError::NotFound(_))
        ));
    }
}
