//! Changeset conflict detection.
//!
//! A changeset carries, per path, what the caller believes the buffer holds.
//! Before anything is written those beliefs are checked against what the
//! working copy actually holds; any disagreement is a conflict.

use std::collections::BTreeSet;

use quire_types::{BufferChangeset, BufferDataset, BufferPath, ExpectedValue};
use tracing::debug;

use crate::error::{DiffError, DiffResult};

/// Compare a changeset's expected values against current content.
///
/// `current` must contain exactly the changeset's paths. For each path:
/// - an unspecified expected value fails with `MissingReference` when
///   `strict`, and is skipped otherwise;
/// - an expected value that differs from current content (including one
///   side being absent) marks the path as conflicting.
///
/// An empty result means the changeset is safe to apply.
pub fn find_conflicts(
    changeset: &BufferChangeset,
    current: &BufferDataset,
    strict: bool,
) -> DiffResult<BTreeSet<BufferPath>> {
    check_path_sets(changeset, current)?;

    let mut conflicts = BTreeSet::new();
    for (path, change) in changeset {
        let actual = current.get(path).and_then(|content| content.as_ref());
        let matches = match &change.old_value {
            ExpectedValue::Unspecified if strict => {
                return Err(DiffError::MissingReference(path.clone()));
            }
            ExpectedValue::Unspecified => continue,
            ExpectedValue::Absent => actual.is_none(),
            ExpectedValue::Content(expected) => actual == Some(expected),
        };
        if !matches {
            conflicts.insert(path.clone());
        }
    }

    if !conflicts.is_empty() {
        debug!(count = conflicts.len(), "changeset conflicts with current buffers");
    }
    Ok(conflicts)
}

fn check_path_sets(changeset: &BufferChangeset, current: &BufferDataset) -> DiffResult<()> {
    let missing: Vec<BufferPath> = changeset
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();
    let extra: Vec<BufferPath> = current
        .keys()
        .filter(|path| !changeset.contains_key(*path))
        .cloned()
        .collect();

    if missing.is_empty() && extra.is_empty() {
        Ok(())
    } else {
        Err(DiffError::PathSetMismatch { missing, extra })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use quire_types::BufferChange;

    fn path(s: &str) -> BufferPath {
        BufferPath::new(s).unwrap()
    }

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn matching_content_has_no_conflicts() {
        let mut changeset = BufferChangeset::new();
        changeset.insert(path("a"), BufferChange::update("old", "new"));
        changeset.insert(path("b"), BufferChange::create("fresh"));
        let mut current = BufferDataset::new();
        current.insert(path("a"), Some(bytes("old")));
        current.insert(path("b"), None);

        assert!(find_conflicts(&changeset, &current, true).unwrap().is_empty());
    }

    #[test]
    fn changed_content_conflicts() {
        let mut changeset = BufferChangeset::new();
        changeset.insert(path("a"), BufferChange::update("old", "new"));
        let mut current = BufferDataset::new();
        current.insert(path("a"), Some(bytes("someone else")));

        let conflicts = find_conflicts(&changeset, &current, true).unwrap();
        assert_eq!(conflicts.into_iter().collect::<Vec<_>>(), vec![path("a")]);
    }

    #[test]
    fn presence_mismatch_conflicts_both_ways() {
        let mut changeset = BufferChangeset::new();
        changeset.insert(path("created"), BufferChange::create("x"));
        changeset.insert(path("deleted"), BufferChange::delete("y"));
        let mut current = BufferDataset::new();
        current.insert(path("created"), Some(bytes("already here")));
        current.insert(path("deleted"), None);

        let conflicts = find_conflicts(&changeset, &current, true).unwrap();
        assert_eq!(conflicts.len(), 2);
    }

    #[test]
    fn unspecified_reference_is_strict_error() {
        let mut changeset = BufferChangeset::new();
        changeset.insert(path("a"), BufferChange::unchecked(Some(bytes("x"))));
        let mut current = BufferDataset::new();
        current.insert(path("a"), Some(bytes("anything")));

        assert!(matches!(
            find_conflicts(&changeset, &current, true),
            Err(DiffError::MissingReference(p)) if p == path("a")
        ));
        assert!(find_conflicts(&changeset, &current, false).unwrap().is_empty());
    }

    #[test]
    fn path_set_mismatch_is_rejected() {
        let mut changeset = BufferChangeset::new();
        changeset.insert(path("a"), BufferChange::create("x"));
        let mut current = BufferDataset::new();
        current.insert(path("b"), None);

        match find_conflicts(&changeset, &current, false) {
            Err(DiffError::PathSetMismatch { missing, extra }) => {
                assert_eq!(missing, vec![path("a")]);
                assert_eq!(extra, vec![path("b")]);
            }
            other => panic!("expected path set mismatch, got {other:?}"),
        }
    }

    fn content() -> impl Strategy<Value = Option<Vec<u8>>> {
        prop::option::of(prop::collection::vec(0u8..4, 0..3))
    }

    proptest! {
        /// No conflicts exactly when every expected value equals current content.
        #[test]
        fn conflicts_are_exactly_the_mismatches(
            entries in prop::collection::btree_map("[a-d]{1,2}", (content(), content()), 0..8)
        ) {
            let mut changeset = BufferChangeset::new();
            let mut current = BufferDataset::new();
            for (name, (expected, actual)) in &entries {
                let p = path(name);
                let change = BufferChange {
                    old_value: expected.clone().map(Bytes::from).into(),
                    new_value: None,
                    encoding: None,
                };
                changeset.insert(p.clone(), change);
                current.insert(p, actual.clone().map(Bytes::from));
            }

            let conflicts = find_conflicts(&changeset, &current, true).unwrap();
            for (name, (expected, actual)) in &entries {
                prop_assert_eq!(conflicts.contains(&path(name)), expected != actual);
            }
            prop_assert_eq!(
                conflicts.is_empty(),
                entries.values().all(|(expected, actual)| expected == actual)
            );
        }
    }
}
