use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::path::BufferPath;

/// Identifier of a Git commit (20-byte SHA-1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash([u8; 20]);

impl CommitHash {
    /// Create a `CommitHash` from raw object id bytes.
    pub fn from_raw(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Create a `CommitHash` from a byte slice of length 20.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != 20 {
            return Err(TypeError::InvalidLength {
                expected: 20,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// The raw 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 7 characters, as git prints it).
    pub fn short_hex(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(7);
        s
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitHash({})", self.short_hex())
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for CommitHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<CommitHash> for String {
    fn from(hash: CommitHash) -> Self {
        hash.to_hex()
    }
}

/// Result of applying a changeset or a tree operation.
///
/// Exactly one of these holds:
/// - a new commit was created (`new_commit_hash` is set);
/// - the changeset conflicted with current content (`conflicts` is non-empty);
/// - nothing changed (neither is set).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub new_commit_hash: Option<CommitHash>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicts: BTreeSet<BufferPath>,
}

impl CommitOutcome {
    pub fn committed(hash: CommitHash) -> Self {
        Self {
            new_commit_hash: Some(hash),
            conflicts: BTreeSet::new(),
        }
    }

    pub fn conflicted(conflicts: BTreeSet<BufferPath>) -> Self {
        Self {
            new_commit_hash: None,
            conflicts,
        }
    }

    /// The working copy already matched the requested state; no commit was made.
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn is_committed(&self) -> bool {
        self.new_commit_hash.is_some()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_unchanged(&self) -> bool {
        self.new_commit_hash.is_none() && self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn hex_roundtrip() {
        let hash = CommitHash::from_hex(HEX).unwrap();
        assert_eq!(hash.to_hex(), HEX);
        assert_eq!(hash.short_hex(), "0123456");
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            CommitHash::from_hex("abcd"),
            Err(TypeError::InvalidLength {
                expected: 20,
                actual: 2
            })
        );
        assert!(matches!(
            CommitHash::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_as_hex_string() {
        let hash = CommitHash::from_hex(HEX).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{HEX}\""));
    }

    #[test]
    fn outcome_states_are_exclusive() {
        let hash = CommitHash::from_raw([1; 20]);
        assert!(CommitOutcome::committed(hash).is_committed());
        assert!(!CommitOutcome::committed(hash).is_unchanged());

        let mut conflicts = BTreeSet::new();
        conflicts.insert(BufferPath::new("a").unwrap());
        let outcome = CommitOutcome::conflicted(conflicts);
        assert!(outcome.has_conflicts());
        assert!(!outcome.is_committed());

        assert!(CommitOutcome::unchanged().is_unchanged());
    }
}
