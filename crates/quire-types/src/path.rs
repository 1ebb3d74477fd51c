use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Root-relative, slash-separated path of a buffer in a working copy.
///
/// Paths are normalized on construction: a leading slash is stripped,
/// backslashes become slashes, and empty segments collapse. `.` and `..`
/// segments are rejected so a `BufferPath` can never escape the working copy.
///
/// The empty path is the repository root and is only available through
/// [`BufferPath::root`]; parsing an empty string fails.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BufferPath(String);

impl BufferPath {
    /// Parse and normalize a buffer path.
    pub fn new(raw: &str) -> Result<Self, TypeError> {
        let normalized = normalize(raw)?;
        if normalized.is_empty() {
            return Err(invalid(raw, "path must not be empty"));
        }
        Ok(Self(normalized))
    }

    /// Parse a subtree root. Unlike [`BufferPath::new`], `""` and `"/"` are
    /// accepted and denote the repository root.
    pub fn parse_root(raw: &str) -> Result<Self, TypeError> {
        Ok(Self(normalize(raw)?))
    }

    /// The repository root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns `true` for the repository root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a relative path below this one.
    pub fn join(&self, child: &str) -> Result<Self, TypeError> {
        let child = normalize(child)?;
        if child.is_empty() {
            return Ok(self.clone());
        }
        if self.is_root() {
            return Ok(Self(child));
        }
        Ok(Self(format!("{}/{}", self.0, child)))
    }

    /// The containing directory. The root has no parent; top-level paths
    /// have the root as their parent.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Last segment of the path.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Returns `true` if this path equals `root` or lies beneath it.
    pub fn is_within(&self, root: &BufferPath) -> bool {
        self.strip_root(root).is_some()
    }

    /// The portion of this path below `root`, or `None` if it lies elsewhere.
    /// A path equal to `root` yields `""`.
    pub fn strip_root(&self, root: &BufferPath) -> Option<&str> {
        if root.is_root() {
            return Some(&self.0);
        }
        if self.0 == root.0 {
            return Some("");
        }
        self.0
            .strip_prefix(root.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Move this path from beneath `old_root` to beneath `new_root`.
    pub fn rebase(&self, old_root: &BufferPath, new_root: &BufferPath) -> Option<BufferPath> {
        let rest = self.strip_root(old_root)?;
        new_root.join(rest).ok()
    }

    /// Filesystem location of this buffer inside a working copy.
    pub fn to_fs_path(&self, workdir: &Path) -> PathBuf {
        let mut path = workdir.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }

    /// Build a buffer path from a path relative to the working copy.
    pub fn from_relative_fs_path(relative: &Path) -> Result<Self, TypeError> {
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(s) => segments.push(s.to_string()),
                    None => {
                        return Err(invalid(
                            &relative.to_string_lossy(),
                            "path is not valid UTF-8",
                        ))
                    }
                },
                Component::CurDir => {}
                _ => {
                    return Err(invalid(
                        &relative.to_string_lossy(),
                        "path must be relative to the working copy",
                    ))
                }
            }
        }
        Self::new(&segments.join("/"))
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

fn normalize(raw: &str) -> Result<String, TypeError> {
    if raw.contains('\0') {
        return Err(invalid(raw, "path must not contain NUL"));
    }
    let unified = raw.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" => continue,
            "." | ".." => return Err(invalid(raw, "relative segments are not allowed")),
            git if git.eq_ignore_ascii_case(".git") => {
                return Err(invalid(raw, "repository metadata is not a buffer"))
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

fn invalid(path: &str, reason: &str) -> TypeError {
    TypeError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

impl fmt::Debug for BufferPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferPath({:?})", self.0)
    }
}

impl fmt::Display for BufferPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl TryFrom<String> for BufferPath {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_root(&value)
    }
}

impl TryFrom<&str> for BufferPath {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BufferPath> for String {
    fn from(path: BufferPath) -> Self {
        path.0
    }
}

impl AsRef<str> for BufferPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
