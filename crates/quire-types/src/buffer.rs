use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::path::BufferPath;

/// Current content of a set of buffers. `None` marks an absent buffer.
pub type BufferDataset = BTreeMap<BufferPath, Option<Bytes>>;

/// A set of buffer changes, keyed by path. Paths not present are never touched.
pub type BufferChangeset = BTreeMap<BufferPath, BufferChange>;

/// What the caller believes a buffer contains before a change is applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum ExpectedValue {
    /// No reference value was supplied; the path cannot be validated.
    #[default]
    Unspecified,
    /// The caller believes the buffer does not exist.
    Absent,
    /// The caller believes the buffer holds exactly these bytes.
    Content(Bytes),
}

impl ExpectedValue {
    /// The expected content, or `None` when unspecified.
    pub fn as_reference(&self) -> Option<Option<&Bytes>> {
        match self {
            ExpectedValue::Unspecified => None,
            ExpectedValue::Absent => Some(None),
            ExpectedValue::Content(bytes) => Some(Some(bytes)),
        }
    }
}

impl From<Option<Bytes>> for ExpectedValue {
    fn from(value: Option<Bytes>) -> Self {
        match value {
            Some(bytes) => ExpectedValue::Content(bytes),
            None => ExpectedValue::Absent,
        }
    }
}

/// A single buffer change: expected prior content and new content.
///
/// `new_value = None` deletes the buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferChange {
    #[serde(default)]
    pub old_value: ExpectedValue,
    pub new_value: Option<Bytes>,
    /// Declared encoding of `new_value`; see [`BufferEncoding`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl BufferChange {
    /// Create a buffer that is expected not to exist yet.
    pub fn create(new_value: impl Into<Bytes>) -> Self {
        Self {
            old_value: ExpectedValue::Absent,
            new_value: Some(new_value.into()),
            encoding: None,
        }
    }

    /// Replace known content.
    pub fn update(old_value: impl Into<Bytes>, new_value: impl Into<Bytes>) -> Self {
        Self {
            old_value: ExpectedValue::Content(old_value.into()),
            new_value: Some(new_value.into()),
            encoding: None,
        }
    }

    /// Delete a buffer with known content.
    pub fn delete(old_value: impl Into<Bytes>) -> Self {
        Self {
            old_value: ExpectedValue::Content(old_value.into()),
            new_value: None,
            encoding: None,
        }
    }

    /// Write content without a reference value.
    pub fn unchecked(new_value: Option<Bytes>) -> Self {
        Self {
            old_value: ExpectedValue::Unspecified,
            new_value,
            encoding: None,
        }
    }

    /// Set the declared encoding.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Returns `true` if this change removes the buffer.
    pub fn is_deletion(&self) -> bool {
        self.new_value.is_none()
    }
}

/// Encodings a changeset may declare. Buffers are always stored as raw
/// bytes; the encoding only constrains what a caller may submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferEncoding {
    Binary,
    Utf8,
}

impl FromStr for BufferEncoding {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(BufferEncoding::Binary),
            "utf-8" | "utf8" => Ok(BufferEncoding::Utf8),
            other => Err(TypeError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for BufferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferEncoding::Binary => write!(f, "binary"),
            BufferEncoding::Utf8 => write!(f, "utf-8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_value_reference_levels() {
        assert_eq!(ExpectedValue::Unspecified.as_reference(), None);
        assert_eq!(ExpectedValue::Absent.as_reference(), Some(None));
        let bytes = Bytes::from_static(b"x");
        assert_eq!(
            ExpectedValue::Content(bytes.clone()).as_reference(),
            Some(Some(&bytes))
        );
    }

    #[test]
    fn constructors_set_expected_values() {
        assert_eq!(BufferChange::create("a").old_value, ExpectedValue::Absent);
        assert!(BufferChange::delete("a").is_deletion());
        assert_eq!(
            BufferChange::unchecked(None).old_value,
            ExpectedValue::Unspecified
        );
    }

    #[test]
    fn encoding_parses_known_names() {
        assert_eq!("utf-8".parse::<BufferEncoding>(), Ok(BufferEncoding::Utf8));
        assert_eq!("UTF8".parse::<BufferEncoding>(), Ok(BufferEncoding::Utf8));
        assert_eq!("binary".parse::<BufferEncoding>(), Ok(BufferEncoding::Binary));
        assert_eq!(
            "latin1".parse::<BufferEncoding>(),
            Err(TypeError::UnsupportedEncoding("latin1".into()))
        );
    }

    #[test]
    fn missing_old_value_deserializes_as_unspecified() {
        let change: BufferChange = serde_json::from_str(r#"{"new_value":null}"#).unwrap();
        assert_eq!(change.old_value, ExpectedValue::Unspecified);
        assert!(change.is_deletion());
    }
}
