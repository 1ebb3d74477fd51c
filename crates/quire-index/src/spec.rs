//! Object specs: how buffers become objects.

use std::collections::BTreeMap;

use bytes::Bytes;
use quire_types::BufferPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexError, IndexResult};

/// Buffers of one object, keyed by path relative to the object path. A
/// single-buffer object is keyed by [`BufferPath::root`].
pub type ObjectBuffers = BTreeMap<BufferPath, Bytes>;

/// Expected and new value of one object. `None` means the object is absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
}

impl ObjectChange {
    pub fn create(new_value: Value) -> Self {
        Self {
            old_value: None,
            new_value: Some(new_value),
        }
    }

    pub fn update(old_value: Value, new_value: Value) -> Self {
        Self {
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    pub fn delete(old_value: Value) -> Self {
        Self {
            old_value: Some(old_value),
            new_value: None,
        }
    }
}

/// Object changes keyed by object path, relative to the dataset root.
pub type ObjectChangeset = BTreeMap<BufferPath, ObjectChange>;

/// Decode/encode rules for one kind of object in a dataset.
///
/// Paths are relative to the dataset root.
pub trait ObjectSpec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// The object a buffer belongs to, or `None` if this spec does not
    /// claim the buffer.
    fn object_path_for(&self, buffer_path: &BufferPath) -> Option<BufferPath>;

    fn decode(&self, object_path: &BufferPath, buffers: &ObjectBuffers) -> IndexResult<Value>;

    fn encode(&self, object_path: &BufferPath, value: &Value) -> IndexResult<ObjectBuffers>;
}

/// One JSON file per object, matched by extension below an optional prefix.
#[derive(Clone, Debug)]
pub struct JsonObjectSpec {
    prefix: BufferPath,
    extension: String,
}

impl JsonObjectSpec {
    /// Every `.json` buffer in the dataset.
    pub fn new() -> Self {
        Self {
            prefix: BufferPath::root(),
            extension: ".json".into(),
        }
    }

    pub fn under(mut self, prefix: BufferPath) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl Default for JsonObjectSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectSpec for JsonObjectSpec {
    fn name(&self) -> &str {
        "json"
    }

    fn object_path_for(&self, buffer_path: &BufferPath) -> Option<BufferPath> {
        (buffer_path.is_within(&self.prefix) && buffer_path.as_str().ends_with(&self.extension))
            .then(|| buffer_path.clone())
    }

    fn decode(&self, object_path: &BufferPath, buffers: &ObjectBuffers) -> IndexResult<Value> {
        let content = buffers.get(&BufferPath::root()).ok_or_else(|| IndexError::Decode {
            path: object_path.clone(),
            reason: "no buffer".into(),
        })?;
        serde_json::from_slice(content).map_err(|e| IndexError::Decode {
            path: object_path.clone(),
            reason: e.to_string(),
        })
    }

    fn encode(&self, _object_path: &BufferPath, value: &Value) -> IndexResult<ObjectBuffers> {
        let mut content = serde_json::to_vec_pretty(value)?;
        content.push(b'\n');
        Ok(BTreeMap::from([(BufferPath::root(), Bytes::from(content))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> BufferPath {
        BufferPath::new(s).unwrap()
    }

    #[test]
    fn matches_by_prefix_and_extension() {
        let spec = JsonObjectSpec::new().under(path("items"));
        assert_eq!(spec.object_path_for(&path("items/a.json")), Some(path("items/a.json")));
        assert_eq!(spec.object_path_for(&path("items/a.txt")), None);
        assert_eq!(spec.object_path_for(&path("other/a.json")), None);

        let custom = JsonObjectSpec::new().with_extension(".data");
        assert!(custom.object_path_for(&path("x.data")).is_some());
    }

    #[test]
    fn encoded_objects_decode_back() {
        let spec = JsonObjectSpec::new();
        let value = json!({ "t": 1, "name": "one" });
        let buffers = spec.encode(&path("a.json"), &value).unwrap();
        assert_eq!(spec.decode(&path("a.json"), &buffers).unwrap(), value);
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let spec = JsonObjectSpec::new();
        let buffers = BTreeMap::from([(BufferPath::root(), Bytes::from_static(b"{nope"))]);
        assert!(matches!(
            spec.decode(&path("a.json"), &buffers),
            Err(IndexError::Decode { .. })
        ));
    }
}
