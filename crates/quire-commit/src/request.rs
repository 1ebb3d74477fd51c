use serde::{Deserialize, Serialize};

use quire_types::{Author, BufferChangeset};

/// A request to apply a changeset as a single commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitRequest {
    pub author: Author,
    pub message: String,
    pub changeset: BufferChangeset,
    /// Skip checks of unspecified reference values. Paths with a reference
    /// value are still compared against current content.
    #[serde(default)]
    pub skip_validation: bool,
}

impl CommitRequest {
    pub fn new(author: Author, message: impl Into<String>, changeset: BufferChangeset) -> Self {
        Self {
            author,
            message: message.into(),
            changeset,
            skip_validation: false,
        }
    }

    /// Accept changes without reference values.
    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }
}
