use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity recorded as author and committer of new commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Returns `true` when both name and email are non-blank.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.email.trim().is_empty()
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_incomplete() {
        assert!(Author::new("Ada", "ada@example.org").is_complete());
        assert!(!Author::new("  ", "ada@example.org").is_complete());
        assert!(!Author::new("Ada", "").is_complete());
    }

    #[test]
    fn display_matches_git_format() {
        let author = Author::new("Ada", "ada@example.org");
        assert_eq!(author.to_string(), "Ada <ada@example.org>");
    }
}
