use std::fmt;

use serde::{Deserialize, Serialize};

/// Credentials for a single remote operation. Never persisted by the worker.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl GitAuthentication {
    /// No credentials; suitable for public or local remotes.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Returns `true` when both username and password are present.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

impl fmt::Debug for GitAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitAuthentication")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let auth = GitAuthentication::new("ada", "hunter2");
        let printed = format!("{auth:?}");
        assert!(printed.contains("ada"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn anonymous_has_no_credentials() {
        assert!(!GitAuthentication::anonymous().has_credentials());
        assert!(GitAuthentication::new("a", "b").has_credentials());
    }
}
