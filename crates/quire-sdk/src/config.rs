use std::path::Path;

use quire_index::IndexConfig;
use quire_session::SessionConfig;
use quire_types::Author;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Top-level configuration, usually read from `quire.toml`.
///
/// Every section is optional; missing keys take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuireConfig {
    pub session: SessionConfig,
    pub author: AuthorConfig,
    pub index: IndexConfig,
    pub remote: RemoteConfig,
}

/// Default commit identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Branch created by `init`.
    pub default_branch: String,
    /// Account used to look up saved passwords when a call brings none.
    pub username: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            default_branch: "main".into(),
            username: None,
        }
    }
}

impl QuireConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> SdkResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// The configured author, if both name and email are set.
    pub fn author(&self) -> Option<Author> {
        match (&self.author.name, &self.author.email) {
            (Some(name), Some(email)) => Some(Author::new(name.as_str(), email.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = QuireConfig::default();
        assert_eq!(c.session.lock_timeout_ms, 60_000);
        assert_eq!(c.session.max_pending, 100);
        assert_eq!(c.index.progress_interval, 100);
        assert_eq!(c.remote.default_branch, "main");
        assert!(c.author().is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = QuireConfig::from_toml_str(
            r#"
            [author]
            name = "Ada"
            email = "ada@example.org"

            [session]
            lock_timeout_ms = 500

            [index]
            cache_dir = "/var/cache/quire"
            "#,
        )
        .unwrap();
        assert_eq!(c.session.lock_timeout_ms, 500);
        assert_eq!(c.session.max_pending, 100);
        assert_eq!(c.index.cache_dir.as_deref(), Some(Path::new("/var/cache/quire")));
        assert_eq!(c.author(), Some(Author::new("Ada", "ada@example.org")));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            QuireConfig::from_toml_str("[session]\nlock_timeout_ms = \"soon\""),
            Err(SdkError::Config(_))
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = QuireConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(c, QuireConfig::default());
    }

    #[test]
    fn toml_round_trip() {
        let mut c = QuireConfig::default();
        c.remote.username = Some("ada".into());
        let text = c.to_toml_string().unwrap();
        assert_eq!(QuireConfig::from_toml_str(&text).unwrap(), c);
    }
}
