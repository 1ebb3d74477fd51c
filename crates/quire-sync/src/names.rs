//! Branch name and remote URL handling.

use reqwest::Url;

use crate::error::{SyncError, SyncResult};

/// Name of the single remote the worker manages.
pub const ORIGIN: &str = "origin";

const HEADS_PREFIX: &str = "refs/heads/";

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// Check `name` against git's branch naming rules.
///
/// ```
/// use quire_sync::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("feature/auth").is_ok());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> SyncResult<()> {
    let reject = |reason: String| {
        Err(SyncError::InvalidBranchName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("must not be empty".into());
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return reject(format!("contains forbidden character {ch:?}"));
    }
    for pattern in ["..", "@{", "//"] {
        if name.contains(pattern) {
            return reject(format!("must not contain {pattern:?}"));
        }
    }
    if name.starts_with(['.', '/']) || name.ends_with(['.', '/']) {
        return reject("must not start or end with '.' or '/'".into());
    }
    if name.ends_with(".lock") {
        return reject("must not end with '.lock'".into());
    }
    Ok(())
}

/// Full ref name of a local branch.
pub fn branch_ref(branch: &str) -> String {
    format!("{HEADS_PREFIX}{branch}")
}

/// Branch name of a `refs/heads/*` ref, if it is one.
pub fn branch_name(refname: &str) -> Option<&str> {
    refname.strip_prefix(HEADS_PREFIX)
}

/// Normalize a remote URL.
///
/// Trailing slashes are trimmed. HTTP(S) URLs get a `.git` suffix when they
/// lack one; other URLs (SSH, local paths) are otherwise left alone.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let is_http = trimmed.starts_with("http://") || trimmed.starts_with("https://");
    if is_http && !trimmed.ends_with(".git") {
        format!("{trimmed}.git")
    } else {
        trimmed.to_string()
    }
}

/// Host part of a URL, used as the credential lookup key.
pub fn remote_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_names() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("release/2024-01").is_ok());
        for bad in ["", "a b", "x..y", "a//b", "/main", "main.", "topic.lock", "a@{1}", "what?"] {
            assert!(validate_branch_name(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn normalizes_http_urls() {
        assert_eq!(normalize_url("https://example.org/repo/"), "https://example.org/repo.git");
        assert_eq!(normalize_url("https://example.org/repo.git"), "https://example.org/repo.git");
        assert_eq!(normalize_url("/srv/git/repo//"), "/srv/git/repo");
        assert_eq!(normalize_url("git@example.org:team/repo"), "git@example.org:team/repo");
    }

    #[test]
    fn host_extraction() {
        assert_eq!(remote_host("https://git.example.org/a/b.git").as_deref(), Some("git.example.org"));
        assert_eq!(remote_host("not a url"), None);
    }

    #[test]
    fn ref_names() {
        assert_eq!(branch_ref("main"), "refs/heads/main");
        assert_eq!(branch_name("refs/heads/feature/x"), Some("feature/x"));
        assert_eq!(branch_name("refs/tags/v1"), None);
    }
}
