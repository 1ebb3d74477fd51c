//! Credentials: the git2 callback for one remote operation, plus lookup of
//! saved passwords.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use git2::{Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};
use quire_types::GitAuthentication;
use tracing::debug;

use crate::names::{normalize_url, remote_host};

/// Build remote callbacks that answer credential requests from `auth`.
///
/// Plaintext credentials are offered once; a second request for the same
/// operation means the remote refused them and fails with an auth error
/// instead of looping. Without credentials, an SSH agent key or git's
/// default credential is tried.
pub fn remote_callbacks<'a>(auth: &GitAuthentication) -> RemoteCallbacks<'a> {
    let username = auth.username.clone();
    let password = auth.password.clone();
    let mut attempts = 0u32;

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > 1 {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Http,
                "remote rejected the supplied credentials",
            ));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let (Some(user), Some(pass)) = (username.as_deref(), password.as_deref()) {
                return Cred::userpass_plaintext(user, pass);
            }
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(user) = username_from_url.or(username.as_deref()) {
                return Cred::ssh_key_from_agent(user);
            }
        }
        Cred::default()
    });
    callbacks
}

/// Secret storage for remote passwords, keyed by service and account.
pub trait CredentialStore: Send + Sync {
    fn get_secret(&self, service: &str, account: &str) -> Option<String>;
    fn set_secret(&self, service: &str, account: &str, secret: &str);
}

/// Process-local [`CredentialStore`].
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    secrets: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get_secret(&self, service: &str, account: &str) -> Option<String> {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        secrets.get(&(service.to_string(), account.to_string())).cloned()
    }

    fn set_secret(&self, service: &str, account: &str, secret: &str) {
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        secrets.insert((service.to_string(), account.to_string()), secret.to_string());
    }
}

/// Look up the saved password for `username` at `remote_url`.
///
/// The remote's hostname is tried first, then the full normalized URL.
/// Returns credentials without a password when nothing is saved.
pub fn resolve_auth(store: &dyn CredentialStore, remote_url: &str, username: &str) -> GitAuthentication {
    let url = normalize_url(remote_url);
    let password = remote_host(&url)
        .and_then(|host| store.get_secret(&host, username))
        .or_else(|| store.get_secret(&url, username));
    debug!(url = %url, found = password.is_some(), "resolved saved credentials");
    GitAuthentication {
        username: Some(username.to_string()),
        password,
    }
}

/// Save `password` for `username` under the remote's hostname, or the full
/// URL when it has no parseable host.
pub fn save_auth(store: &dyn CredentialStore, remote_url: &str, username: &str, password: &str) {
    let url = normalize_url(remote_url);
    let service = remote_host(&url).unwrap_or(url);
    store.set_secret(&service, username, password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_password_is_found_by_host() {
        let store = InMemoryCredentialStore::new();
        save_auth(&store, "https://git.example.org/team/data", "ada", "s3cret");

        let auth = resolve_auth(&store, "https://git.example.org/other/repo.git", "ada");
        assert_eq!(auth.password.as_deref(), Some("s3cret"));
        assert!(auth.has_credentials());
    }

    #[test]
    fn falls_back_to_full_url() {
        let store = InMemoryCredentialStore::new();
        store.set_secret("https://git.example.org/team/data.git", "ada", "by-url");

        let auth = resolve_auth(&store, "https://git.example.org/team/data/", "ada");
        assert_eq!(auth.password.as_deref(), Some("by-url"));
    }

    #[test]
    fn unknown_account_has_no_password() {
        let store = InMemoryCredentialStore::new();
        save_auth(&store, "https://git.example.org/r", "ada", "x");
        let auth = resolve_auth(&store, "https://git.example.org/r", "grace");
        assert_eq!(auth.username.as_deref(), Some("grace"));
        assert!(auth.password.is_none());
    }
}
