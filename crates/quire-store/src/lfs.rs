//! Git LFS pointer parsing and read-time resolution.
//!
//! A pointer file stands in for large content stored on an LFS server:
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393
//! size 12345
//! ```
//!
//! Resolution replaces pointer buffers with the downloaded content in the
//! returned map only. Nothing is written back to the working copy.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use quire_types::{BufferPath, GitAuthentication};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

const POINTER_VERSION: &str = "https://git-lfs.github.com/spec/v1";
const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Pointer files are small; anything larger is real content.
const MAX_POINTER_SIZE: usize = 1024;

/// A parsed Git LFS pointer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfsPointer {
    /// Hex-encoded SHA-256 of the content.
    pub oid: String,
    pub size: u64,
}

impl LfsPointer {
    /// Parse `content` as an LFS pointer. Returns `None` for regular content.
    pub fn parse(content: &[u8]) -> Option<Self> {
        if content.len() > MAX_POINTER_SIZE {
            return None;
        }
        let text = std::str::from_utf8(content).ok()?;
        let mut lines = text.lines();

        let version = lines.next()?.strip_prefix("version ")?;
        if version.trim() != POINTER_VERSION {
            return None;
        }

        let mut oid = None;
        let mut size = None;
        for line in lines {
            if let Some(value) = line.strip_prefix("oid sha256:") {
                let value = value.trim();
                if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
                    oid = Some(value.to_ascii_lowercase());
                }
            } else if let Some(value) = line.strip_prefix("size ") {
                size = value.trim().parse().ok();
            }
        }

        Some(Self {
            oid: oid?,
            size: size?,
        })
    }

    /// Render the pointer in canonical form.
    pub fn to_pointer_text(&self) -> String {
        format!(
            "version {POINTER_VERSION}\noid sha256:{}\nsize {}\n",
            self.oid, self.size
        )
    }

    /// Returns `true` if `content` hashes to this pointer's oid and size.
    pub fn matches(&self, content: &[u8]) -> bool {
        content.len() as u64 == self.size && hex::encode(Sha256::digest(content)) == self.oid
    }
}

/// Strategy for fetching LFS content.
#[async_trait]
pub trait LfsResolver: Send + Sync {
    /// Fetch the content a pointer refers to.
    async fn resolve(&self, pointer: &LfsPointer) -> StoreResult<Bytes>;
}

/// Replace every LFS pointer in `buffers` with its resolved content.
///
/// A pointer that fails to resolve is left in place and logged.
pub async fn resolve_lfs_pointers(
    buffers: BTreeMap<BufferPath, Bytes>,
    resolver: &dyn LfsResolver,
) -> BTreeMap<BufferPath, Bytes> {
    let mut resolved = BTreeMap::new();
    for (path, content) in buffers {
        let Some(pointer) = LfsPointer::parse(&content) else {
            resolved.insert(path, content);
            continue;
        };
        match resolver.resolve(&pointer).await {
            Ok(data) => {
                debug!(path = %path, size = pointer.size, "resolved LFS pointer");
                resolved.insert(path, data);
            }
            Err(e) => {
                warn!(path = %path, oid = %pointer.oid, error = %e, "failed to resolve LFS pointer");
                resolved.insert(path, content);
            }
        }
    }
    resolved
}

// ---------------------------------------------------------------
// HTTP batch API
// ---------------------------------------------------------------

#[derive(Serialize)]
struct BatchRequest<'a> {
    operation: &'static str,
    transfers: [&'static str; 1],
    objects: [&'a LfsPointer; 1],
}

#[derive(Deserialize)]
struct BatchResponse {
    objects: Vec<BatchObject>,
}

#[derive(Deserialize)]
struct BatchObject {
    oid: String,
    #[serde(default)]
    actions: Option<BatchActions>,
    #[serde(default)]
    error: Option<BatchError>,
}

#[derive(Deserialize)]
struct BatchActions {
    download: Option<BatchAction>,
}

#[derive(Deserialize)]
struct BatchAction {
    href: String,
    #[serde(default)]
    header: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct BatchError {
    code: u16,
    message: String,
}

/// [`LfsResolver`] speaking the Git LFS batch download API over HTTP(S).
pub struct HttpLfsResolver {
    endpoint: String,
    auth: GitAuthentication,
    client: reqwest::Client,
}

impl HttpLfsResolver {
    /// Create a resolver for an explicit LFS endpoint (`…/info/lfs`).
    pub fn new(endpoint: impl Into<String>, auth: GitAuthentication) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
            client: reqwest::Client::new(),
        }
    }

    /// Create a resolver for the default LFS endpoint of a Git remote.
    pub fn for_remote(remote_url: &str, auth: GitAuthentication) -> Self {
        let base = remote_url.trim_end_matches('/');
        let endpoint = if base.ends_with(".git") {
            format!("{base}/info/lfs")
        } else {
            format!("{base}.git/info/lfs")
        };
        Self::new(endpoint, auth)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth.username {
            Some(username) => request.basic_auth(username, self.auth.password.as_ref()),
            None => request,
        }
    }

    async fn download_action(&self, pointer: &LfsPointer) -> StoreResult<BatchAction> {
        let body = BatchRequest {
            operation: "download",
            transfers: ["basic"],
            objects: [pointer],
        };
        let request = self
            .client
            .post(format!("{}/objects/batch", self.endpoint))
            .header(reqwest::header::ACCEPT, LFS_MEDIA_TYPE)
            .header(reqwest::header::CONTENT_TYPE, LFS_MEDIA_TYPE)
            .json(&body);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Lfs(format!("batch request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StoreError::Lfs(format!(
                "batch request returned {}",
                response.status()
            )));
        }

        let batch: BatchResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Lfs(format!("invalid batch response: {e}")))?;

        let object = batch
            .objects
            .into_iter()
            .find(|o| o.oid == pointer.oid)
            .ok_or_else(|| StoreError::Lfs(format!("object {} missing from batch response", pointer.oid)))?;

        if let Some(error) = object.error {
            return Err(StoreError::Lfs(format!(
                "server error {} for {}: {}",
                error.code, pointer.oid, error.message
            )));
        }

        object
            .actions
            .and_then(|a| a.download)
            .ok_or_else(|| StoreError::Lfs(format!("no download action for {}", pointer.oid)))
    }
}

#[async_trait]
impl LfsResolver for HttpLfsResolver {
    async fn resolve(&self, pointer: &LfsPointer) -> StoreResult<Bytes> {
        let action = self.download_action(pointer).await?;

        let mut request = self.client.get(&action.href);
        for (name, value) in &action.header {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Lfs(format!("download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(StoreError::Lfs(format!(
                "download of {} returned {}",
                pointer.oid,
                response.status()
            )));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| StoreError::Lfs(format!("download interrupted: {e}")))?;

        if !pointer.matches(&content) {
            return Err(StoreError::Lfs(format!(
                "downloaded content does not match {}",
                pointer.oid
            )));
        }
        Ok(content)
    }
}

impl std::fmt::Debug for HttpLfsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLfsResolver")
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_OID: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn pointer_text(oid: &str, size: u64) -> String {
        format!("version {POINTER_VERSION}\noid sha256:{oid}\nsize {size}\n")
    }

    struct FixedResolver;

    #[async_trait]
    impl LfsResolver for FixedResolver {
        async fn resolve(&self, pointer: &LfsPointer) -> StoreResult<Bytes> {
            if pointer.oid == HELLO_OID {
                Ok(Bytes::from_static(b"hello"))
            } else {
                Err(StoreError::Lfs("unknown object".into()))
            }
        }
    }

    #[test]
    fn parses_canonical_pointer() {
        let pointer = LfsPointer::parse(pointer_text(HELLO_OID, 5).as_bytes()).unwrap();
        assert_eq!(pointer.oid, HELLO_OID);
        assert_eq!(pointer.size, 5);
        assert_eq!(pointer.to_pointer_text(), pointer_text(HELLO_OID, 5));
    }

    #[test]
    fn regular_content_is_not_a_pointer() {
        assert!(LfsPointer::parse(b"just some text").is_none());
        assert!(LfsPointer::parse(b"version https://example.org\noid sha256:00\nsize 1").is_none());
        assert!(LfsPointer::parse(&[0xff, 0xfe]).is_none());
    }

    #[test]
    fn pointer_verifies_content_hash() {
        let pointer = LfsPointer {
            oid: HELLO_OID.into(),
            size: 5,
        };
        assert!(pointer.matches(b"hello"));
        assert!(!pointer.matches(b"hellO"));
    }

    #[test]
    fn endpoint_for_remote_appends_git_suffix() {
        let resolver = HttpLfsResolver::for_remote("https://example.org/org/repo", GitAuthentication::anonymous());
        assert_eq!(resolver.endpoint(), "https://example.org/org/repo.git/info/lfs");
        let resolver = HttpLfsResolver::for_remote("https://example.org/org/repo.git/", GitAuthentication::anonymous());
        assert_eq!(resolver.endpoint(), "https://example.org/org/repo.git/info/lfs");
    }

    #[tokio::test]
    async fn resolution_replaces_pointers_and_keeps_failures() {
        let mut buffers = BTreeMap::new();
        let good = BufferPath::new("big/image.bin").unwrap();
        let bad = BufferPath::new("big/other.bin").unwrap();
        let plain = BufferPath::new("small.txt").unwrap();
        let bad_pointer = pointer_text(&"0".repeat(64), 3);
        buffers.insert(good.clone(), Bytes::from(pointer_text(HELLO_OID, 5)));
        buffers.insert(bad.clone(), Bytes::from(bad_pointer.clone()));
        buffers.insert(plain.clone(), Bytes::from_static(b"plain"));

        let resolved = resolve_lfs_pointers(buffers, &FixedResolver).await;
        assert_eq!(resolved[&good], Bytes::from_static(b"hello"));
        assert_eq!(resolved[&bad], Bytes::from(bad_pointer));
        assert_eq!(resolved[&plain], Bytes::from_static(b"plain"));
    }
}
