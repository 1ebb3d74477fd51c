use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for [`RepoSession`](crate::RepoSession).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long an operation waits for the working copy before giving up.
    pub lock_timeout_ms: u64,
    /// Acquisitions allowed to wait at once; further ones fail with `LockBusy`.
    pub max_pending: usize,
    /// Minimum spacing of consecutive busy status updates.
    pub status_throttle_ms: u64,
    /// Capacity of the status broadcast channel.
    pub status_channel_capacity: usize,
}

impl SessionConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn status_throttle(&self) -> Duration {
        Duration::from_millis(self.status_throttle_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 60_000,
            max_pending: 100,
            status_throttle_ms: 100,
            status_channel_capacity: 64,
        }
    }
}
