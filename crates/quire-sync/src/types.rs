use quire_types::CommitHash;
use serde::{Deserialize, Serialize};

/// HEAD before and after a pull. Equal when nothing was fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    pub oid_before_pull: Option<CommitHash>,
    pub oid_after_pull: Option<CommitHash>,
}

impl PullResult {
    pub fn changed(&self) -> bool {
        self.oid_before_pull != self.oid_after_pull
    }
}

/// What a remote looks like to the current credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescription {
    /// The remote advertises no refs at all.
    pub is_blank: bool,
    pub can_push: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_commit: Option<CommitHash>,
    pub available_branches: Vec<String>,
}
