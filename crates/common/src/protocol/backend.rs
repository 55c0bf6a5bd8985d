// HTTP bodies exchanged with the repository backend.

use serde::{Deserialize, Serialize};

use crate::record::DedupedChange;

/// Reachability probe endpoint.
pub const REPOS_ROUTE: &str = "/repos";

/// `PUT /repo/{repo_id}/file` request body, also the shape of `GET` responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBody {
    pub path: String,
    pub content: String,
}

/// `POST /repo/{repo_id}/offline-commit` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineCommitRequest {
    pub changes: Vec<DedupedChange>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
}

/// `POST /repo/{repo_id}/offline-commit` response body.
///
/// `commit_hash` is `None` when the backend found nothing to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineCommitResponse {
    pub ok: bool,
    #[serde(default)]
    pub commit_hash: Option<String>,
}

/// Path segments below the base URL for a repository route.
pub fn file_route(repo_id: &str) -> [&str; 3] {
    ["repo", repo_id, "file"]
}

pub fn offline_commit_route(repo_id: &str) -> [&str; 3] {
    ["repo", repo_id, "offline-commit"]
}
