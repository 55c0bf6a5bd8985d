// Flush protocol: reconcile one repository's pending log with the backend.
//
// Batch commit first; if that fails, per-file writes in dedupe order. Only
// the entries that were actually sent are acknowledged, so edits queued by
// another context while the requests were in flight stay in the log.

use serde::Serialize;
use tracing::{debug, info, warn};

use reposync_common::protocol::backend::{FileBody, OfflineCommitRequest};
use reposync_common::protocol::worker::BACKGROUND_COMMIT_MESSAGE;
use reposync_common::record::dedupe;

use crate::backend::{Backend, BackendError};
use crate::connectivity::Connectivity;
use crate::store::OfflineStore;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Offline edits sync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOptions {
    pub message: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self { message: DEFAULT_COMMIT_MESSAGE.to_string(), author_name: None, author_email: None }
    }
}

impl FlushOptions {
    /// Options used by flushes the background worker starts on its own.
    pub fn background() -> Self {
        Self { message: BACKGROUND_COMMIT_MESSAGE.to_string(), ..Self::default() }
    }
}

/// Result of a flush that did not fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushOutcome {
    pub ok: bool,
    /// Something was sent to the backend.
    pub synced: bool,
    /// The batch commit endpoint accepted the changes.
    pub committed: bool,
    /// Paths sent, one per distinct path.
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

impl FlushOutcome {
    fn nothing_to_sync() -> Self {
        Self { ok: true, ..Self::default() }
    }
}

#[derive(Debug)]
pub enum FlushError {
    /// The connectivity check said offline; nothing was touched.
    Offline,
    /// Both the batch commit and a per-file write failed. The log is intact.
    Backend { repo_id: String, path: String, source: BackendError },
    Storage(anyhow::Error),
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "cannot sync offline edits while offline"),
            Self::Backend { repo_id, path, source } => {
                write!(f, "failed to sync `{path}` in repository `{repo_id}`: {source}")
            }
            Self::Storage(error) => write!(f, "offline storage error: {error:#}"),
        }
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Offline => None,
            Self::Backend { source, .. } => Some(source),
            Self::Storage(error) => Some(&**error),
        }
    }
}

/// One entry of a flush-all sweep.
#[derive(Debug)]
pub struct RepoFlushReport {
    pub repo_id: String,
    pub result: Result<FlushOutcome, FlushError>,
}

/// Flush one repository's pending log.
pub async fn flush_repo<B: Backend>(
    store: &OfflineStore,
    backend: &B,
    connectivity: &Connectivity,
    repo_id: &str,
    options: &FlushOptions,
) -> Result<FlushOutcome, FlushError> {
    if !connectivity.is_online() {
        return Err(FlushError::Offline);
    }

    let record = store.read(repo_id).await.map_err(FlushError::Storage)?;
    let Some(through) = record.last_seq() else {
        debug!(repo_id, "no pending offline edits");
        return Ok(FlushOutcome::nothing_to_sync());
    };

    let changes = dedupe(&record.pending_commits);
    let files: Vec<String> = changes.iter().map(|change| change.path.clone()).collect();
    let request = OfflineCommitRequest {
        changes,
        message: options.message.clone(),
        author_name: options.author_name.clone(),
        author_email: options.author_email.clone(),
    };

    let mut commit_hash = None;
    let committed = match backend.offline_commit(repo_id, &request).await {
        Ok(response) if response.ok => {
            commit_hash = response.commit_hash;
            true
        }
        Ok(_) => {
            warn!(repo_id, "offline commit not accepted; falling back to per-file writes");
            false
        }
        Err(error) => {
            warn!(repo_id, error = %error, "offline commit failed; falling back to per-file writes");
            false
        }
    };

    if !committed {
        for change in request.changes {
            let body = FileBody { path: change.path, content: change.content };
            if let Err(source) = backend.put_file(repo_id, &body).await {
                return Err(FlushError::Backend {
                    repo_id: repo_id.to_string(),
                    path: body.path,
                    source,
                });
            }
        }
    }

    let acknowledged = store
        .update(repo_id, move |record| record.acknowledge_through(through))
        .await
        .map_err(FlushError::Storage)?;

    info!(repo_id, files = files.len(), acknowledged, committed, "offline edits synced");
    Ok(FlushOutcome { ok: true, synced: true, committed, files, commit_hash })
}

/// Flush every repository with pending edits. A failure in one repository
/// never prevents the others from being attempted.
pub async fn flush_all<B: Backend>(
    store: &OfflineStore,
    backend: &B,
    connectivity: &Connectivity,
    options: &FlushOptions,
) -> anyhow::Result<Vec<RepoFlushReport>> {
    let repo_ids = store.repo_ids_with_pending().await?;
    let mut reports = Vec::with_capacity(repo_ids.len());

    for repo_id in repo_ids {
        let result = flush_repo(store, backend, connectivity, &repo_id, options).await;
        if let Err(error) = &result {
            warn!(repo_id = %repo_id, error = %error, "offline flush failed");
        }
        reports.push(RepoFlushReport { repo_id, result });
    }

    Ok(reports)
}

/// Join the failures of one sweep into a single message.
pub fn failure_summary(reports: &[RepoFlushReport]) -> Option<String> {
    let messages: Vec<String> = reports
        .iter()
        .filter_map(|report| report.result.as_ref().err())
        .map(ToString::to_string)
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_foreground_message() {
        assert_eq!(FlushOptions::default().message, "Offline edits sync");
        assert_eq!(FlushOptions::background().message, "Auto-sync from background");
    }

    #[test]
    fn offline_error_message() {
        assert_eq!(FlushError::Offline.to_string(), "cannot sync offline edits while offline");
    }

    #[test]
    fn summary_joins_failures_only() {
        let reports = vec![
            RepoFlushReport { repo_id: "a".into(), result: Err(FlushError::Offline) },
            RepoFlushReport {
                repo_id: "b".into(),
                result: Ok(FlushOutcome::nothing_to_sync()),
            },
            RepoFlushReport {
                repo_id: "c".into(),
                result: Err(FlushError::Backend {
                    repo_id: "c".into(),
                    path: "x.txt".into(),
                    source: BackendError::network("connection refused"),
                }),
            },
        ];

        assert_eq!(
            failure_summary(&reports).as_deref(),
            Some(
                "cannot sync offline edits while offline; failed to sync `x.txt` in repository \
                 `c`: backend unreachable: connection refused"
            )
        );
        assert_eq!(failure_summary(&reports[1..2]), None);
    }

    #[test]
    fn outcome_serializes_without_empty_hash() {
        let value = serde_json::to_value(FlushOutcome::nothing_to_sync()).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({ "ok": true, "synced": false, "committed": false, "files": [] })
        );
    }
}
