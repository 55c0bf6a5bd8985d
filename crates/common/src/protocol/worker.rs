// Messages understood by the background sync worker.

use serde::{Deserialize, Serialize};

/// Tag used when asking the environment to run a deferred sync.
pub const SYNC_TAG: &str = "reposync-sync";

/// Name of the process-wide pending-state change event.
pub const OFFLINE_UPDATED_EVENT: &str = "reposync:offline-updated";

/// Endpoint the background worker uses until it receives a `Config` message.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Commit message used by flushes started from the background worker.
pub const BACKGROUND_COMMIT_MESSAGE: &str = "Auto-sync from background";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Backend address for all subsequent network calls.
    Config {
        #[serde(rename = "apiBaseUrl")]
        api_base_url: String,
    },
    /// Sweep all repositories with pending edits now.
    TriggerSync,
    /// Deferred sync registered while offline; runs once connectivity returns.
    SyncRequested { tag: String },
}
