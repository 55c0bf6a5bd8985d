// Application-facing facade over the offline pipeline.
//
// Every path is normalized before it reaches the store or the backend, so a
// rejected path writes nothing.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use reposync_common::path::normalize_path;
use reposync_common::protocol::backend::FileBody;
use reposync_common::protocol::worker::SYNC_TAG;
use reposync_common::record::{PendingEdit, MAX_PENDING};

use crate::background::{NoopRegistrar, SyncRegistrar};
use crate::backend::Backend;
use crate::bus::{OfflineUpdate, Subscription};
use crate::connectivity::Connectivity;
use crate::flush::{self, FlushError, FlushOptions, FlushOutcome, RepoFlushReport};
use crate::store::OfflineStore;

/// How a save was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// Written to the backend directly.
    Saved,
    /// Queued for a later flush. `error` carries the failure that forced the
    /// fallback, if any.
    Queued { error: Option<String> },
}

/// Where a queued edit landed in the pending log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueuedEdit {
    pub seq: u64,
    /// Log length after the append.
    pub pending: usize,
    /// Oldest entries discarded to stay within the log bound.
    pub dropped: usize,
}

/// Content returned by [`OfflineEditor::load_file`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedFile {
    pub content: String,
    /// Served from local state rather than the backend: the cache while
    /// offline, or a queued edit that the backend has not seen yet.
    pub offline: bool,
}

pub struct OfflineEditor<B, R = NoopRegistrar> {
    store: OfflineStore,
    backend: Arc<B>,
    connectivity: Connectivity,
    registrar: R,
}

impl<B: Backend> OfflineEditor<B, NoopRegistrar> {
    pub fn new(store: OfflineStore, backend: Arc<B>, connectivity: Connectivity) -> Self {
        Self { store, backend, connectivity, registrar: NoopRegistrar }
    }
}

impl<B: Backend, R: SyncRegistrar> OfflineEditor<B, R> {
    /// Swap in a background registrar.
    pub fn with_registrar<R2: SyncRegistrar>(self, registrar: R2) -> OfflineEditor<B, R2> {
        OfflineEditor {
            store: self.store,
            backend: self.backend,
            connectivity: self.connectivity,
            registrar,
        }
    }

    pub fn store(&self) -> &OfflineStore {
        &self.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    // ── Cache ──────────────────────────────────────────────────────

    pub async fn cache_read(&self, repo_id: &str, path: &str) -> Result<Option<String>> {
        let path = normalize_path(path)?;
        let record = self.store.read(repo_id).await?;
        Ok(record.files.get(&path).cloned())
    }

    /// Update the cache only; nothing is queued.
    pub async fn cache_write(&self, repo_id: &str, path: &str, content: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let content = content.to_string();
        self.store.update(repo_id, move |record| record.cache(path, content)).await
    }

    // ── Pending log ────────────────────────────────────────────────

    /// Record an offline edit and ask for a background sync.
    pub async fn queue_edit(&self, repo_id: &str, path: &str, content: &str) -> Result<QueuedEdit> {
        let path = normalize_path(path)?;
        let content = content.to_string();
        let logged_path = path.clone();
        let queued = self
            .store
            .update(repo_id, move |record| {
                let seq = record.next_seq;
                let dropped = record.append(path, content, Utc::now());
                QueuedEdit { seq, pending: record.pending_commits.len(), dropped }
            })
            .await
            .with_context(|| format!("failed to queue offline edit for `{logged_path}`"))?;

        if queued.dropped > 0 {
            warn!(repo_id, dropped = queued.dropped, limit = MAX_PENDING, "pending log full, oldest edits discarded");
        }
        debug!(repo_id, path = %logged_path, "offline edit queued");

        if let Err(error) = self.registrar.register(SYNC_TAG) {
            debug!(error = %format!("{error:#}"), "background sync registration failed");
        }
        Ok(queued)
    }

    pub async fn has_pending(&self, repo_id: &str) -> Result<bool> {
        Ok(self.store.read(repo_id).await?.has_pending())
    }

    pub async fn list_pending(&self, repo_id: &str) -> Result<Vec<PendingEdit>> {
        Ok(self.store.read(repo_id).await?.pending_commits)
    }

    pub async fn repos_with_pending(&self) -> Result<Vec<String>> {
        self.store.repo_ids_with_pending().await
    }

    // ── Flush ──────────────────────────────────────────────────────

    pub async fn flush(
        &self,
        repo_id: &str,
        options: &FlushOptions,
    ) -> Result<FlushOutcome, FlushError> {
        flush::flush_repo(&self.store, self.backend.as_ref(), &self.connectivity, repo_id, options)
            .await
    }

    pub async fn flush_all(&self, options: &FlushOptions) -> Result<Vec<RepoFlushReport>> {
        flush::flush_all(&self.store, self.backend.as_ref(), &self.connectivity, options).await
    }

    // ── Notifications ──────────────────────────────────────────────

    pub fn subscribe(&self) -> broadcast::Receiver<OfflineUpdate> {
        self.store.bus().subscribe()
    }

    pub fn on_update<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&OfflineUpdate) + Send + 'static,
    {
        self.store.bus().on_update(listener)
    }

    // ── Online-aware file access ───────────────────────────────────

    /// Save through the backend when possible, otherwise queue.
    ///
    /// A 4xx answer is the server refusing the write and is returned as an
    /// error; queueing it would only fail again on flush.
    pub async fn save_file(&self, repo_id: &str, path: &str, content: &str) -> Result<SaveOutcome> {
        let path = normalize_path(path)?;

        if !self.connectivity.is_online() {
            self.queue_edit(repo_id, &path, content).await?;
            return Ok(SaveOutcome::Queued { error: None });
        }

        // Edits queued before this point are superseded by the save.
        let before_seq = self.store.read(repo_id).await?.next_seq;
        let body = FileBody { path, content: content.to_string() };
        match self.backend.put_file(repo_id, &body).await {
            Ok(()) => {
                let path = body.path.clone();
                let content = body.content.clone();
                let superseded = self
                    .store
                    .update(repo_id, move |record| record.settle(&path, content, before_seq))
                    .await?;
                if superseded > 0 {
                    debug!(repo_id, path = %body.path, superseded, "save replaced queued edits");
                }
                Ok(SaveOutcome::Saved)
            }
            Err(error) if error.is_rejection() => Err(anyhow::Error::new(error)
                .context(format!("backend rejected save of `{}`", body.path))),
            Err(error) => {
                info!(repo_id, path = %body.path, error = %error, "save failed, queueing offline");
                self.queue_edit(repo_id, &body.path, &body.content).await?;
                Ok(SaveOutcome::Queued { error: Some(error.to_string()) })
            }
        }
    }

    /// Fetch from the backend when possible, otherwise serve the cached copy.
    pub async fn load_file(&self, repo_id: &str, path: &str) -> Result<LoadedFile> {
        let path = normalize_path(path)?;

        if self.connectivity.is_online() {
            match self.backend.get_file(repo_id, &path).await {
                Ok(file) => {
                    // A queued edit is newer than anything the backend holds.
                    let cached_path = path.clone();
                    let server_content = file.content.clone();
                    let queued = self
                        .store
                        .update(repo_id, move |record| {
                            let queued = record.latest_pending(&cached_path).map(str::to_string);
                            if queued.is_none() {
                                record.cache(cached_path, server_content);
                            }
                            queued
                        })
                        .await?;
                    return Ok(match queued {
                        Some(content) => LoadedFile { content, offline: true },
                        None => LoadedFile { content: file.content, offline: false },
                    });
                }
                Err(error) if error.is_rejection() => {
                    return Err(anyhow::Error::new(error)
                        .context(format!("backend rejected load of `{path}`")));
                }
                Err(error) => {
                    debug!(repo_id, path = %path, error = %error, "load failed, trying cache");
                }
            }
        }

        match self.cache_read(repo_id, &path).await? {
            Some(content) => Ok(LoadedFile { content, offline: true }),
            None => bail!("`{path}` is not available offline"),
        }
    }
}
