// Background sync context.
//
// The worker is independent of the foreground editor: it opens its own store
// connection on the same database file, owns its own HTTP backend, and only
// learns the real backend address through a `Config` message. Until then it
// points at the placeholder endpoint.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use reposync_common::protocol::worker::{WorkerMessage, DEFAULT_API_BASE_URL, SYNC_TAG};

use crate::backend::{Endpoint, HttpBackend};
use crate::bus::UpdateBus;
use crate::connectivity::Connectivity;
use crate::flush::FlushOptions;
use crate::store::OfflineStore;
use crate::trigger::{sweep, ActivityTracker};

// ── Registration seam ──────────────────────────────────────────────

/// Asks the environment to run the flush later, outside the caller's
/// lifetime.
pub trait SyncRegistrar: Send + Sync {
    fn register(&self, tag: &str) -> Result<()>;
}

/// Registrar for hosts without a background context. The foreground trigger
/// remains the only sync path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRegistrar;

impl SyncRegistrar for NoopRegistrar {
    fn register(&self, tag: &str) -> Result<()> {
        debug!(tag, "background sync unavailable; relying on foreground trigger");
        Ok(())
    }
}

/// Sending side of a running [`BackgroundWorker`].
#[derive(Debug, Clone)]
pub struct BackgroundHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl BackgroundHandle {
    pub fn send(&self, message: WorkerMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| anyhow!("background sync worker is not running"))
    }

    /// Point the worker at the real backend.
    pub fn configure(&self, api_base_url: impl Into<String>) -> Result<()> {
        self.send(WorkerMessage::Config { api_base_url: api_base_url.into() })
    }

    pub fn trigger_sync(&self) -> Result<()> {
        self.send(WorkerMessage::TriggerSync)
    }
}

impl SyncRegistrar for BackgroundHandle {
    fn register(&self, tag: &str) -> Result<()> {
        self.send(WorkerMessage::SyncRequested { tag: tag.to_string() })
    }
}

// ── Worker ─────────────────────────────────────────────────────────

pub struct BackgroundWorker {
    store: OfflineStore,
    backend: HttpBackend,
    connectivity: Connectivity,
    activity: ActivityTracker,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl BackgroundWorker {
    /// Open a separate store connection on `database_path` and build a worker
    /// around it.
    pub fn open(
        database_path: &Path,
        connectivity: Connectivity,
        request_timeout: Duration,
    ) -> Result<(Self, BackgroundHandle)> {
        // Own bus: the worker's writes reach foreground consumers through the
        // shared database, not through in-process events.
        let store = OfflineStore::open_with_bus(database_path, UpdateBus::new())
            .context("background worker could not open the offline store")?;
        Self::new(store, connectivity, request_timeout)
    }

    pub fn new(
        store: OfflineStore,
        connectivity: Connectivity,
        request_timeout: Duration,
    ) -> Result<(Self, BackgroundHandle)> {
        let endpoint = Endpoint::new(DEFAULT_API_BASE_URL)?;
        let backend = HttpBackend::new(endpoint, request_timeout)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker =
            Self { store, backend, connectivity, activity: ActivityTracker::new(), rx };
        Ok((worker, BackgroundHandle { tx }))
    }

    pub fn activity(&self) -> ActivityTracker {
        self.activity.clone()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.backend.endpoint()
    }

    /// Process messages until `shutdown` fires or every handle is dropped.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let Self { store, backend, connectivity, activity, mut rx } = self;
        let options = FlushOptions::background();
        // A deferred sync waiting for connectivity. Repeated requests coalesce.
        let mut deferred: Option<String> = None;

        info!(endpoint = %backend.endpoint().get(), "background sync worker started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("background sync worker shutting down");
                    break;
                }

                message = rx.recv() => {
                    let Some(message) = message else {
                        info!("background sync channel closed, worker exiting");
                        break;
                    };
                    match message {
                        WorkerMessage::Config { api_base_url } => {
                            match backend.endpoint().set(&api_base_url) {
                                Ok(()) => info!(endpoint = %api_base_url, "background endpoint configured"),
                                Err(error) => warn!(error = %error, "ignoring invalid background endpoint"),
                            }
                        }
                        WorkerMessage::TriggerSync => {
                            sweep(&store, &backend, &connectivity, &options, &activity).await;
                        }
                        WorkerMessage::SyncRequested { tag } if tag == SYNC_TAG => {
                            debug!(tag = %tag, "deferred sync registered");
                            deferred = Some(tag);
                        }
                        WorkerMessage::SyncRequested { tag } => {
                            debug!(tag = %tag, "ignoring sync request with unknown tag");
                        }
                    }
                }

                _ = connectivity.wait_until_online(), if deferred.is_some() => {
                    if let Some(tag) = deferred.take() {
                        info!(tag = %tag, "running deferred background sync");
                        sweep(&store, &backend, &connectivity, &options, &activity).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn noop_registrar_always_succeeds() {
        assert!(NoopRegistrar.register(SYNC_TAG).is_ok());
    }

    #[tokio::test]
    async fn worker_starts_on_placeholder_endpoint() {
        let dir = TempDir::new().expect("temp dir");
        let (worker, _handle) = BackgroundWorker::open(
            &dir.path().join("offline.db"),
            Connectivity::offline(),
            Duration::from_secs(5),
        )
        .expect("worker should build");
        assert_eq!(worker.endpoint().get().as_str(), "http://localhost:8000/");
    }

    #[tokio::test]
    async fn handle_reports_stopped_worker() {
        let dir = TempDir::new().expect("temp dir");
        let (worker, handle) = BackgroundWorker::open(
            &dir.path().join("offline.db"),
            Connectivity::offline(),
            Duration::from_secs(5),
        )
        .expect("worker should build");
        drop(worker);

        let error = handle.trigger_sync().expect_err("send must fail");
        assert!(error.to_string().contains("not running"));
        assert!(handle.register(SYNC_TAG).is_err());
    }

    #[tokio::test]
    async fn config_message_updates_endpoint() {
        let dir = TempDir::new().expect("temp dir");
        let (worker, handle) = BackgroundWorker::open(
            &dir.path().join("offline.db"),
            Connectivity::offline(),
            Duration::from_secs(5),
        )
        .expect("worker should build");
        let endpoint = worker.endpoint().clone();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(worker.run(shutdown_rx));

        handle.configure("https://git.example.com/api").expect("send config");
        handle.configure("not a url").expect("send config");
        drop(handle);
        task.await.expect("worker should exit when handles drop");

        assert_eq!(endpoint.get().as_str(), "https://git.example.com/api");
        drop(shutdown_tx);
    }
}
