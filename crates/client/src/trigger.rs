// Foreground sync trigger: flush every pending repository when connectivity
// comes back, and once at startup if we are already online with work queued.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::connectivity::Connectivity;
use crate::flush::{failure_summary, flush_all, FlushOptions, RepoFlushReport};
use crate::store::OfflineStore;

/// What the most recent sweep is doing or did, for status display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncActivity {
    pub syncing: bool,
    pub last_error: Option<String>,
    /// Completed sweeps since start.
    pub sweeps: u64,
}

/// Shared, observable [`SyncActivity`].
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    tx: Arc<watch::Sender<SyncActivity>>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncActivity::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> SyncActivity {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncActivity> {
        self.tx.subscribe()
    }

    fn begin(&self) {
        self.tx.send_modify(|activity| {
            activity.syncing = true;
            activity.last_error = None;
        });
    }

    fn finish(&self, error: Option<String>) {
        self.tx.send_modify(|activity| {
            activity.syncing = false;
            activity.last_error = error;
            activity.sweeps += 1;
        });
    }
}

/// Flush all pending repositories once, publishing progress to `activity`.
pub async fn sweep<B: Backend>(
    store: &OfflineStore,
    backend: &B,
    connectivity: &Connectivity,
    options: &FlushOptions,
    activity: &ActivityTracker,
) -> Vec<RepoFlushReport> {
    activity.begin();

    let (reports, error) = match flush_all(store, backend, connectivity, options).await {
        Ok(reports) => {
            let summary = failure_summary(&reports);
            (reports, summary)
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "could not list repositories with offline edits");
            (Vec::new(), Some(format!("{error:#}")))
        }
    };

    let synced = reports.iter().filter(|report| report.result.is_ok()).count();
    info!(repos = reports.len(), synced, "offline sync sweep finished");
    activity.finish(error);
    reports
}

/// Sweep, then sweep again for as long as connectivity was restored while
/// the previous sweep ran. Returns the reconnect count the last sweep covered.
async fn sweep_until_settled<B: Backend>(
    store: &OfflineStore,
    backend: &B,
    connectivity: &Connectivity,
    options: &FlushOptions,
    activity: &ActivityTracker,
) -> u64 {
    loop {
        let covered = connectivity.reconnects();
        sweep(store, backend, connectivity, options, activity).await;
        if connectivity.reconnects() == covered || !connectivity.is_online() {
            return covered;
        }
        info!("connectivity restored during sweep, flushing again");
    }
}

/// Run the foreground trigger until `shutdown` fires.
pub async fn run_sync_trigger<B: Backend>(
    store: OfflineStore,
    backend: Arc<B>,
    connectivity: Connectivity,
    options: FlushOptions,
    activity: ActivityTracker,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut status_rx = connectivity.subscribe();
    let mut previous = *status_rx.borrow_and_update();
    info!(status = ?previous, "sync trigger started");

    let mut seen_reconnects = connectivity.reconnects();

    if previous.is_online() {
        match store.repo_ids_with_pending().await {
            Ok(repos) if !repos.is_empty() => {
                info!(repos = repos.len(), "offline edits pending at startup");
                seen_reconnects =
                    sweep_until_settled(&store, backend.as_ref(), &connectivity, &options, &activity)
                        .await;
            }
            Ok(_) => {}
            Err(error) => warn!(error = %format!("{error:#}"), "startup pending scan failed"),
        }
    }

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("sync trigger shutting down");
                break;
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    info!("connectivity source dropped, sync trigger exiting");
                    break;
                }
                let current = *status_rx.borrow_and_update();
                let reconnects = connectivity.reconnects();
                // A quick Offline→Online flap can reach us as Online→Online.
                let restored = current.is_online()
                    && (!previous.is_online() || reconnects != seen_reconnects);
                previous = current;
                seen_reconnects = reconnects;

                if restored {
                    info!("connectivity restored, flushing offline edits");
                    seen_reconnects =
                        sweep_until_settled(&store, backend.as_ref(), &connectivity, &options, &activity)
                            .await;
                }
            }
        }
    }
}
