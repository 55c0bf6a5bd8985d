// `reposync watch` — keep connectivity, the sync trigger and the background
// worker running in the foreground, printing banner changes until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use reposync_client::background::{BackgroundHandle, BackgroundWorker};
use reposync_client::config::ClientConfig;
use reposync_client::probe::run_connectivity_probe;
use reposync_client::status::SyncBanner;
use reposync_client::trigger::{run_sync_trigger, ActivityTracker, SyncActivity};

use super::{block_on, load_config, Session};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Force JSON output (one event per line).
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BannerEvent {
    /// `None` when the banner is cleared.
    pub kind: Option<&'static str>,
    pub message: Option<String>,
}

impl From<Option<&SyncBanner>> for BannerEvent {
    fn from(banner: Option<&SyncBanner>) -> Self {
        Self { kind: banner.map(SyncBanner::kind), message: banner.map(ToString::to_string) }
    }
}

pub fn run(args: WatchArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = load_config(config_path).and_then(|config| block_on(watch(config, format))?);
    if let Err(error) = &result {
        output::print_anyhow_error(format, error);
    }
    result
}

async fn watch(config: ClientConfig, format: OutputFormat) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let interval = session.config.sync.probe_interval();
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let trigger_activity = ActivityTracker::new();

    let (worker, handle) = BackgroundWorker::open(
        session.store.path(),
        session.connectivity.clone(),
        session.config.sync.request_timeout(),
    )?;
    let worker_activity = worker.activity();
    handle.configure(session.config.api_base_url.clone())?;

    let mut tasks = vec![tokio::spawn(worker.run(shutdown_tx.subscribe()))];
    {
        let backend = Arc::clone(&session.backend);
        let connectivity = session.connectivity.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            run_connectivity_probe(backend.as_ref(), connectivity, interval, shutdown).await;
        }));
    }
    tasks.push(tokio::spawn(run_sync_trigger(
        session.store.clone(),
        Arc::clone(&session.backend),
        session.connectivity.clone(),
        session.config.sync.flush_options(),
        trigger_activity.clone(),
        shutdown_tx.subscribe(),
    )));

    info!(endpoint = %session.config.api_base_url, "watching offline edits");
    let result = report_banners(&session, &trigger_activity, &worker_activity, &handle, format).await;

    let _ = shutdown_tx.send(());
    for task in tasks {
        if let Err(error) = task.await {
            warn!(error = %error, "watch task ended abnormally");
        }
    }
    result
}

/// Print the banner every time it changes. While online with work still
/// queued, each probe interval asks the background worker for another sweep.
async fn report_banners(
    session: &Session,
    trigger_activity: &ActivityTracker,
    worker_activity: &ActivityTracker,
    handle: &BackgroundHandle,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut status_rx = session.connectivity.subscribe();
    let mut trigger_rx = trigger_activity.subscribe();
    let mut worker_rx = worker_activity.subscribe();
    let mut updates = session.store.bus().subscribe();

    let mut retry = tokio::time::interval(session.config.sync.probe_interval());
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
    retry.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut combined = SyncActivity::default();
    let mut shown: Option<SyncBanner> = None;
    let mut first = true;

    loop {
        let mut retry_due = false;
        if !first {
            tokio::select! {
                biased;

                signal = &mut ctrl_c => {
                    if let Err(error) = signal {
                        warn!(error = %error, "failed to listen for Ctrl-C");
                    }
                    info!("interrupted, stopping watch");
                    break;
                }

                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                changed = trigger_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    merge_activity(&mut combined, &trigger_activity.current(), &worker_activity.current());
                }

                changed = worker_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    merge_activity(&mut combined, &worker_activity.current(), &trigger_activity.current());
                }

                _ = updates.recv() => {}

                _ = retry.tick() => {
                    retry_due = true;
                }
            }
        }
        first = false;

        let online = session.connectivity.is_online();
        let pending = session.store.repo_ids_with_pending().await?.len();
        if retry_due && online && pending > 0 && !combined.syncing {
            if let Err(error) = handle.trigger_sync() {
                warn!(error = %format!("{error:#}"), "could not reach background worker");
            }
        }

        let banner = SyncBanner::render(online, &combined, pending);
        if banner != shown {
            output::print_output(format, &BannerEvent::from(banner.as_ref()), format_human)?;
            shown = banner;
        }
    }

    Ok(())
}

/// Fold the tracker that just changed into the combined view. Its error
/// replaces the previous one once its sweep finishes.
fn merge_activity(combined: &mut SyncActivity, changed: &SyncActivity, other: &SyncActivity) {
    combined.syncing = changed.syncing || other.syncing;
    if !changed.syncing {
        combined.last_error = changed.last_error.clone();
    }
    combined.sweeps = changed.sweeps + other.sweeps;
}

fn format_human(event: &BannerEvent) -> String {
    match &event.message {
        Some(message) => message.clone(),
        None => "All offline edits synced.".to_string(),
    }
}
