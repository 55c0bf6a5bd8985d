// Connectivity probe for hosts without a platform online/offline signal:
// ping the backend on an interval and feed the answer into `Connectivity`.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::connectivity::Connectivity;

/// Ping once and record the result. Returns whether the backend answered.
pub async fn probe_once<B: Backend>(backend: &B, connectivity: &Connectivity) -> bool {
    let reachable = match backend.ping().await {
        Ok(()) => true,
        Err(error) => {
            debug!(error = %error, "connectivity probe failed");
            false
        }
    };
    connectivity.set_online(reachable);
    reachable
}

pub async fn run_connectivity_probe<B: Backend>(
    backend: &B,
    connectivity: Connectivity,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "connectivity probe started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!("connectivity probe shutting down");
                break;
            }

            _ = ticker.tick() => {
                probe_once(backend, &connectivity).await;
            }
        }
    }
}
