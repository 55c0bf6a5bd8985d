// Update notification bus: process-wide "pending state changed" hint.
//
// Payloads are hints only. Consumers re-read the store instead of trusting
// the event. Each callback listener runs in its own task and a panic inside
// one listener is caught there, so it cannot starve the others.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use reposync_common::protocol::worker::OFFLINE_UPDATED_EVENT;

const BUS_CAPACITY: usize = 64;

/// Payload of the offline-updated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineUpdate {
    pub repo_id: Option<String>,
}

impl OfflineUpdate {
    /// Event name carried by every update.
    pub fn name(&self) -> &'static str {
        OFFLINE_UPDATED_EVENT
    }
}

#[derive(Debug, Clone)]
pub struct UpdateBus {
    tx: broadcast::Sender<OfflineUpdate>,
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// The process-wide bus used by stores opened with `OfflineStore::open`.
    pub fn global() -> &'static UpdateBus {
        static GLOBAL: OnceLock<UpdateBus> = OnceLock::new();
        GLOBAL.get_or_init(UpdateBus::new)
    }

    pub fn emit(&self, repo_id: Option<&str>) {
        let receivers = self.tx.send(OfflineUpdate { repo_id: repo_id.map(str::to_string) });
        trace!(event = OFFLINE_UPDATED_EVENT, repo_id, receivers = receivers.unwrap_or(0), "emit");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OfflineUpdate> {
        self.tx.subscribe()
    }

    /// Run `listener` for every update until the returned handle is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_update<F>(&self, mut listener: F) -> Subscription
    where
        F: FnMut(&OfflineUpdate) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                let update = match rx.recv().await {
                    Ok(update) => update,
                    // Missed some events; one generic refresh hint covers them.
                    Err(RecvError::Lagged(skipped)) => {
                        trace!(skipped, "offline update listener lagged");
                        OfflineUpdate { repo_id: None }
                    }
                    Err(RecvError::Closed) => break,
                };

                if catch_unwind(AssertUnwindSafe(|| listener(&update))).is_err() {
                    warn!(repo_id = ?update.repo_id, "offline update listener panicked");
                }
            }
        });

        Subscription { task: Some(task) }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle for a callback registered with [`UpdateBus::on_update`].
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn subscribers_receive_repo_hint() {
        let bus = UpdateBus::new();
        let mut rx = bus.subscribe();
        bus.emit(Some("repo-1"));

        let update = rx.recv().await.expect("update should arrive");
        assert_eq!(update.repo_id.as_deref(), Some("repo-1"));
        assert_eq!(update.name(), "reposync:offline-updated");
    }

    #[tokio::test]
    async fn emit_without_listeners_is_harmless() {
        let bus = UpdateBus::new();
        bus.emit(None);
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_block_others() {
        let bus = UpdateBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _bad = bus.on_update(|_| panic!("listener bug"));
        let seen_by_good = Arc::clone(&seen);
        let _good = bus.on_update(move |update| {
            seen_by_good.lock().expect("seen lock").push(update.repo_id.clone());
        });

        bus.emit(Some("repo-1"));
        bus.emit(Some("repo-2"));
        settle().await;

        let seen = seen.lock().expect("seen lock").clone();
        assert_eq!(seen, vec![Some("repo-1".to_string()), Some("repo-2".to_string())]);
    }

    #[tokio::test]
    async fn panicking_listener_keeps_receiving() {
        let bus = UpdateBus::new();
        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        let _flaky = bus.on_update(move |_| {
            let mut calls = counter.lock().expect("calls lock");
            *calls += 1;
            if *calls == 1 {
                drop(calls);
                panic!("first call fails");
            }
        });

        bus.emit(None);
        bus.emit(None);
        settle().await;

        assert_eq!(*calls.lock().expect("calls lock"), 2);
    }

    #[tokio::test]
    async fn dropping_subscription_stops_delivery() {
        let bus = UpdateBus::new();
        let seen = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&seen);
        let subscription = bus.on_update(move |_| *counter.lock().expect("lock") += 1);

        bus.emit(None);
        settle().await;
        subscription.unsubscribe();
        settle().await;
        bus.emit(None);
        settle().await;

        assert_eq!(*seen.lock().expect("lock"), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
