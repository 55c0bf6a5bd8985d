// Connectivity monitor: the current online/offline state plus change
// notifications. Callers feed transitions in with `set_online`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<NetworkStatus>>,
    /// Offline→Online transitions so far. Survives the coalescing of watch
    /// notifications.
    reconnects: Arc<AtomicU64>,
}

impl Connectivity {
    pub fn new(initial: NetworkStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx), reconnects: Arc::new(AtomicU64::new(0)) }
    }

    pub fn online() -> Self {
        Self::new(NetworkStatus::Online)
    }

    pub fn offline() -> Self {
        Self::new(NetworkStatus::Offline)
    }

    /// Record the current state. Returns `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let next = if online { NetworkStatus::Online } else { NetworkStatus::Offline };
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            if online {
                self.reconnects.fetch_add(1, Ordering::SeqCst);
            }
            true
        });
        if changed {
            info!(status = ?next, "connectivity changed");
        }
        changed
    }

    pub fn status(&self) -> NetworkStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Number of Offline→Online transitions recorded so far.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Receiver that wakes on every transition.
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.tx.subscribe()
    }

    /// Resolve as soon as the state is online (immediately if it already is).
    pub async fn wait_until_online(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot see a
        // closed channel here.
        let _ = rx.wait_for(|status| status.is_online()).await;
    }
}
