//! Network availability tracking for install gating and queue flushing.
//!
//! The core never probes the network itself; the embedding shell owns a
//! platform monitor and pushes state changes here. Consumers watch the
//! channel, so a change wakes the pending-queue flush task without polling.

use tokio::sync::watch;

/// Snapshot of the host network state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkState {
    /// Whether any usable route exists.
    pub available: bool,
    /// Whether the active connection is metered.
    pub metered: bool,
}

impl NetworkState {
    /// Whether installs may run right now instead of being queued.
    pub fn allows_install(self) -> bool {
        self.available && !self.metered
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            available: true,
            metered: false,
        }
    }
}

/// Shared network state with change notification.
#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<NetworkState>,
}

impl NetworkMonitor {
    /// Create a monitor with the given initial state.
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current state snapshot.
    pub fn state(&self) -> NetworkState {
        *self.tx.borrow()
    }

    /// Push a state change; no-op when nothing changed.
    pub fn set_state(&self, state: NetworkState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(
                "network status change: {} [{}]",
                if state.available { "online" } else { "offline" },
                if state.metered { "metered" } else { "unmetered" }
            );
            *current = state;
            true
        });
    }

    /// Subscribe for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}
