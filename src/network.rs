//! Online/offline signal consumed by the pipeline.
//!
//! The host integration drives [`NetworkMonitor::set_online`]; the
//! pipeline reads the predicate and subscribes to edges to trigger
//! offline-queue flushes.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

pub struct NetworkMonitor {
    online: AtomicBool,
    tx: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self {
            online: AtomicBool::new(initially_online),
            tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record a transition. Listeners only observe actual edges.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            let _ = self.tx.send(online);
        }
    }

    /// Subscribe to online/offline edges.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
