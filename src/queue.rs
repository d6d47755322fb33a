//! Durable offline FIFO with age eviction and reconnection flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::delivery::{DeliveryService, SendError};
use crate::error::DropReason;
use crate::health::HealthMonitor;
use crate::observe;
use crate::storage::{KeyValueStore, OFFLINE_QUEUE_KEY};
use crate::types::{ErrorReport, QueuedItem};

/// Delivery failures after which a queued item is given up on.
const MAX_ITEM_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_size: usize,
    pub max_age: Duration,
}

/// Bounded durable FIFO in front of the delivery substrate.
///
/// Items are appended on failed or offline captures and drained on flush
/// triggers (online edge, explicit flush, opportunistic drain after a
/// successful direct send). Only one flush runs at a time.
pub struct OfflineQueue {
    settings: std::sync::RwLock<QueueSettings>,
    items: Mutex<Vec<QueuedItem>>,
    store: Arc<dyn KeyValueStore>,
    delivery: Arc<DeliveryService>,
    health: Arc<HealthMonitor>,
    flush_in_progress: AtomicBool,
    store_failure_logged: AtomicBool,
}

/// Clears the flush flag on every exit path, panics included.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl OfflineQueue {
    pub fn new(
        settings: QueueSettings,
        store: Arc<dyn KeyValueStore>,
        delivery: Arc<DeliveryService>,
        health: Arc<HealthMonitor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings: std::sync::RwLock::new(settings),
            items: Mutex::new(Vec::new()),
            store,
            delivery,
            health,
            flush_in_progress: AtomicBool::new(false),
            store_failure_logged: AtomicBool::new(false),
        })
    }

    /// Restore persisted items. Unparseable state is discarded.
    pub async fn load(&self) {
        let Some(raw) = self.store.get(OFFLINE_QUEUE_KEY).await else {
            return;
        };
        let mut restored: Vec<QueuedItem> =
            serde_json::from_str(&raw).unwrap_or_default();
        self.prune(&mut restored);

        let mut items = self.items.lock().await;
        *items = restored;
    }

    /// Entry point for a report on the direct (unbatched) path.
    ///
    /// Online: try a direct send; queue on failure. Offline: queue
    /// immediately. Returns true if the report was delivered.
    pub async fn handle_report(&self, report: ErrorReport, online: bool) -> bool {
        if online {
            match self.delivery.send_report(&report).await {
                Ok(()) => {
                    // The transport is demonstrably healthy; drain any
                    // backlog left over from an earlier offline period.
                    if self.len().await > 0 {
                        self.process().await;
                    }
                    return true;
                }
                Err(_) => {
                    self.enqueue(report).await;
                    return false;
                }
            }
        }
        self.enqueue(report).await;
        false
    }

    /// Append a report, pruning expired items and trimming overflow to
    /// the newest entries, then persist.
    pub async fn enqueue(&self, report: ErrorReport) {
        let max_size = self.settings.read().expect("queue settings").max_size;
        let snapshot = {
            let mut items = self.items.lock().await;
            items.push(QueuedItem::new(report));
            self.prune(&mut items);
            if items.len() > max_size {
                items.sort_by_key(|item| item.enqueued_at);
                let excess = items.len() - max_size;
                items.drain(..excess);
            }
            items.clone()
        };
        observe::metric_inc("error_shipper.queue.enqueued");
        self.persist(&snapshot).await;
    }

    /// Drain the queue, oldest first. Returns the number delivered.
    ///
    /// Guarded so concurrent triggers (online edge plus an explicit
    /// flush) cannot interleave; the flag is set before the first await
    /// and cleared on every exit path.
    pub async fn process(&self) -> usize {
        if self.flush_in_progress.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let _guard = FlushGuard(&self.flush_in_progress);

        let snapshot = {
            let mut items = self.items.lock().await;
            self.prune(&mut items);
            items.clone()
        };
        if snapshot.is_empty() {
            return 0;
        }

        let mut delivered: Vec<Uuid> = Vec::new();
        let mut failed: Vec<Uuid> = Vec::new();

        for item in &snapshot {
            match self.delivery.send_report(&item.report).await {
                Ok(()) => delivered.push(item.id),
                // The breaker refused; the transport was never invoked,
                // so this is not a delivery failure for the item.
                Err(SendError::CircuitOpen) => break,
                Err(SendError::Failed(_)) => failed.push(item.id),
            }
        }

        let mut evicted = 0u64;
        let remaining = {
            let mut items = self.items.lock().await;
            items.retain_mut(|item| {
                if delivered.contains(&item.id) {
                    return false;
                }
                if failed.contains(&item.id) {
                    item.attempts += 1;
                    if item.attempts >= MAX_ITEM_ATTEMPTS {
                        evicted += 1;
                        return false;
                    }
                }
                true
            });
            items.clone()
        };
        // Evicted items are terminal drops and accounted like any other.
        for _ in 0..evicted {
            self.health.record_suppressed(&DropReason::RetriesExhausted);
        }
        self.persist(&remaining).await;

        observe::metric_inc("error_shipper.queue.flushed");
        delivered.len()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Drop all queued items and clear the persisted state.
    pub async fn clear(&self) {
        self.items.lock().await.clear();
        self.store.remove(OFFLINE_QUEUE_KEY).await;
    }

    pub fn update(&self, settings: QueueSettings) {
        *self.settings.write().expect("queue settings") = settings;
    }

    fn prune(&self, items: &mut Vec<QueuedItem>) {
        let max_age = self.settings.read().expect("queue settings").max_age;
        let cutoff = chrono::Duration::from_std(max_age)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let now = Utc::now();
        items.retain(|item| now.signed_duration_since(item.enqueued_at) < cutoff);
    }

    async fn persist(&self, items: &[QueuedItem]) {
        if items.is_empty() {
            self.store.remove(OFFLINE_QUEUE_KEY).await;
            return;
        }
        let raw = match serde_json::to_string(items) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        if let Err(e) = self.store.set(OFFLINE_QUEUE_KEY, &raw).await {
            if !self.store_failure_logged.swap(true, Ordering::SeqCst) {
                observe::trace_warn(&format!(
                    "offline queue not persisted, keeping in memory: {}",
                    e
                ));
            }
        }
    }
}
