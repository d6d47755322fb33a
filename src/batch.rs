//! Size/bytes/time triggered report aggregation.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::DropReason;
use crate::types::{BatchEnvelope, ErrorReport};

/// What ultimately happened to a flushed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushDisposition {
    Delivered,
    Queued,
    Dropped(DropReason),
}

/// Downstream consumer of full envelopes. The sink owns all terminal
/// accounting for the envelope's reports.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn deliver(&self, envelope: BatchEnvelope) -> FlushDisposition;
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub enabled: bool,
    pub max_size: usize,
    pub max_bytes: usize,
    pub max_wait: Duration,
}

struct BatchState {
    settings: BatchSettings,
    reports: Vec<ErrorReport>,
    bytes: usize,
    timer: Option<JoinHandle<()>>,
}

/// Accumulates admitted reports and flushes on whichever trigger fires
/// first: report count, estimated payload bytes, or wall time since the
/// first enqueue. With batching disabled every report becomes an immediate
/// one-element envelope.
pub struct BatchAggregator {
    sink: Arc<dyn EnvelopeSink>,
    state: Mutex<BatchState>,
    /// Self-handle for the timer task; upgraded on fire, so a dropped
    /// aggregator silently cancels its timer.
    weak: Weak<BatchAggregator>,
}

impl BatchAggregator {
    pub fn new(settings: BatchSettings, sink: Arc<dyn EnvelopeSink>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            sink,
            state: Mutex::new(BatchState {
                settings,
                reports: Vec::new(),
                bytes: 0,
                timer: None,
            }),
            weak: weak.clone(),
        })
    }

    /// Add one admitted report. `estimated_bytes` is its serialized size.
    pub async fn enqueue(
        &self,
        report: ErrorReport,
        estimated_bytes: usize,
    ) -> Option<FlushDisposition> {
        let ready = {
            let mut state = self.state.lock().await;

            if !state.settings.enabled {
                drop(state);
                let disposition = self.sink.deliver(BatchEnvelope::single(report)).await;
                return Some(disposition);
            }

            state.reports.push(report);
            state.bytes += estimated_bytes;

            if state.reports.len() >= state.settings.max_size
                || state.bytes >= state.settings.max_bytes
            {
                Self::take_locked(&mut state, true)
            } else {
                if state.reports.len() == 1 {
                    let max_wait = state.settings.max_wait;
                    state.timer = Some(self.spawn_timer(max_wait));
                }
                None
            }
        };

        if let Some(envelope) = ready {
            self.sink.deliver(envelope).await;
        }
        None
    }

    /// Flush whatever is pending.
    pub async fn flush(&self) {
        let ready = {
            let mut state = self.state.lock().await;
            Self::take_locked(&mut state, true)
        };
        if let Some(envelope) = ready {
            self.sink.deliver(envelope).await;
        }
    }

    /// Teardown: one final flush.
    pub async fn shutdown(&self) {
        self.flush().await;
    }

    pub async fn pending(&self) -> usize {
        self.state.lock().await.reports.len()
    }

    pub async fn update(&self, settings: BatchSettings) {
        self.state.lock().await.settings = settings;
    }

    fn spawn_timer(&self, max_wait: Duration) -> JoinHandle<()> {
        let weak = self.weak.clone();
        tokio::spawn(async move {
            sleep(max_wait).await;
            let Some(aggregator) = weak.upgrade() else { return };

            // The timer takes the batch itself instead of calling flush():
            // flush() aborts the stored timer handle, and this task must
            // not abort itself mid-delivery.
            let ready = {
                let mut state = aggregator.state.lock().await;
                state.timer = None;
                Self::take_locked(&mut state, false)
            };
            if let Some(envelope) = ready {
                aggregator.sink.deliver(envelope).await;
            }
        })
    }

    /// Clear the current batch and cancel the timer, returning the
    /// envelope to send. Runs under the state lock, before any await.
    fn take_locked(state: &mut BatchState, abort_timer: bool) -> Option<BatchEnvelope> {
        if let Some(timer) = state.timer.take() {
            if abort_timer {
                timer.abort();
            }
        }
        if state.reports.is_empty() {
            return None;
        }
        state.bytes = 0;
        Some(BatchEnvelope::new(std::mem::take(&mut state.reports)))
    }
}
