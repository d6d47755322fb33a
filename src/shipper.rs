//! The pipeline coordinator.
//!
//! Owns every pipeline component and runs each capture through the stage
//! sequence: format → validate → redact → user filter → rate limit →
//! quota → charge → dispatch. Charging happens only after every admission
//! stage has passed, so a dropped report never advances a counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::batch::{BatchAggregator, BatchSettings, EnvelopeSink, FlushDisposition};
use crate::breadcrumbs::BreadcrumbRecorder;
use crate::circuit::{CircuitBreaker, CircuitSnapshot};
use crate::compress::Compressor;
use crate::config::ShipperConfig;
use crate::delivery::{DeliveryService, DeliverySettings, SendError};
use crate::error::{CaptureOutcome, ConfigError, DropReason};
use crate::fingerprint;
use crate::format;
use crate::health::{HealthMonitor, HealthStats, SdkHealth};
use crate::network::NetworkMonitor;
use crate::observe;
use crate::queue::{OfflineQueue, QueueSettings};
use crate::quota::{QuotaAccountant, QuotaSnapshot};
use crate::rate_limit::{RateLimiter, RateLimiterSnapshot};
use crate::redact;
use crate::retry::RetryConfig;
use crate::storage::{InMemoryStore, KeyValueStore};
use crate::transport::Transport;
use crate::types::{BatchEnvelope, Breadcrumb, ErrorReport, Level, RequestInfo, UserInfo};
use crate::validate;

/// Aggregated view over every component, returned by `get_stats`.
#[derive(Debug, Clone)]
pub struct ShipperStats {
    pub health: HealthStats,
    pub rate_limit: RateLimiterSnapshot,
    pub quota: QuotaSnapshot,
    pub circuit: CircuitSnapshot,
    pub offline_queue_size: usize,
    pub pending_batch_size: usize,
    pub is_online: bool,
    pub enabled: bool,
}

/// Terminal handler for envelopes leaving the batcher.
///
/// Owns the failure accounting for the reports it carries: an
/// undeliverable envelope either re-enters the offline queue or is
/// suppressed per report.
struct DispatchSink {
    delivery: Arc<DeliveryService>,
    queue: Arc<OfflineQueue>,
    health: Arc<HealthMonitor>,
    offline_enabled: AtomicBool,
}

#[async_trait]
impl EnvelopeSink for DispatchSink {
    async fn deliver(&self, envelope: BatchEnvelope) -> FlushDisposition {
        match self.delivery.send_envelope(&envelope).await {
            Ok(()) => FlushDisposition::Delivered,
            Err(error) => {
                if self.offline_enabled.load(Ordering::SeqCst) {
                    for report in envelope.reports {
                        self.queue.enqueue(report).await;
                    }
                    FlushDisposition::Queued
                } else {
                    let reason = match error {
                        SendError::CircuitOpen => DropReason::CircuitOpen,
                        SendError::Failed(f) => DropReason::DeliveryFailed(f),
                    };
                    for _ in &envelope.reports {
                        self.health.record_suppressed(&reason);
                    }
                    FlushDisposition::Dropped(reason)
                }
            }
        }
    }
}

/// Builder wiring collaborators into a [`Shipper`].
pub struct ShipperBuilder {
    config: ShipperConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    network: Option<Arc<NetworkMonitor>>,
}

impl ShipperBuilder {
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn network(mut self, network: Arc<NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    pub async fn build(self) -> Arc<Shipper> {
        let ShipperBuilder { config, store, transport, network } = self;

        let transport = transport.unwrap_or_else(default_transport);
        let store = store.unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let network = network.unwrap_or_else(|| Arc::new(NetworkMonitor::new(true)));

        Shipper::assemble(config, store, transport, network).await
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Arc<dyn Transport> {
    Arc::new(crate::transport::HttpTransport::new())
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Arc<dyn Transport> {
    panic!("no transport configured; enable the `http` feature or supply one via ShipperBuilder::transport")
}

/// The error shipper.
///
/// Capture calls return after the stage decisions complete; network I/O
/// may still be in flight (batched or queued). Every admitted report ends
/// in exactly one of: delivered, durably queued, or dropped with an
/// accounted reason.
pub struct Shipper {
    config: RwLock<ShipperConfig>,
    enabled: AtomicBool,
    session_id: Uuid,
    breadcrumbs: BreadcrumbRecorder,
    user: std::sync::Mutex<Option<UserInfo>>,
    context: std::sync::Mutex<HashMap<String, Value>>,
    request: std::sync::Mutex<Option<RequestInfo>>,
    rate_limiter: Mutex<RateLimiter>,
    quota: Mutex<QuotaAccountant>,
    batcher: Arc<BatchAggregator>,
    delivery: Arc<DeliveryService>,
    queue: Arc<OfflineQueue>,
    sink: Arc<DispatchSink>,
    network: Arc<NetworkMonitor>,
    health: Arc<HealthMonitor>,
    edge_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Shipper {
    /// Construct with the default HTTP transport and an in-memory store.
    #[cfg(feature = "http")]
    pub async fn new(config: ShipperConfig) -> Arc<Self> {
        Self::builder(config).build().await
    }

    pub fn builder(config: ShipperConfig) -> ShipperBuilder {
        ShipperBuilder {
            config,
            store: None,
            transport: None,
            network: None,
        }
    }

    async fn assemble(
        config: ShipperConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        network: Arc<NetworkMonitor>,
    ) -> Arc<Self> {
        let mut enabled = config.enabled;
        if let Err(e) = config.validate() {
            observe::trace_warn(&format!("configuration rejected, shipper disabled: {}", e));
            enabled = false;
        }

        let health = Arc::new(HealthMonitor::new());

        let circuit = CircuitBreaker::new(
            config.failure_threshold,
            config.minimum_requests,
            config.monitoring_period,
            config.reset_timeout,
        );
        let delivery = DeliveryService::new(
            transport,
            circuit,
            Compressor::new(config.enable_compression, config.compression_threshold),
            DeliverySettings {
                webhook_url: config.webhook_url.clone(),
                timeout: config.timeout,
                retry: RetryConfig {
                    max_retries: config.max_retries,
                    initial_delay: config.initial_retry_delay,
                    max_delay: config.max_retry_delay,
                    multiplier: config.retry_multiplier,
                    jitter: true,
                },
            },
            health.clone(),
        );

        let queue = OfflineQueue::new(
            QueueSettings {
                max_size: config.max_offline_queue_size,
                max_age: config.offline_queue_max_age,
            },
            store.clone(),
            delivery.clone(),
            health.clone(),
        );
        queue.load().await;

        let sink = Arc::new(DispatchSink {
            delivery: delivery.clone(),
            queue: queue.clone(),
            health: health.clone(),
            offline_enabled: AtomicBool::new(config.enable_offline_support),
        });

        let batcher = BatchAggregator::new(
            BatchSettings {
                enabled: config.enable_batching,
                max_size: config.batch_size,
                max_bytes: config.max_batch_payload_size,
                max_wait: config.batch_timeout,
            },
            sink.clone(),
        );

        let quota = QuotaAccountant::load(
            config.daily_limit,
            config.monthly_limit,
            config.burst_limit,
            config.burst_window,
            config.max_payload_size,
            store.clone(),
        )
        .await;

        let rate_limiter = RateLimiter::new(
            config.max_requests_per_minute,
            std::time::Duration::from_secs(60),
            config.duplicate_error_window,
        );

        let breadcrumbs = BreadcrumbRecorder::new(config.max_breadcrumbs);

        let shipper = Arc::new(Self {
            config: RwLock::new(config),
            enabled: AtomicBool::new(enabled),
            session_id: Uuid::new_v4(),
            breadcrumbs,
            user: std::sync::Mutex::new(None),
            context: std::sync::Mutex::new(HashMap::new()),
            request: std::sync::Mutex::new(None),
            rate_limiter: Mutex::new(rate_limiter),
            quota: Mutex::new(quota),
            batcher,
            delivery,
            queue: queue.clone(),
            sink,
            network: network.clone(),
            health,
            edge_task: std::sync::Mutex::new(None),
        });

        // Reconnection flush: drain the queue on every offline → online edge.
        let mut edges = network.subscribe();
        let edge_queue = queue;
        let handle = tokio::spawn(async move {
            while edges.changed().await.is_ok() {
                if *edges.borrow() {
                    observe::trace_event("network online, flushing offline queue");
                    edge_queue.process().await;
                }
            }
        });
        *shipper.edge_task.lock().expect("edge task") = Some(handle);

        shipper
    }

    /// Capture an error value with its current backtrace.
    pub async fn capture_error<E>(&self, error: &E) -> CaptureOutcome
    where
        E: std::error::Error + ?Sized,
    {
        self.capture(
            error.to_string(),
            std::any::type_name::<E>().to_string(),
            format::capture_stack(),
            HashMap::new(),
        )
        .await
    }

    /// Capture an error value with additional context entries.
    pub async fn capture_error_with_context<E>(
        &self,
        error: &E,
        context: HashMap<String, Value>,
    ) -> CaptureOutcome
    where
        E: std::error::Error + ?Sized,
    {
        self.capture(
            error.to_string(),
            std::any::type_name::<E>().to_string(),
            format::capture_stack(),
            context,
        )
        .await
    }

    /// Capture an explicit message at the given level.
    pub async fn capture_message(&self, message: &str, level: Level) -> CaptureOutcome {
        let mut context = HashMap::new();
        context.insert(
            "level".to_string(),
            serde_json::to_value(level).unwrap_or(Value::Null),
        );
        self.capture(
            message.to_string(),
            "Message".to_string(),
            format::capture_stack(),
            context,
        )
        .await
    }

    async fn capture(
        &self,
        message: String,
        exception_class: String,
        stack_trace: String,
        extra_context: HashMap<String, Value>,
    ) -> CaptureOutcome {
        if !self.enabled.load(Ordering::SeqCst) {
            return self.drop_report(DropReason::Disabled, false).await;
        }

        let config = self.config.read().await.clone();
        let debug = config.debug;

        // Format: assemble the report and snapshot ambient state.
        let (file, line) = format::scan_stack(&stack_trace);
        let mut context = self.context.lock().expect("context").clone();
        context.extend(extra_context);

        let mut report = ErrorReport {
            message,
            exception_class,
            stack_trace,
            file,
            line,
            project: config.project_name.clone(),
            environment: config.environment.clone(),
            timestamp: Utc::now(),
            session_id: self.session_id,
            user: self.user.lock().expect("user").clone(),
            context,
            breadcrumbs: self.breadcrumbs.snapshot(),
            runtime: Some(format::runtime_snapshot()),
            request: self.request.lock().expect("request").clone(),
            commit_hash: config.commit_hash.clone(),
            version: config.version.clone(),
            custom_data: None,
        };

        // Validate: hard checks reject, sensitive-pattern hits only warn.
        let validation = validate::validate_report(&report, config.max_payload_size);
        self.health
            .record_validation_warnings(validation.warnings.len() as u64);
        if let Some(detail) = validation.reject {
            self.diag(debug, "capture rejected by validation");
            return self
                .drop_report(DropReason::ValidationFailed { detail }, debug)
                .await;
        }

        // Redact before anything user-visible leaves the pipeline.
        redact::redact_report(&mut report);

        // User filter sees the redacted report.
        if let Some(hook) = config.before_send.as_ref() {
            match hook(report) {
                Some(filtered) => report = filtered,
                None => return self.drop_report(DropReason::FilteredByHook, debug).await,
            }
        }

        let fp = fingerprint::compute(&report.message, &report.file, report.line);

        // Rate limit: admission only, nothing is charged yet.
        let decision = self.rate_limiter.lock().await.check(&fp);
        if !decision.allowed {
            let reason = decision.reason.unwrap_or(DropReason::RateLimited);
            return self.drop_report(reason, debug).await;
        }

        // Quota: first failing limit wins; still nothing charged.
        let payload_size = report.serialized_size();
        if let Some(reason) = self.quota.lock().await.check(payload_size) {
            return self.drop_report(reason, debug).await;
        }

        // Charge only after every admission stage has passed. The
        // reported counter is not advanced here: it moves when the report
        // reaches the webhook, so a report is counted as reported or
        // suppressed, never both.
        self.rate_limiter.lock().await.mark(&fp);
        self.quota.lock().await.record_usage().await;
        self.diag(debug, "capture admitted");

        // Dispatch.
        if config.enable_batching {
            self.batcher.enqueue(report, payload_size).await;
            return CaptureOutcome::Batched;
        }

        if config.enable_offline_support {
            let online = self.network.is_online();
            if self.queue.handle_report(report, online).await {
                CaptureOutcome::Delivered
            } else {
                CaptureOutcome::Queued
            }
        } else {
            // No queue to fall back to; the sink accounts for failures.
            match self
                .batcher
                .enqueue(report, payload_size)
                .await
            {
                Some(FlushDisposition::Delivered) => CaptureOutcome::Delivered,
                Some(FlushDisposition::Queued) => CaptureOutcome::Queued,
                Some(FlushDisposition::Dropped(reason)) => CaptureOutcome::Dropped(reason),
                None => CaptureOutcome::Batched,
            }
        }
    }

    async fn drop_report(&self, reason: DropReason, debug: bool) -> CaptureOutcome {
        self.health.record_suppressed(&reason);
        if debug {
            observe::trace_debug(&format!("capture dropped: {}", reason));
        }
        CaptureOutcome::Dropped(reason)
    }

    fn diag(&self, debug: bool, message: &str) {
        if debug {
            observe::trace_debug(message);
        }
    }

    /// Record a crumb for the next report.
    pub fn add_breadcrumb(&self, crumb: Breadcrumb) {
        self.breadcrumbs.add(crumb);
    }

    pub fn clear_breadcrumbs(&self) {
        self.breadcrumbs.clear();
    }

    pub fn set_user(&self, user: Option<UserInfo>) {
        *self.user.lock().expect("user") = user;
    }

    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        self.context.lock().expect("context").insert(key.into(), value);
    }

    pub fn remove_context(&self, key: &str) {
        self.context.lock().expect("context").remove(key);
    }

    pub fn set_request(&self, request: Option<RequestInfo>) {
        *self.request.lock().expect("request") = request;
    }

    /// Flush the current batch and drain the offline queue.
    pub async fn flush(&self) {
        self.batcher.flush().await;
        self.queue.process().await;
    }

    /// Drain the offline queue; returns the number delivered.
    pub async fn flush_queue(&self) -> usize {
        self.queue.process().await
    }

    /// Apply a configuration change and propagate it to every component.
    ///
    /// The mutation is validated first; a rejected configuration leaves
    /// the current one untouched.
    pub async fn update_config<F>(&self, mutate: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut ShipperConfig),
    {
        let mut guard = self.config.write().await;
        let mut next = guard.clone();
        mutate(&mut next);
        next.validate()?;
        *guard = next.clone();
        drop(guard);

        self.enabled.store(next.enabled, Ordering::SeqCst);
        self.breadcrumbs.set_capacity(next.max_breadcrumbs);
        self.sink
            .offline_enabled
            .store(next.enable_offline_support, Ordering::SeqCst);

        self.rate_limiter.lock().await.update(
            next.max_requests_per_minute,
            std::time::Duration::from_secs(60),
            next.duplicate_error_window,
        );
        self.quota.lock().await.update(
            next.daily_limit,
            next.monthly_limit,
            next.burst_limit,
            next.burst_window,
            next.max_payload_size,
        );
        self.batcher
            .update(BatchSettings {
                enabled: next.enable_batching,
                max_size: next.batch_size,
                max_bytes: next.max_batch_payload_size,
                max_wait: next.batch_timeout,
            })
            .await;
        self.queue.update(QueueSettings {
            max_size: next.max_offline_queue_size,
            max_age: next.offline_queue_max_age,
        });
        self.delivery
            .update(
                DeliverySettings {
                    webhook_url: next.webhook_url.clone(),
                    timeout: next.timeout,
                    retry: RetryConfig {
                        max_retries: next.max_retries,
                        initial_delay: next.initial_retry_delay,
                        max_delay: next.max_retry_delay,
                        multiplier: next.retry_multiplier,
                        jitter: true,
                    },
                },
                Compressor::new(next.enable_compression, next.compression_threshold),
            )
            .await;
        Ok(())
    }

    pub async fn get_stats(&self) -> ShipperStats {
        ShipperStats {
            health: self.health.stats(),
            rate_limit: self.rate_limiter.lock().await.snapshot(),
            quota: self.quota.lock().await.snapshot(),
            circuit: self.delivery.circuit_snapshot().await,
            offline_queue_size: self.queue.len().await,
            pending_batch_size: self.batcher.pending().await,
            is_online: self.network.is_online(),
            enabled: self.enabled.load(Ordering::SeqCst),
        }
    }

    pub async fn sdk_health(&self) -> SdkHealth {
        let queue_size = self.queue.len().await;
        self.health.assess(queue_size)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Handle to the network signal for host integrations.
    pub fn network(&self) -> Arc<NetworkMonitor> {
        self.network.clone()
    }

    /// Disable new captures and flush what is pending, best effort.
    pub async fn destroy(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.batcher.shutdown().await;
        if let Some(handle) = self.edge_task.lock().expect("edge task").take() {
            handle.abort();
        }
        observe::trace_event("shipper destroyed");
    }
}
