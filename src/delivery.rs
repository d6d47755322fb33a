//! The delivery substrate: serialize → compress → POST with retry.
//!
//! Every send, batched or single, is gated by the circuit breaker before
//! the transport is touched, and every transport attempt records its
//! outcome back into the breaker and the health monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::circuit::{CircuitBreaker, CircuitSnapshot};
use crate::compress::Compressor;
use crate::error::FailureReason;
use crate::health::HealthMonitor;
use crate::observe;
use crate::retry::{self, RetryConfig};
use crate::transport::{Transport, WebhookRequest};
use crate::types::{BatchEnvelope, ErrorReport};

/// Why a send did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The breaker refused the send; the transport was not invoked.
    CircuitOpen,

    /// All attempts failed.
    Failed(FailureReason),
}

/// Live parameters; replaced wholesale on configuration updates.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub webhook_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

pub struct DeliveryService {
    transport: Arc<dyn Transport>,
    circuit: Arc<Mutex<CircuitBreaker>>,
    health: Arc<HealthMonitor>,
    compressor: std::sync::RwLock<Compressor>,
    settings: RwLock<DeliverySettings>,
}

impl DeliveryService {
    pub fn new(
        transport: Arc<dyn Transport>,
        circuit: CircuitBreaker,
        compressor: Compressor,
        settings: DeliverySettings,
        health: Arc<HealthMonitor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            circuit: Arc::new(Mutex::new(circuit)),
            health,
            compressor: std::sync::RwLock::new(compressor),
            settings: RwLock::new(settings),
        })
    }

    /// Send a single report as its own body.
    ///
    /// Successful sends are what advance the reported counter; a report
    /// is only ever counted at its terminal outcome.
    pub async fn send_report(&self, report: &ErrorReport) -> Result<(), SendError> {
        let body = serde_json::to_vec(report).unwrap_or_default();
        self.send_body(body).await?;
        self.health.record_reported();
        Ok(())
    }

    /// Send a batch envelope.
    pub async fn send_envelope(&self, envelope: &BatchEnvelope) -> Result<(), SendError> {
        let body = serde_json::to_vec(envelope).unwrap_or_default();
        self.send_body(body).await?;
        self.health.record_reported_count(envelope.count as u64);
        Ok(())
    }

    async fn send_body(&self, body: Vec<u8>) -> Result<(), SendError> {
        if !self.circuit.lock().await.can_execute() {
            observe::metric_inc("error_shipper.send.circuit_open");
            return Err(SendError::CircuitOpen);
        }

        let settings = self.settings.read().await.clone();
        let (body, encoding) = self
            .compressor
            .read()
            .expect("compressor")
            .encode(body);

        let request = WebhookRequest {
            url: settings.webhook_url,
            body,
            encoding,
            timeout: settings.timeout,
        };

        let transport = self.transport.clone();
        let circuit = self.circuit.clone();
        let health = self.health.clone();

        let outcome = retry::run(&settings.retry, move || {
            let transport = transport.clone();
            let circuit = circuit.clone();
            let health = health.clone();
            let request = request.clone();
            async move {
                let started = Instant::now();
                let result = transport.post(&request).await;
                health.record_response_time(started.elapsed());
                let mut breaker = circuit.lock().await;
                match &result {
                    Ok(()) => breaker.record_success(),
                    Err(_) => breaker.record_failure(),
                }
                result
            }
        })
        .await;

        self.health
            .record_retry_attempts(outcome.attempts.saturating_sub(1) as u64);

        match outcome.result {
            Ok(()) => {
                observe::metric_inc("error_shipper.send.delivered");
                Ok(())
            }
            Err(reason) => {
                observe::metric_inc("error_shipper.send.failed");
                Err(SendError::Failed(reason))
            }
        }
    }

    pub async fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.circuit.lock().await.snapshot()
    }

    /// Operator/test override on the breaker.
    pub async fn force_circuit_open(&self) {
        self.circuit.lock().await.force_open();
    }

    pub async fn force_circuit_close(&self) {
        self.circuit.lock().await.force_close();
    }

    pub async fn update(&self, settings: DeliverySettings, compressor: Compressor) {
        *self.settings.write().await = settings;
        *self.compressor.write().expect("compressor") = compressor;
    }
}
