//! A client-side error telemetry shipper.
//!
//! This crate captures application errors and explicit messages and
//! forwards them to a remote ingestion webhook over HTTPS, pushing every
//! capture through a fixed pipeline of decision stages:
//!
//! ```text
//! capture ─► format ─► validate ─► redact ─► user-filter ─► ratelimit ─► quota
//!         ─► (batch|direct) ─► circuit ─► offline-queue ─► retry ─► compress ─► POST
//! ```
//!
//! ## Guarantees
//! - Every admitted capture ends in exactly one terminal outcome:
//!   delivered, durably queued, or dropped with an accounted reason
//! - Counters are charged only after every admission stage has passed
//! - Sensitive values are scrubbed before a report can leave the process
//! - The transport is never invoked while the circuit breaker is open
//! - The offline queue and quota ledger survive restarts via the
//!   pluggable durable store
//!
//! ## Non-Guarantees
//! - No total delivery ordering across the batch and queue paths
//! - No exactly-once delivery
//! - No payload signing
//! - No server-side aggregation or storage
//!
//! # Quick Start
//!
//! ```no_run
//! use error_shipper::{Shipper, ShipperConfig};
//!
//! # async fn run() {
//! let shipper = Shipper::new(ShipperConfig::new(
//!     "https://ingest.example.com/errors",
//!     "checkout-service",
//! ))
//! .await;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
//! shipper.capture_error(&error).await;
//! shipper.flush().await;
//! # }
//! ```

mod batch;
mod breadcrumbs;
mod circuit;
mod compress;
mod config;
mod delivery;
mod error;
mod fingerprint;
mod format;
mod health;
mod network;
mod observe;
mod queue;
mod quota;
mod rate_limit;
mod redact;
mod shipper;
mod storage;
mod transport;
mod types;
mod validate;

pub mod global;
pub mod retry;

#[cfg(feature = "redis")]
mod storage_redis;

pub use batch::{BatchAggregator, BatchSettings, EnvelopeSink, FlushDisposition};
pub use breadcrumbs::BreadcrumbRecorder;
pub use circuit::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use compress::{Compressor, Encoding};
pub use config::{BeforeSend, ShipperConfig};
pub use delivery::{DeliveryService, DeliverySettings, SendError};
pub use error::{
    CaptureOutcome,
    ConfigError,
    DropReason,
    FailureReason,
    QuotaLimit,
};
pub use health::{HealthMonitor, HealthStats, HealthStatus, SdkHealth};
pub use network::NetworkMonitor;
pub use queue::{OfflineQueue, QueueSettings};
pub use quota::{QuotaAccountant, QuotaLedger, QuotaSnapshot};
pub use rate_limit::{RateDecision, RateLimiter, RateLimiterSnapshot};
pub use retry::{RetryConfig, RetryOutcome};
pub use shipper::{Shipper, ShipperBuilder, ShipperStats};
pub use storage::{
    FileStore,
    InMemoryStore,
    KeyValueStore,
    StoreError,
    OFFLINE_QUEUE_KEY,
    QUOTA_LEDGER_KEY,
};
pub use transport::{Transport, WebhookRequest};
pub use types::{
    BatchEnvelope,
    Breadcrumb,
    ErrorReport,
    Level,
    QueuedItem,
    RequestInfo,
    RuntimeInfo,
    UserInfo,
};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

#[cfg(feature = "redis")]
pub use storage_redis::RedisStore;
