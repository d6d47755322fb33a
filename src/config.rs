use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::ErrorReport;

/// User filter hook invoked with the redacted report.
///
/// Returning `None` drops the report; returning a (possibly modified)
/// report lets it continue through the pipeline.
pub type BeforeSend = Arc<dyn Fn(ErrorReport) -> Option<ErrorReport> + Send + Sync>;

/// Configuration for a [`Shipper`](crate::Shipper).
///
/// Only `webhook_url` and `project_name` are required; everything else has
/// a production-ready default.
#[derive(Clone)]
pub struct ShipperConfig {
    /// Ingestion webhook to POST reports to.
    pub webhook_url: String,

    /// Project label stamped on every report.
    pub project_name: String,

    /// Master gate. When false, captures drop at the entry.
    pub enabled: bool,

    /// Free-form environment label ("production", "staging", ...).
    pub environment: String,

    /// Release version stamped on reports.
    pub version: Option<String>,

    /// VCS commit stamped on reports.
    pub commit_hash: Option<String>,

    /// Stage-level diagnostic logging.
    pub debug: bool,

    /// Require an https webhook URL. Unset means "required in production".
    pub require_https: Option<bool>,

    /// Breadcrumbs retained by the recorder; oldest evicted first.
    pub max_breadcrumbs: usize,

    /// Upper bound on a serialized report, in bytes.
    pub max_payload_size: usize,

    /// Per-request transport timeout.
    pub timeout: Duration,

    /// Admissions allowed per rate-limit window.
    pub max_requests_per_minute: usize,

    /// Window during which an identical fingerprint is suppressed.
    pub duplicate_error_window: Duration,

    /// Retry attempts after the initial delivery attempt.
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_multiplier: f64,

    /// Queue undeliverable reports for the next online edge.
    pub enable_offline_support: bool,
    pub max_offline_queue_size: usize,
    pub offline_queue_max_age: Duration,

    /// Usage quotas persisted across restarts.
    pub daily_limit: u64,
    pub monthly_limit: u64,
    pub burst_limit: usize,
    pub burst_window: Duration,

    /// Gzip bodies at or above the threshold.
    pub enable_compression: bool,
    pub compression_threshold: usize,

    /// Group reports into envelopes before sending.
    pub enable_batching: bool,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub max_batch_payload_size: usize,

    /// Circuit breaker around the transport.
    pub failure_threshold: f64,
    pub minimum_requests: usize,
    pub monitoring_period: Duration,
    pub reset_timeout: Duration,

    /// User filter applied after redaction.
    pub before_send: Option<BeforeSend>,
}

impl ShipperConfig {
    /// A configuration with defaults for everything but the required fields.
    pub fn new(webhook_url: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            project_name: project_name.into(),
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_commit_hash(mut self, commit_hash: impl Into<String>) -> Self {
        self.commit_hash = Some(commit_hash.into());
        self
    }

    pub fn with_before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(ErrorReport) -> Option<ErrorReport> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }

    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.enable_batching = enabled;
        self
    }

    pub fn with_offline_support(mut self, enabled: bool) -> Self {
        self.enable_offline_support = enabled;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    /// Whether the webhook URL must be https.
    pub fn https_required(&self) -> bool {
        self.require_https.unwrap_or(self.environment == "production")
    }

    /// Check the configuration for fatal problems.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook_url.trim().is_empty() {
            return Err(ConfigError::MissingWebhookUrl);
        }
        if self.project_name.trim().is_empty() {
            return Err(ConfigError::MissingProjectName);
        }
        if self.https_required() && !self.webhook_url.starts_with("https://") {
            return Err(ConfigError::InsecureWebhookUrl {
                url: self.webhook_url.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(ConfigError::InvalidOption {
                option: "failure_threshold",
                detail: format!("{} is not a fraction in [0, 1]", self.failure_threshold),
            });
        }
        if self.retry_multiplier < 1.0 {
            return Err(ConfigError::InvalidOption {
                option: "retry_multiplier",
                detail: format!("{} is below 1.0", self.retry_multiplier),
            });
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::InvalidOption {
                option: "max_payload_size",
                detail: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            project_name: String::new(),
            enabled: true,
            environment: "development".to_string(),
            version: None,
            commit_hash: None,
            debug: false,
            require_https: None,
            max_breadcrumbs: 50,
            max_payload_size: 1024 * 1024,
            timeout: Duration::from_millis(5_000),
            max_requests_per_minute: 10,
            duplicate_error_window: Duration::from_millis(5_000),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(1_000),
            max_retry_delay: Duration::from_millis(30_000),
            retry_multiplier: 2.0,
            enable_offline_support: true,
            max_offline_queue_size: 50,
            offline_queue_max_age: Duration::from_millis(86_400_000),
            daily_limit: 1_000,
            monthly_limit: 10_000,
            burst_limit: 50,
            burst_window: Duration::from_millis(60_000),
            enable_compression: true,
            compression_threshold: 1_024,
            enable_batching: true,
            batch_size: 5,
            batch_timeout: Duration::from_millis(5_000),
            max_batch_payload_size: 102_400,
            failure_threshold: 0.5,
            minimum_requests: 3,
            monitoring_period: Duration::from_millis(60_000),
            reset_timeout: Duration::from_millis(30_000),
            before_send: None,
        }
    }
}

impl fmt::Debug for ShipperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipperConfig")
            .field("webhook_url", &self.webhook_url)
            .field("project_name", &self.project_name)
            .field("enabled", &self.enabled)
            .field("environment", &self.environment)
            .field("enable_batching", &self.enable_batching)
            .field("enable_offline_support", &self.enable_offline_support)
            .field("enable_compression", &self.enable_compression)
            .field("before_send", &self.before_send.as_ref().map(|_| "<hook>"))
            .finish_non_exhaustive()
    }
}
