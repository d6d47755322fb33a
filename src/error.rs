use std::fmt;

/// Errors surfaced when a configuration cannot be accepted at init time.
///
/// A failed validation does not panic: the shipper is constructed in a
/// disabled state and every capture becomes a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No webhook URL was provided.
    MissingWebhookUrl,

    /// No project name was provided.
    MissingProjectName,

    /// The webhook URL is not HTTPS while HTTPS is required.
    InsecureWebhookUrl { url: String },

    /// An option value is outside its accepted range.
    InvalidOption { option: &'static str, detail: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingWebhookUrl =>
                write!(f, "webhook URL is required"),
            ConfigError::MissingProjectName =>
                write!(f, "project name is required"),
            ConfigError::InsecureWebhookUrl { url } =>
                write!(f, "webhook URL must use https: {}", url),
            ConfigError::InvalidOption { option, detail } =>
                write!(f, "invalid value for {}: {}", option, detail),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The quota limit that rejected an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLimit {
    PayloadSize,
    Burst,
    Daily,
    Monthly,
}

/// Reasons why a captured report was dropped *without* reaching the wire.
///
/// Every drop is accounted exactly once under its reason string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The shipper is disabled (config gate, failed validation, or destroyed).
    Disabled,

    /// Capture was invoked before initialization completed.
    NotInitialized,

    /// The report failed a validation check.
    ValidationFailed { detail: String },

    /// The `before_send` hook returned `None`.
    FilteredByHook,

    /// The per-window request cap was reached.
    RateLimited,

    /// An identical fingerprint was seen within the duplicate window.
    DuplicateError,

    /// A usage quota rejected the report.
    QuotaExceeded(QuotaLimit),

    /// The circuit breaker is open and offline support is disabled.
    CircuitOpen,

    /// Delivery failed after all retries with offline support disabled.
    DeliveryFailed(FailureReason),

    /// A queued report was given up on after repeated flush failures.
    RetriesExhausted,
}

impl DropReason {
    /// Stable reason string used as the suppression counter key.
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Disabled => "SDK disabled",
            DropReason::NotInitialized => "Not initialized",
            DropReason::ValidationFailed { .. } => "Validation failed",
            DropReason::FilteredByHook => "Filtered by before_send",
            DropReason::RateLimited => "Rate limit exceeded",
            DropReason::DuplicateError => "Duplicate error",
            DropReason::QuotaExceeded(QuotaLimit::PayloadSize) => "Payload size quota exceeded",
            DropReason::QuotaExceeded(QuotaLimit::Burst) => "Burst limit exceeded",
            DropReason::QuotaExceeded(QuotaLimit::Daily) => "Daily limit exceeded",
            DropReason::QuotaExceeded(QuotaLimit::Monthly) => "Monthly limit exceeded",
            DropReason::CircuitOpen => "Circuit open",
            DropReason::DeliveryFailed(_) => "Delivery failed",
            DropReason::RetriesExhausted => "Retries exhausted",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::ValidationFailed { detail } =>
                write!(f, "Validation failed: {}", detail),
            DropReason::DeliveryFailed(reason) =>
                write!(f, "Delivery failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Reasons why a single webhook delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Network,
    RemoteError,
    ClientError,
    MaxRetriesExceeded,
}

impl FailureReason {
    /// Client errors carry a definitive rejection; retrying them cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::ClientError)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout =>
                write!(f, "request timed out"),
            FailureReason::Network =>
                write!(f, "network error"),
            FailureReason::RemoteError =>
                write!(f, "remote endpoint returned error"),
            FailureReason::ClientError =>
                write!(f, "client error (non-retryable)"),
            FailureReason::MaxRetriesExceeded =>
                write!(f, "maximum retries exceeded"),
        }
    }
}

impl std::error::Error for FailureReason {}

/// Terminal outcome of a capture call.
///
/// Exactly one outcome is recorded per capture: the report was handed to
/// the wire, parked in a batch, durably queued, or dropped with a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The report was delivered to the webhook.
    Delivered,

    /// The report joined the current batch; delivery happens on flush.
    Batched,

    /// The report was durably queued for a later flush.
    Queued,

    /// The report was dropped at a pipeline stage.
    Dropped(DropReason),
}

impl CaptureOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, CaptureOutcome::Dropped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_reason_strings_are_stable() {
        assert_eq!(DropReason::RateLimited.as_str(), "Rate limit exceeded");
        assert_eq!(DropReason::DuplicateError.as_str(), "Duplicate error");
        assert_eq!(
            DropReason::QuotaExceeded(QuotaLimit::Daily).as_str(),
            "Daily limit exceeded"
        );
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!FailureReason::ClientError.is_retryable());
        assert!(FailureReason::Timeout.is_retryable());
        assert!(FailureReason::RemoteError.is_retryable());
        assert!(FailureReason::Network.is_retryable());
    }
}
