//! Bounded exponential backoff around the transport.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::FailureReason;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Apply ±10% jitter to each computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, FailureReason>,
    /// Attempts actually made, including the first.
    pub attempts: u32,
    pub total_elapsed: Duration,
}

/// Backoff before attempt `attempt` (0-indexed; only meaningful for ≥1):
/// `min(initial · multiplier^(attempt-1), max)`, without jitter.
pub fn delay_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = config.multiplier.max(1.0).powi(exponent as i32);
    let delay_ms = (config.initial_delay.as_millis() as f64 * factor)
        .min(config.max_delay.as_millis() as f64);
    Duration::from_millis(delay_ms as u64)
}

fn apply_jitter(delay: Duration) -> Duration {
    let delay_ms = delay.as_millis() as i64;
    let spread = delay_ms / 10;
    if spread == 0 {
        return delay;
    }
    let offset = fastrand::i64(-spread..=spread);
    Duration::from_millis((delay_ms + offset).max(0) as u64)
}

/// Run `operation` up to `max_retries + 1` times.
///
/// Non-retryable failures stop the loop immediately; the operation is
/// considered failed only after the final attempt.
pub async fn run<T, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FailureReason>>,
{
    let started = Instant::now();
    let total_attempts = config.max_retries + 1;
    let mut last_failure = FailureReason::MaxRetriesExceeded;

    for attempt in 0..total_attempts {
        if attempt > 0 {
            let mut delay = delay_for_attempt(config, attempt);
            if config.jitter {
                delay = apply_jitter(delay);
            }
            sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_elapsed: started.elapsed(),
                };
            }
            Err(reason) => {
                last_failure = reason;
                if !reason.is_retryable() {
                    return RetryOutcome {
                        result: Err(reason),
                        attempts: attempt + 1,
                        total_elapsed: started.elapsed(),
                    };
                }
            }
        }
    }

    RetryOutcome {
        result: Err(last_failure),
        attempts: total_attempts,
        total_elapsed: started.elapsed(),
    }
}
