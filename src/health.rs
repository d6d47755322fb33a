//! Read-side performance counters and the health score.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DropReason;
use crate::observe;

/// Response-time samples kept for the sliding average.
const RESPONSE_SAMPLES: usize = 20;

const SLOW_RESPONSE: Duration = Duration::from_millis(5_000);
const QUEUE_BACKLOG: usize = 10;
const MEMORY_CEILING: u64 = 50 * 1024 * 1024;

/// Aggregate health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Output of [`HealthMonitor::assess`].
#[derive(Debug, Clone)]
pub struct SdkHealth {
    pub score: u32,
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Counter snapshot surfaced through `get_stats`.
#[derive(Debug, Clone)]
pub struct HealthStats {
    pub errors_reported: u64,
    pub errors_suppressed: u64,
    pub suppressed_by_reason: HashMap<String, u64>,
    pub retry_attempts: u64,
    pub validation_warnings: u64,
    pub average_response_time: Option<Duration>,
    pub uptime: Duration,
    pub memory_usage_bytes: Option<u64>,
}

#[derive(Default)]
struct Window {
    suppressed_by_reason: HashMap<String, u64>,
    response_samples: VecDeque<Duration>,
}

/// Accumulates pipeline outcomes; purely observational.
pub struct HealthMonitor {
    started_at: Instant,
    errors_reported: AtomicU64,
    errors_suppressed: AtomicU64,
    retry_attempts: AtomicU64,
    validation_warnings: AtomicU64,
    window: Mutex<Window>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            errors_reported: AtomicU64::new(0),
            errors_suppressed: AtomicU64::new(0),
            retry_attempts: AtomicU64::new(0),
            validation_warnings: AtomicU64::new(0),
            window: Mutex::new(Window::default()),
        }
    }

    pub fn record_reported(&self) {
        self.record_reported_count(1);
    }

    /// Record `count` reports reaching the webhook in one send.
    pub fn record_reported_count(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.errors_reported.fetch_add(count, Ordering::Relaxed);
        observe::metric_add("error_shipper.reported", count);
    }

    pub fn record_suppressed(&self, reason: &DropReason) {
        self.errors_suppressed.fetch_add(1, Ordering::Relaxed);
        observe::metric_inc_reason("error_shipper.suppressed", reason.as_str());
        let mut window = self.window.lock().expect("health window");
        *window
            .suppressed_by_reason
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_retry_attempts(&self, retries: u64) {
        if retries > 0 {
            self.retry_attempts.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub fn record_validation_warnings(&self, count: u64) {
        if count > 0 {
            self.validation_warnings.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        let mut window = self.window.lock().expect("health window");
        if window.response_samples.len() == RESPONSE_SAMPLES {
            window.response_samples.pop_front();
        }
        window.response_samples.push_back(elapsed);
    }

    pub fn stats(&self) -> HealthStats {
        let window = self.window.lock().expect("health window");
        HealthStats {
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
            errors_suppressed: self.errors_suppressed.load(Ordering::Relaxed),
            suppressed_by_reason: window.suppressed_by_reason.clone(),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            validation_warnings: self.validation_warnings.load(Ordering::Relaxed),
            average_response_time: average(&window.response_samples),
            uptime: self.started_at.elapsed(),
            memory_usage_bytes: memory_usage_bytes(),
        }
    }

    /// Score the SDK: 100 minus a deduction per unhealthy signal.
    pub fn assess(&self, offline_queue_size: usize) -> SdkHealth {
        let stats = self.stats();
        let mut score: u32 = 100;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        let total = stats.errors_reported + stats.errors_suppressed;
        if total > 0 && stats.errors_suppressed * 2 > total {
            score -= 20;
            issues.push("more than half of captures are being suppressed".to_string());
            recommendations
                .push("review rate limits, quotas, and duplicate volume".to_string());
        }

        if let Some(avg) = stats.average_response_time {
            if avg > SLOW_RESPONSE {
                score -= 15;
                issues.push(format!(
                    "average webhook response time is {}ms",
                    avg.as_millis()
                ));
                recommendations.push("check ingestion endpoint latency".to_string());
            }
        }

        if offline_queue_size > QUEUE_BACKLOG {
            score -= 10;
            issues.push(format!(
                "{} reports waiting in the offline queue",
                offline_queue_size
            ));
            recommendations.push("verify network connectivity".to_string());
        }

        if let Some(memory) = stats.memory_usage_bytes {
            if memory > MEMORY_CEILING {
                score -= 10;
                issues.push(format!("resident memory is {}MiB", memory / (1024 * 1024)));
                recommendations.push("reduce breadcrumb and queue retention".to_string());
            }
        }

        let status = match score {
            s if s >= 80 => HealthStatus::Healthy,
            s if s >= 60 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        };

        SdkHealth { score, status, issues, recommendations }
    }

    /// Forget all counters; uptime restarts.
    pub fn reset(&self) {
        self.errors_reported.store(0, Ordering::Relaxed);
        self.errors_suppressed.store(0, Ordering::Relaxed);
        self.retry_attempts.store(0, Ordering::Relaxed);
        self.validation_warnings.store(0, Ordering::Relaxed);
        let mut window = self.window.lock().expect("health window");
        window.suppressed_by_reason.clear();
        window.response_samples.clear();
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn average(samples: &VecDeque<Duration>) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: Duration = samples.iter().sum();
    Some(total / samples.len() as u32)
}

/// Resident set size, where the platform exposes it.
fn memory_usage_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_accumulate() {
        let monitor = HealthMonitor::new();
        monitor.record_reported();
        monitor.record_reported();
        monitor.record_suppressed(&DropReason::RateLimited);
        monitor.record_suppressed(&DropReason::RateLimited);
        monitor.record_suppressed(&DropReason::DuplicateError);
        monitor.record_retry_attempts(3);

        let stats = monitor.stats();
        assert_eq!(stats.errors_reported, 2);
        assert_eq!(stats.errors_suppressed, 3);
        assert_eq!(stats.suppressed_by_reason["Rate limit exceeded"], 2);
        assert_eq!(stats.suppressed_by_reason["Duplicate error"], 1);
        assert_eq!(stats.retry_attempts, 3);
    }

    #[tokio::test]
    async fn response_window_is_bounded() {
        let monitor = HealthMonitor::new();
        for i in 0..30 {
            monitor.record_response_time(Duration::from_millis(i));
        }
        let window = monitor.window.lock().unwrap();
        assert_eq!(window.response_samples.len(), RESPONSE_SAMPLES);
        // Oldest samples were evicted.
        assert_eq!(window.response_samples.front(), Some(&Duration::from_millis(10)));
    }

    #[tokio::test]
    async fn quiet_pipeline_is_healthy() {
        let monitor = HealthMonitor::new();
        let health = monitor.assess(0);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.issues.is_empty());
    }

    #[tokio::test]
    async fn heavy_suppression_degrades_the_score() {
        let monitor = HealthMonitor::new();
        monitor.record_reported();
        for _ in 0..3 {
            monitor.record_suppressed(&DropReason::RateLimited);
        }

        let health = monitor.assess(0);
        assert!(health.score <= 80);
        assert!(!health.issues.is_empty());
        assert_eq!(health.issues.len(), health.recommendations.len());
    }

    #[tokio::test]
    async fn slow_responses_and_backlog_stack_deductions() {
        let monitor = HealthMonitor::new();
        monitor.record_reported();
        for _ in 0..3 {
            monitor.record_suppressed(&DropReason::RateLimited);
        }
        monitor.record_response_time(Duration::from_millis(6_000));

        let health = monitor.assess(QUEUE_BACKLOG + 1);
        // 100 - 20 - 15 - 10, modulo the memory deduction.
        assert!(health.score <= 55);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }
}
