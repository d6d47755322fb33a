//! Daily/monthly/burst usage accounting, persisted across restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DropReason, QuotaLimit};
use crate::storage::{KeyValueStore, QUOTA_LEDGER_KEY};

/// Persisted counters. Day and month keys are UTC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLedger {
    pub daily_count: u64,
    pub monthly_count: u64,
    pub burst_timestamps: Vec<DateTime<Utc>>,
    pub last_day_key: String,
    pub last_month_key: String,
}

impl QuotaLedger {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            daily_count: 0,
            monthly_count: 0,
            burst_timestamps: Vec::new(),
            last_day_key: day_key(now),
            last_month_key: month_key(now),
        }
    }
}

fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn month_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

/// Read-side view of remaining quota.
#[derive(Debug, Clone)]
pub struct QuotaSnapshot {
    pub daily_used: u64,
    pub daily_remaining: u64,
    pub monthly_used: u64,
    pub monthly_remaining: u64,
    pub burst_used: usize,
}

/// Enforces payload-size, burst, daily, and monthly limits, in that order.
///
/// Checking and charging are separate: [`check`](Self::check) consumes
/// nothing, [`record_usage`](Self::record_usage) increments and persists.
/// Every access reconciles the ledger first, so a day or month rollover
/// zeroes the matching counter before the next decision resolves.
pub struct QuotaAccountant {
    daily_limit: u64,
    monthly_limit: u64,
    burst_limit: usize,
    burst_window: Duration,
    max_payload_size: usize,
    ledger: QuotaLedger,
    store: Arc<dyn KeyValueStore>,
    store_failure_logged: bool,
}

impl QuotaAccountant {
    /// Load the persisted ledger, falling back to a fresh one on a missing
    /// or unparseable value (only historical counts are lost).
    pub async fn load(
        daily_limit: u64,
        monthly_limit: u64,
        burst_limit: usize,
        burst_window: Duration,
        max_payload_size: usize,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let now = Utc::now();
        let ledger = match store.get(QUOTA_LEDGER_KEY).await {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| QuotaLedger::fresh(now)),
            None => QuotaLedger::fresh(now),
        };

        let mut accountant = Self {
            daily_limit,
            monthly_limit,
            burst_limit,
            burst_window,
            max_payload_size,
            ledger,
            store,
            store_failure_logged: false,
        };
        accountant.reconcile(now);
        accountant
    }

    /// Admission check; returns the first failing limit.
    pub fn check(&mut self, payload_size: usize) -> Option<DropReason> {
        let now = Utc::now();
        self.reconcile(now);

        // An oversize item must not consume quota, so size rejects first.
        if payload_size > self.max_payload_size {
            return Some(DropReason::QuotaExceeded(QuotaLimit::PayloadSize));
        }
        if self.ledger.burst_timestamps.len() >= self.burst_limit {
            return Some(DropReason::QuotaExceeded(QuotaLimit::Burst));
        }
        if self.ledger.daily_count >= self.daily_limit {
            return Some(DropReason::QuotaExceeded(QuotaLimit::Daily));
        }
        if self.ledger.monthly_count >= self.monthly_limit {
            return Some(DropReason::QuotaExceeded(QuotaLimit::Monthly));
        }
        None
    }

    /// Charge one admitted report and persist the ledger.
    pub async fn record_usage(&mut self) {
        let now = Utc::now();
        self.reconcile(now);
        self.ledger.daily_count += 1;
        self.ledger.monthly_count += 1;
        self.ledger.burst_timestamps.push(now);
        self.persist().await;
    }

    /// Zero all counters and persist.
    pub async fn reset(&mut self) {
        self.ledger = QuotaLedger::fresh(Utc::now());
        self.persist().await;
    }

    /// Replace the limits; counters are kept.
    pub fn update(
        &mut self,
        daily_limit: u64,
        monthly_limit: u64,
        burst_limit: usize,
        burst_window: Duration,
        max_payload_size: usize,
    ) {
        self.daily_limit = daily_limit;
        self.monthly_limit = monthly_limit;
        self.burst_limit = burst_limit;
        self.burst_window = burst_window;
        self.max_payload_size = max_payload_size;
    }

    pub fn snapshot(&mut self) -> QuotaSnapshot {
        self.reconcile(Utc::now());
        QuotaSnapshot {
            daily_used: self.ledger.daily_count,
            daily_remaining: self.daily_limit.saturating_sub(self.ledger.daily_count),
            monthly_used: self.ledger.monthly_count,
            monthly_remaining: self.monthly_limit.saturating_sub(self.ledger.monthly_count),
            burst_used: self.ledger.burst_timestamps.len(),
        }
    }

    /// Test/operator hook: overwrite the ledger wholesale.
    pub fn set_ledger(&mut self, ledger: QuotaLedger) {
        self.ledger = ledger;
    }

    fn reconcile(&mut self, now: DateTime<Utc>) {
        let day = day_key(now);
        if self.ledger.last_day_key != day {
            self.ledger.daily_count = 0;
            self.ledger.last_day_key = day;
        }

        let month = month_key(now);
        if self.ledger.last_month_key != month {
            self.ledger.monthly_count = 0;
            self.ledger.last_month_key = month;
        }

        let window = chrono::Duration::from_std(self.burst_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        self.ledger
            .burst_timestamps
            .retain(|ts| now.signed_duration_since(*ts) < window);
    }

    async fn persist(&mut self) {
        let raw = match serde_json::to_string(&self.ledger) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        if let Err(e) = self.store.set(QUOTA_LEDGER_KEY, &raw).await {
            if !self.store_failure_logged {
                self.store_failure_logged = true;
                crate::observe::trace_warn(&format!("quota ledger not persisted: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    async fn accountant(daily: u64, monthly: u64, burst: usize) -> QuotaAccountant {
        QuotaAccountant::load(
            daily,
            monthly,
            burst,
            Duration::from_secs(60),
            1024 * 1024,
            Arc::new(InMemoryStore::new()),
        )
        .await
    }

    #[tokio::test]
    async fn admits_until_daily_limit() {
        let mut q = accountant(2, 100, 50).await;
        assert_eq!(q.check(10), None);
        q.record_usage().await;
        q.record_usage().await;
        assert_eq!(
            q.check(10),
            Some(DropReason::QuotaExceeded(QuotaLimit::Daily))
        );
    }

    #[tokio::test]
    async fn oversize_payload_rejects_before_counters() {
        let mut q = accountant(0, 0, 0).await;
        // All counters are exhausted, but size still wins.
        assert_eq!(
            q.check(2 * 1024 * 1024),
            Some(DropReason::QuotaExceeded(QuotaLimit::PayloadSize))
        );
    }

    #[tokio::test]
    async fn burst_limit_precedes_daily() {
        let mut q = accountant(0, 0, 0).await;
        assert_eq!(
            q.check(10),
            Some(DropReason::QuotaExceeded(QuotaLimit::Burst))
        );
    }

    #[tokio::test]
    async fn check_does_not_charge() {
        let mut q = accountant(100, 100, 50).await;
        for _ in 0..10 {
            assert_eq!(q.check(10), None);
        }
        assert_eq!(q.snapshot().daily_used, 0);
    }

    #[tokio::test]
    async fn day_rollover_zeroes_the_daily_counter() {
        let mut q = accountant(1, 100, 50).await;
        q.record_usage().await;
        assert!(q.check(10).is_some());

        let mut ledger = q.ledger.clone();
        ledger.last_day_key = "1999-12-31".to_string();
        q.set_ledger(ledger);

        assert_eq!(q.check(10), None);
        assert_eq!(q.snapshot().daily_used, 0);
    }

    #[tokio::test]
    async fn month_rollover_zeroes_the_monthly_counter() {
        let mut q = accountant(1000, 1, 50).await;
        q.record_usage().await;
        assert!(q.check(10).is_some());

        let mut ledger = q.ledger.clone();
        ledger.last_month_key = "1999-12".to_string();
        q.set_ledger(ledger);

        assert_eq!(q.check(10), None);
    }

    #[tokio::test]
    async fn ledger_survives_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let mut q = QuotaAccountant::load(
            100,
            100,
            50,
            Duration::from_secs(60),
            1024,
            store.clone(),
        )
        .await;
        q.record_usage().await;
        q.record_usage().await;

        let mut reloaded = QuotaAccountant::load(
            100,
            100,
            50,
            Duration::from_secs(60),
            1024,
            store,
        )
        .await;
        assert_eq!(reloaded.snapshot().daily_used, 2);
        assert_eq!(reloaded.snapshot().monthly_used, 2);
    }

    #[tokio::test]
    async fn corrupt_ledger_starts_fresh() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        store.set(QUOTA_LEDGER_KEY, "not json").await.unwrap();

        let mut q = QuotaAccountant::load(
            100,
            100,
            50,
            Duration::from_secs(60),
            1024,
            store,
        )
        .await;
        assert_eq!(q.snapshot().daily_used, 0);
        assert_eq!(q.check(10), None);
    }

    #[tokio::test]
    async fn reset_readmits_blocked_reports() {
        let mut q = accountant(1, 100, 50).await;
        q.record_usage().await;
        assert!(q.check(10).is_some());

        q.reset().await;
        assert_eq!(q.check(10), None);
    }
}
