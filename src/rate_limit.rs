//! Sliding-window admission cap with fingerprint duplicate suppression.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DropReason;

/// Outcome of a rate-limit admission check.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    /// Admissions left in the current window.
    pub remaining: usize,
    /// Time until the oldest admission ages out, when denied by the cap.
    pub reset_after: Option<Duration>,
    pub reason: Option<DropReason>,
}

impl RateDecision {
    fn allow(remaining: usize) -> Self {
        Self { allowed: true, remaining, reset_after: None, reason: None }
    }
}

/// Read-side view of the limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub window_count: usize,
    pub remaining: usize,
    pub tracked_fingerprints: usize,
}

/// Per-window request cap plus a per-fingerprint duplicate window.
///
/// Checking and marking are separate operations: a check consumes nothing,
/// and only a fully admitted report is marked. Both stores decay by window
/// sweep; a full sweep also runs once per window to bound memory between
/// admission checks.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    duplicate_window: Duration,
    timestamps: VecDeque<Instant>,
    fingerprints: HashMap<String, Instant>,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, duplicate_window: Duration) -> Self {
        Self {
            max_requests,
            window,
            duplicate_window,
            timestamps: VecDeque::new(),
            fingerprints: HashMap::new(),
            last_sweep: Instant::now(),
        }
    }

    /// Admission check. Window cap first, then duplicate window.
    pub fn check(&mut self, fingerprint: &str) -> RateDecision {
        let now = Instant::now();
        self.prune(now);
        if now.duration_since(self.last_sweep) >= self.window {
            self.sweep(now);
        }

        if self.timestamps.len() >= self.max_requests {
            let reset_after = self
                .timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)));
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_after,
                reason: Some(DropReason::RateLimited),
            };
        }

        if let Some(last_seen) = self.fingerprints.get(fingerprint) {
            if now.duration_since(*last_seen) < self.duplicate_window {
                return RateDecision {
                    allowed: false,
                    remaining: self.remaining(),
                    reset_after: None,
                    reason: Some(DropReason::DuplicateError),
                };
            }
        }

        RateDecision::allow(self.remaining())
    }

    /// Charge an admission. Called only after every stage has admitted.
    pub fn mark(&mut self, fingerprint: &str) {
        let now = Instant::now();
        self.timestamps.push_back(now);
        self.fingerprints.insert(fingerprint.to_string(), now);
    }

    /// Admissions left in the current window.
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        RateLimiterSnapshot {
            window_count: self.timestamps.len(),
            remaining: self.remaining(),
            tracked_fingerprints: self.fingerprints.len(),
        }
    }

    /// Forget all admissions and fingerprints.
    pub fn reset(&mut self) {
        self.timestamps.clear();
        self.fingerprints.clear();
        self.last_sweep = Instant::now();
    }

    /// Replace the limiter's parameters; existing admissions are kept.
    pub fn update(&mut self, max_requests: usize, window: Duration, duplicate_window: Duration) {
        self.max_requests = max_requests;
        self.window = window;
        self.duplicate_window = duplicate_window;
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn sweep(&mut self, now: Instant) {
        self.prune(now);
        let duplicate_window = self.duplicate_window;
        self.fingerprints
            .retain(|_, last_seen| now.duration_since(*last_seen) < duplicate_window);
        self.last_sweep = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize) -> RateLimiter {
        RateLimiter::new(max, Duration::from_secs(60), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_the_cap() {
        let mut rl = limiter(3);
        for i in 0..3 {
            let decision = rl.check(&format!("fp-{}", i));
            assert!(decision.allowed);
            rl.mark(&format!("fp-{}", i));
        }

        let denied = rl.check("fp-3");
        assert!(!denied.allowed);
        assert_eq!(denied.reason, Some(DropReason::RateLimited));
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_after.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cap_boundary_is_exact() {
        let mut rl = limiter(10);
        for i in 0..9 {
            rl.mark(&format!("fp-{}", i));
        }
        assert!(rl.check("fp-9").allowed);
        rl.mark("fp-9");
        assert!(!rl.check("fp-10").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_are_suppressed_within_the_window() {
        let mut rl = limiter(10);
        assert!(rl.check("same").allowed);
        rl.mark("same");

        let denied = rl.check("same");
        assert!(!denied.allowed);
        assert_eq!(denied.reason, Some(DropReason::DuplicateError));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(rl.check("same").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn checks_do_not_charge() {
        let mut rl = limiter(2);
        for _ in 0..5 {
            assert!(rl.check("fp").allowed);
        }
        assert_eq!(rl.snapshot().window_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_restores_capacity() {
        let mut rl = limiter(1);
        rl.mark("a");
        assert!(!rl.check("b").allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(rl.check("b").allowed);
        assert_eq!(rl.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_tracks_configured_cap() {
        let mut rl = limiter(25);
        rl.mark("a");
        rl.mark("b");
        assert_eq!(rl.remaining(), 23);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_unblocks_everything() {
        let mut rl = limiter(1);
        rl.mark("dup");
        assert!(!rl.check("dup").allowed);

        rl.reset();
        assert!(rl.check("dup").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_stale_fingerprints() {
        let mut rl = limiter(10);
        rl.mark("old");
        tokio::time::advance(Duration::from_secs(61)).await;
        let _ = rl.check("new");
        assert_eq!(rl.snapshot().tracked_fingerprints, 0);
    }
}
