//! Failure-rate gate around the transport.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Breaker states. While OPEN the transport must not be invoked; in
/// HALF_OPEN at most one trial request is in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-side view of the breaker.
#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub window_samples: usize,
    pub window_failures: usize,
    pub times_opened: u64,
}

/// Three-state circuit breaker over a sliding outcome window.
///
/// Transitions are lazy: OPEN moves to HALF_OPEN on the first admission
/// check after `reset_timeout`, with no timer involved. A request
/// dispatched while CLOSED may record its failure after the breaker has
/// already opened; the sample still counts inside the monitoring window.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: f64,
    minimum_requests: usize,
    monitoring_period: Duration,
    reset_timeout: Duration,
    state: CircuitState,
    state_entered_at: Instant,
    /// (when, success) pairs bounded by the monitoring period.
    outcomes: VecDeque<(Instant, bool)>,
    trial_in_flight: bool,
    times_opened: u64,
}

impl CircuitBreaker {
    /// `failure_threshold` is a fraction in `[0, 1]`.
    pub fn new(
        failure_threshold: f64,
        minimum_requests: usize,
        monitoring_period: Duration,
        reset_timeout: Duration,
    ) -> Self {
        Self {
            failure_threshold,
            minimum_requests,
            monitoring_period,
            reset_timeout,
            state: CircuitState::Closed,
            state_entered_at: Instant::now(),
            outcomes: VecDeque::new(),
            trial_in_flight: false,
            times_opened: 0,
        }
    }

    /// Admission check; may perform the lazy OPEN → HALF_OPEN transition.
    pub fn can_execute(&mut self) -> bool {
        let now = Instant::now();
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if now.duration_since(self.state_entered_at) >= self.reset_timeout {
                    self.transition(CircuitState::HalfOpen, now);
                    self.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        let now = Instant::now();
        self.push_outcome(now, true);
        match self.state {
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                self.transition(CircuitState::Closed, now);
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.push_outcome(now, false);
        match self.state {
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                self.open(now);
            }
            CircuitState::Closed => {
                if self.should_open() {
                    self.open(now);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Operator/test override: trip the breaker immediately.
    pub fn force_open(&mut self) {
        self.open(Instant::now());
    }

    /// Operator/test override: close the breaker and forget the window.
    pub fn force_close(&mut self) {
        let now = Instant::now();
        self.outcomes.clear();
        self.trial_in_flight = false;
        self.transition(CircuitState::Closed, now);
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        CircuitSnapshot {
            state: self.state,
            window_samples: self.outcomes.len(),
            window_failures: failures,
            times_opened: self.times_opened,
        }
    }

    fn open(&mut self, now: Instant) {
        if self.state != CircuitState::Open {
            self.times_opened += 1;
        }
        self.transition(CircuitState::Open, now);
    }

    fn transition(&mut self, next: CircuitState, now: Instant) {
        self.state = next;
        self.state_entered_at = now;
    }

    fn push_outcome(&mut self, now: Instant, success: bool) {
        self.outcomes.push_back((now, success));
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some((when, _)) = self.outcomes.front() {
            if now.duration_since(*when) >= self.monitoring_period {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn should_open(&self) -> bool {
        if self.outcomes.len() < self.minimum_requests {
            return false;
        }
        let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        let rate = failures as f64 / self.outcomes.len() as f64;
        rate >= self.failure_threshold
    }
}
