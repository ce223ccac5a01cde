//! Circuit breaker for destination protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: destination assumed down, calls fail fast
//! - Half-Open: testing if the destination recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate >= threshold over the sliding window
//! Open → Half-Open: after the open-state wait duration
//! Half-Open → Closed: trial calls succeed at an acceptable rate
//! Half-Open → Open: trial calls fail at or above the threshold
//! ```
//!
//! # Design Decisions
//! - Per-destination breaker (not global)
//! - Count-based sliding window of the most recent N outcomes
//! - Evaluation starts only after a minimum number of recorded calls
//! - Trial outcomes are judged as a batch once all half-open permits
//!   have completed

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::Outcome;

/// Breaker state, exposed for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Most recent outcomes, `true` = failure. Bounded by `window_size`.
    window: VecDeque<bool>,
    window_failures: u32,
    opened_at: Instant,
    /// Permits handed out since entering half-open.
    trial_permits: u32,
    /// Trial outcomes recorded so far.
    trial_done: u32,
    trial_failures: u32,
}

/// Sliding-window circuit breaker guarding one destination.
pub struct CircuitBreaker {
    service: String,
    failure_rate_threshold: f32,
    wait_duration: Duration,
    window_size: u32,
    min_calls: u32,
    half_open_calls: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `service` from its effective settings.
    pub fn new(service: &str, config: &CircuitBreakerConfig) -> Self {
        Self {
            service: service.to_string(),
            failure_rate_threshold: config.failure_rate_threshold,
            wait_duration: config.wait_duration(),
            window_size: config.window_size,
            min_calls: config.effective_min_calls(),
            half_open_calls: config.half_open_calls,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(config.window_size as usize),
                window_failures: 0,
                opened_at: Instant::now(),
                trial_permits: 0,
                trial_done: 0,
                trial_failures: 0,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    /// Ask permission to place a call. Returns `false` when the circuit
    /// rejects it (open, or half-open with all trial permits taken).
    /// A `true` answer must be balanced by one `record` call.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.opened_at.elapsed() >= self.wait_duration {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_permits = 1;
                    inner.trial_done = 0;
                    inner.trial_failures = 0;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_permits < self.half_open_calls {
                    inner.trial_permits += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the final outcome of a permitted call.
    ///
    /// `Outcome::Ignore` releases the permit without counting it, so a
    /// rate-limited attempt does not consume a half-open trial slot.
    pub fn record(&self, outcome: Outcome) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => {
                let failed = match outcome {
                    Outcome::Failure => true,
                    Outcome::Success => false,
                    Outcome::Ignore => return,
                };
                if inner.window.len() as u32 >= self.window_size {
                    if let Some(evicted) = inner.window.pop_front() {
                        if evicted {
                            inner.window_failures -= 1;
                        }
                    }
                }
                inner.window.push_back(failed);
                if failed {
                    inner.window_failures += 1;
                }

                let calls = inner.window.len() as u32;
                if calls >= self.min_calls {
                    let rate = inner.window_failures as f32 * 100.0 / calls as f32;
                    if rate >= self.failure_rate_threshold {
                        tracing::warn!(
                            service = %self.service,
                            failure_rate = rate,
                            calls,
                            "Circuit breaker opening"
                        );
                        inner.opened_at = Instant::now();
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::HalfOpen => {
                match outcome {
                    Outcome::Ignore => {
                        // Permit returned unused; keep the trial slot available.
                        inner.trial_permits = inner.trial_permits.saturating_sub(1);
                        return;
                    }
                    Outcome::Failure => inner.trial_failures += 1,
                    Outcome::Success => {}
                }
                inner.trial_done += 1;

                if inner.trial_done >= self.half_open_calls {
                    let rate =
                        inner.trial_failures as f32 * 100.0 / inner.trial_done as f32;
                    if rate >= self.failure_rate_threshold {
                        tracing::warn!(
                            service = %self.service,
                            failure_rate = rate,
                            "Trial calls failed, circuit reopening"
                        );
                        inner.opened_at = Instant::now();
                        self.transition(&mut inner, CircuitState::Open);
                    } else {
                        tracing::info!(service = %self.service, "Circuit breaker closing");
                        inner.window.clear();
                        inner.window_failures = 0;
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                }
            }
            // A call admitted before the circuit opened finished late; the
            // window that admitted it is gone, so the outcome is dropped.
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        inner.state = to;
        metrics::record_circuit_transition(&self.service, to.as_str());
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("state", &self.state())
            .field("window_size", &self.window_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: u32, wait_secs: u64, half_open: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_rate_threshold: 50.0,
            wait_duration_open_secs: wait_secs,
            window_size: window,
            min_calls: window,
            half_open_calls: half_open,
        }
    }

    fn drive(breaker: &CircuitBreaker, outcome: Outcome, times: u32) {
        for _ in 0..times {
            assert!(breaker.try_acquire());
            breaker.record(outcome);
        }
    }

    #[test]
    fn test_opens_at_failure_threshold() {
        let breaker = CircuitBreaker::new("svc", &config(10, 60, 2));

        drive(&breaker, Outcome::Success, 5);
        drive(&breaker, Outcome::Failure, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);

        // 5 failures out of 10 = 50% >= threshold.
        drive(&breaker, Outcome::Failure, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire(), "open circuit rejects calls");
    }

    #[test]
    fn test_no_evaluation_below_min_calls() {
        let breaker = CircuitBreaker::new("svc", &config(10, 60, 2));
        drive(&breaker, Outcome::Failure, 9);
        assert_eq!(
            breaker.state(),
            CircuitState::Closed,
            "nine recorded calls are below the minimum of ten"
        );
    }

    #[test]
    fn test_half_open_recovery() {
        let breaker = CircuitBreaker::new("svc", &config(4, 0, 2));
        drive(&breaker, Outcome::Failure, 4);
        assert_eq!(breaker.state(), CircuitState::Open);

        // wait_duration is zero: the next acquire moves to half-open.
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record(Outcome::Success);
        assert!(breaker.try_acquire());
        breaker.record(Outcome::Success);

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_relapse() {
        let breaker = CircuitBreaker::new("svc", &config(4, 0, 2));
        drive(&breaker, Outcome::Failure, 4);

        assert!(breaker.try_acquire());
        breaker.record(Outcome::Failure);
        assert!(breaker.try_acquire());
        breaker.record(Outcome::Failure);

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_permit_budget() {
        let breaker = CircuitBreaker::new("svc", &config(4, 0, 2));
        drive(&breaker, Outcome::Failure, 4);

        assert!(breaker.try_acquire());
        assert!(breaker.try_acquire());
        assert!(
            !breaker.try_acquire(),
            "only half_open_calls trials may be in flight"
        );

        // An ignored outcome releases its slot.
        breaker.record(Outcome::Ignore);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_ignored_outcomes_leave_window_untouched() {
        let breaker = CircuitBreaker::new("svc", &config(2, 60, 1));
        drive(&breaker, Outcome::Ignore, 10);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_window_slides() {
        let breaker = CircuitBreaker::new("svc", &config(4, 60, 2));

        drive(&breaker, Outcome::Failure, 1);
        // Four successes age the failure out of the window.
        drive(&breaker, Outcome::Success, 4);
        // One fresh failure is 25% of the window, under threshold.
        drive(&breaker, Outcome::Failure, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
