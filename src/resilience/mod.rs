//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call to a destination:
//!     → circuit_breaker.rs (fail fast while the destination is down)
//!     → retry.rs (re-attempt failure-classified outcomes, fixed wait)
//!     → rate_limit.rs (bounded wait for a permit, per attempt)
//!     → actual network call
//! ```
//!
//! # Design Decisions
//! - Fixed nesting order: breaker outermost, limiter innermost. Retries
//!   re-enter the limiter on every attempt; the breaker sees only the
//!   final outcome of the retried call.
//! - Connect errors, timeouts, oversized bodies and 5xx responses are
//!   failures; 4xx responses are not. Rejections produced by the controls
//!   themselves (open circuit, exhausted permits) never feed the window.
//! - Each control is independently disableable; disabled means no state
//!   and no overhead.
//! - One pipeline per destination name, created on first use and reused
//!   for the process lifetime.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

use thiserror::Error;

use crate::config::ServicePolicy;
use crate::transport::ServiceResponse;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;

/// Errors produced by a resilient call, distinguishable from downstream
/// status results so callers can apply their own backoff policy.
#[derive(Debug, Error)]
pub enum CallError {
    /// The destination's circuit is open; the call never reached the network.
    #[error("circuit open for destination {0}")]
    CircuitOpen(String),

    /// No rate-limit permit became available within the acquire timeout.
    #[error("rate limit exceeded for destination {0}")]
    RateLimited(String),

    /// The call exceeded a configured timeout.
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Connection or protocol failure below the HTTP status level.
    #[error("transport error calling {service}: {detail}")]
    Transport { service: String, detail: String },

    /// The response body exceeded the configured buffer cap.
    #[error("response from {service} exceeded {limit} bytes")]
    ResponseTooLarge { service: String, limit: usize },

    /// The destination base URL or path could not be parsed.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Classification of a finished call for breaker and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Counts toward the success side of the sliding window.
    Success,
    /// Counts toward the failure side; eligible for retry.
    Failure,
    /// Not recorded at all (the rejection came from a control, not the call).
    Ignore,
}

/// Classify a call result. 5xx, timeouts, transport errors and over-limit
/// bodies are failures; every reachable response (including 4xx) is a
/// success; control rejections are ignored.
pub fn classify(result: &Result<ServiceResponse, CallError>) -> Outcome {
    match result {
        Ok(response) if response.status.is_server_error() => Outcome::Failure,
        Ok(_) => Outcome::Success,
        Err(CallError::CircuitOpen(_)) | Err(CallError::RateLimited(_)) => Outcome::Ignore,
        Err(_) => Outcome::Failure,
    }
}

/// The composed per-destination resilience pipeline.
pub struct ServicePipeline {
    service: String,
    breaker: Option<CircuitBreaker>,
    retry: Option<RetryPolicy>,
    limiter: Option<RateLimiter>,
}

impl ServicePipeline {
    /// Build the pipeline for one destination from its resolved policy.
    /// Disabled controls are simply absent.
    pub fn new(service: &str, policy: &ServicePolicy) -> Self {
        let breaker = policy
            .circuit_breaker
            .enabled
            .then(|| CircuitBreaker::new(service, &policy.circuit_breaker));
        let retry = policy.retry.enabled.then(|| RetryPolicy::new(&policy.retry));
        let limiter = policy
            .rate_limiter
            .enabled
            .then(|| RateLimiter::new(service, &policy.rate_limiter));

        Self {
            service: service.to_string(),
            breaker,
            retry,
            limiter,
        }
    }

    /// Destination name this pipeline guards.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The circuit breaker, when enabled.
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// Run one logical call through breaker → retry → limiter.
    ///
    /// `call` is invoked once per attempt; the breaker records only the
    /// final outcome after retries are exhausted or abandoned.
    pub async fn execute<F, Fut>(&self, call: F) -> Result<ServiceResponse, CallError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<ServiceResponse, CallError>>,
    {
        if let Some(breaker) = &self.breaker {
            if !breaker.try_acquire() {
                crate::observability::metrics::record_circuit_rejection(&self.service);
                return Err(CallError::CircuitOpen(self.service.clone()));
            }
        }

        let result = retry::run_attempts(
            self.retry.as_ref(),
            self.limiter.as_ref(),
            &self.service,
            call,
        )
        .await;

        if let Some(breaker) = &self.breaker {
            breaker.record(classify(&result));
        }

        result
    }
}

impl std::fmt::Debug for ServicePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePipeline")
            .field("service", &self.service)
            .field("breaker", &self.breaker.is_some())
            .field("retry", &self.retry.is_some())
            .field("limiter", &self.limiter.is_some())
            .finish()
    }
}
