//! Retry logic.
//!
//! # Responsibilities
//! - Re-run failure-classified attempts up to the configured maximum
//! - Wait a fixed duration between attempts
//! - Re-enter the rate limiter on every attempt
//!
//! # Design Decisions
//! - Only transport errors, timeouts and 5xx responses are retried;
//!   4xx responses are final
//! - A rate-limited attempt aborts the call instead of burning the
//!   remaining attempts against a closed gate

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::rate_limit::RateLimiter;
use crate::resilience::{classify, CallError, Outcome};
use crate::transport::ServiceResponse;

/// Effective retry settings for one destination.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait_duration: Duration,
}

impl RetryPolicy {
    /// Build the policy from its effective settings.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            wait_duration: config.wait_duration(),
        }
    }

    /// Attempts allowed in total, including the first call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Run the attempt loop for one logical call: rate-limit gate, then the
/// call itself, repeated while the outcome classifies as a failure.
pub(crate) async fn run_attempts<F, Fut>(
    policy: Option<&RetryPolicy>,
    limiter: Option<&RateLimiter>,
    service: &str,
    call: F,
) -> Result<ServiceResponse, CallError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<ServiceResponse, CallError>>,
{
    let max_attempts = policy.map_or(1, RetryPolicy::max_attempts);
    let mut attempt = 0;

    loop {
        attempt += 1;

        if let Some(limiter) = limiter {
            if limiter.acquire().await.is_err() {
                return Err(CallError::RateLimited(service.to_string()));
            }
        }

        let result = call().await;

        if classify(&result) == Outcome::Failure && attempt < max_attempts {
            let wait = policy.map_or(Duration::ZERO, |p| p.wait_duration);
            match &result {
                Ok(response) => tracing::info!(
                    service,
                    attempt,
                    status = response.status.as_u16(),
                    delay = ?wait,
                    "Retrying after server error"
                ),
                Err(e) => tracing::info!(
                    service,
                    attempt,
                    error = %e,
                    delay = ?wait,
                    "Retrying after transport error"
                ),
            }
            metrics::record_retry(service);
            tokio::time::sleep(wait).await;
            continue;
        }

        return result;
    }
}
