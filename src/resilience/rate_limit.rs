//! Outbound rate limiting.
//!
//! # Responsibilities
//! - Hand out a fixed number of permits per refresh period
//! - Make callers wait (bounded) when the period's permits are gone
//!
//! # Design Decisions
//! - Token bucket refilled whole-period-at-a-time, cycles anchored to the
//!   limiter's creation so bursts cannot exceed the per-period limit
//! - Acquire waits across period boundaries up to the configured timeout,
//!   then the call fails instead of hanging

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimiterConfig;
use crate::observability::metrics;

struct BucketInner {
    available: u32,
    cycle_start: Instant,
}

/// Per-destination token bucket with a bounded async acquire.
pub struct RateLimiter {
    service: String,
    limit_for_period: u32,
    period: Duration,
    acquire_timeout: Duration,
    inner: Mutex<BucketInner>,
}

impl RateLimiter {
    /// Create a full bucket for `service` from its effective settings.
    pub fn new(service: &str, config: &RateLimiterConfig) -> Self {
        Self {
            service: service.to_string(),
            limit_for_period: config.limit_for_period,
            period: config.period(),
            acquire_timeout: config.acquire_timeout(),
            inner: Mutex::new(BucketInner {
                available: config.limit_for_period,
                cycle_start: Instant::now(),
            }),
        }
    }

    /// Acquire one permit, waiting across refills up to the acquire
    /// timeout. `Err(())` means no permit became available in time.
    pub async fn acquire(&self) -> Result<(), ()> {
        let deadline = Instant::now() + self.acquire_timeout;

        loop {
            let next_refill = {
                let mut inner = self.inner.lock().expect("rate limiter mutex poisoned");
                let now = Instant::now();

                let elapsed = now.duration_since(inner.cycle_start);
                if elapsed >= self.period {
                    let cycles = (elapsed.as_nanos() / self.period.as_nanos()) as u32;
                    inner.cycle_start += self
                        .period
                        .checked_mul(cycles)
                        .unwrap_or(self.period);
                    inner.available = self.limit_for_period;
                }

                if inner.available > 0 {
                    inner.available -= 1;
                    return Ok(());
                }

                inner.cycle_start + self.period
            };

            if next_refill > deadline {
                tracing::warn!(
                    service = %self.service,
                    timeout = ?self.acquire_timeout,
                    "No rate-limit permit within acquire timeout"
                );
                metrics::record_rate_limited(&self.service);
                return Err(());
            }
            tokio::time::sleep_until(next_refill).await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("service", &self.service)
            .field("limit_for_period", &self.limit_for_period)
            .field("period", &self.period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit: u32, period_secs: u64, timeout_secs: u64) -> RateLimiterConfig {
        RateLimiterConfig {
            enabled: true,
            limit_for_period: limit,
            period_secs,
            acquire_timeout_secs: timeout_secs,
        }
    }

    #[tokio::test]
    async fn test_permits_within_limit() {
        let limiter = RateLimiter::new("svc", &config(3, 60, 1));
        for _ in 0..3 {
            assert!(limiter.acquire().await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_exhausted_bucket_times_out() {
        // Period far longer than the acquire timeout: the second call can
        // never get a permit and must fail rather than wait the period out.
        let limiter = RateLimiter::new("svc", &config(1, 60, 0));
        assert!(limiter.acquire().await.is_ok());

        let start = std::time::Instant::now();
        assert!(limiter.acquire().await.is_err());
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "rejection must be prompt, not wait for the refill"
        );
    }

    #[tokio::test]
    async fn test_refill_after_period() {
        tokio::time::pause();
        let limiter = RateLimiter::new("svc", &config(1, 1, 5));

        assert!(limiter.acquire().await.is_ok());
        // The second acquire sleeps until the next cycle; with paused time
        // the sleep auto-advances and the permit arrives.
        assert!(limiter.acquire().await.is_ok());
    }
}
