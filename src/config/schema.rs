//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for callguard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for outbound call protection and token verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CallGuardConfig {
    /// Timeout configuration for outbound HTTP clients.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker defaults (per-destination overrides in `services`).
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry defaults.
    pub retry: RetryConfig,

    /// Rate limiter defaults.
    pub rate_limiter: RateLimiterConfig,

    /// JWKS fetching and token verification settings.
    pub jwks: JwksConfig,

    /// Maximum buffered response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Per-destination overrides (key = destination service name).
    pub services: HashMap<String, ServiceOverrides>,
}

fn default_max_response_bytes() -> usize {
    1024 * 1024
}

impl Default for CallGuardConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            jwks: JwksConfig::default(),
            max_response_bytes: default_max_response_bytes(),
            services: HashMap::new(),
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Read timeout (time between response bytes) in seconds.
    pub read_secs: u64,

    /// Write timeout (time to send the request) in seconds.
    pub write_secs: u64,

    /// Response timeout (total time for request/response) in seconds.
    pub response_secs: u64,

    /// Default per-call timeout when no per-service value is set, in seconds.
    pub default_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 2,
            read_secs: 5,
            write_secs: 5,
            response_secs: 10,
            default_secs: 5,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable the circuit breaker.
    pub enabled: bool,

    /// Failure rate percentage (0-100) at which the circuit opens.
    pub failure_rate_threshold: f32,

    /// Seconds to stay open before permitting trial calls.
    pub wait_duration_open_secs: u64,

    /// Number of most recent calls evaluated for the failure rate.
    pub window_size: u32,

    /// Minimum recorded calls before the failure rate is evaluated.
    /// Zero means "same as window_size".
    pub min_calls: u32,

    /// Number of trial calls permitted in the half-open state.
    pub half_open_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_rate_threshold: 50.0,
            wait_duration_open_secs: 60,
            window_size: 100,
            min_calls: 0,
            half_open_calls: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Minimum calls before evaluation, resolving the "0 = window size" default.
    pub fn effective_min_calls(&self) -> u32 {
        if self.min_calls == 0 {
            self.window_size
        } else {
            self.min_calls
        }
    }

    /// Open-state wait as a [`Duration`].
    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.wait_duration_open_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts (including the first call).
    pub max_attempts: u32,

    /// Fixed wait between attempts in milliseconds.
    pub wait_duration_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            wait_duration_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Wait between attempts as a [`Duration`].
    pub fn wait_duration(&self) -> Duration {
        Duration::from_millis(self.wait_duration_ms)
    }
}

/// Rate limiter configuration (token bucket refreshed each period).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Enable the rate limiter.
    pub enabled: bool,

    /// Permits available per refresh period.
    pub limit_for_period: u32,

    /// Refresh period in seconds.
    pub period_secs: u64,

    /// Maximum seconds a call waits for a permit before failing.
    pub acquire_timeout_secs: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit_for_period: 100,
            period_secs: 60,
            acquire_timeout_secs: 5,
        }
    }
}

impl RateLimiterConfig {
    /// Refresh period as a [`Duration`].
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Acquire timeout as a [`Duration`].
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// JWKS and token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksConfig {
    /// Base URL of the identity authority publishing the key set.
    pub authority_url: String,

    /// Path of the key-set document on the authority.
    pub jwks_path: String,

    /// Background refresh interval in seconds.
    pub refresh_interval_secs: u64,

    /// Expected `iss` claim. Mismatches are logged, not rejected.
    pub expected_issuer: Option<String>,

    /// Revocation cache key prefix.
    pub blacklist_prefix: String,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            authority_url: "http://localhost:8081".to_string(),
            jwks_path: "/.well-known/jwks.json".to_string(),
            refresh_interval_secs: 300,
            expected_issuer: None,
            blacklist_prefix: "jwt:blacklist:".to_string(),
        }
    }
}

impl JwksConfig {
    /// Refresh interval as a [`Duration`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Partial per-destination overrides. Unset fields fall back to the defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceOverrides {
    /// Per-call timeout in seconds for this destination.
    pub timeout_secs: Option<u64>,

    /// Circuit breaker override.
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Retry override.
    pub retry: Option<RetryConfig>,

    /// Rate limiter override.
    pub rate_limiter: Option<RateLimiterConfig>,
}

/// Fully resolved policy for one destination after override merging.
#[derive(Debug, Clone)]
pub struct ServicePolicy {
    /// Per-call timeout for this destination.
    pub timeout: Duration,

    /// Effective circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Effective retry settings.
    pub retry: RetryConfig,

    /// Effective rate limiter settings.
    pub rate_limiter: RateLimiterConfig,
}

impl CallGuardConfig {
    /// Resolve the effective policy for a destination, applying any
    /// per-service overrides on top of the defaults.
    pub fn policy_for(&self, service: &str) -> ServicePolicy {
        let overrides = self.services.get(service);

        let timeout_secs = overrides
            .and_then(|o| o.timeout_secs)
            .unwrap_or(self.timeouts.default_secs);

        ServicePolicy {
            timeout: Duration::from_secs(timeout_secs),
            circuit_breaker: overrides
                .and_then(|o| o.circuit_breaker.clone())
                .unwrap_or_else(|| self.circuit_breaker.clone()),
            retry: overrides
                .and_then(|o| o.retry.clone())
                .unwrap_or_else(|| self.retry.clone()),
            rate_limiter: overrides
                .and_then(|o| o.rate_limiter.clone())
                .unwrap_or_else(|| self.rate_limiter.clone()),
        }
    }
}
