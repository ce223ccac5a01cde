//! Semantic configuration checks, separate from serde's syntactic ones.

use std::fmt;

use url::Url;

use crate::config::schema::{
    CallGuardConfig, CircuitBreakerConfig, RateLimiterConfig, RetryConfig,
};

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `services.billing.retry.max_attempts`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

/// Validate a loaded configuration. Returns all problems found, not just the first.
pub fn validate_config(config: &CallGuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_circuit_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);
    check_retry("retry", &config.retry, &mut errors);
    check_rate_limiter("rate_limiter", &config.rate_limiter, &mut errors);

    if Url::parse(&config.jwks.authority_url).is_err() {
        errors.push(err(
            "jwks.authority_url",
            format!("not a valid URL: {}", config.jwks.authority_url),
        ));
    }
    if config.jwks.refresh_interval_secs == 0 {
        errors.push(err("jwks.refresh_interval_secs", "must be greater than zero"));
    }
    if config.max_response_bytes == 0 {
        errors.push(err("max_response_bytes", "must be greater than zero"));
    }

    for (name, overrides) in &config.services {
        if let Some(cb) = &overrides.circuit_breaker {
            check_circuit_breaker(&format!("services.{}.circuit_breaker", name), cb, &mut errors);
        }
        if let Some(retry) = &overrides.retry {
            check_retry(&format!("services.{}.retry", name), retry, &mut errors);
        }
        if let Some(rl) = &overrides.rate_limiter {
            check_rate_limiter(&format!("services.{}.rate_limiter", name), rl, &mut errors);
        }
        if overrides.timeout_secs == Some(0) {
            errors.push(err(
                format!("services.{}.timeout_secs", name),
                "must be greater than zero",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_circuit_breaker(path: &str, cb: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if !cb.enabled {
        return;
    }
    if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
        errors.push(err(
            format!("{}.failure_rate_threshold", path),
            "must be in (0, 100]",
        ));
    }
    if cb.window_size == 0 {
        errors.push(err(format!("{}.window_size", path), "must be greater than zero"));
    }
    if cb.half_open_calls == 0 {
        errors.push(err(
            format!("{}.half_open_calls", path),
            "must be greater than zero",
        ));
    }
}

fn check_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retry.enabled && retry.max_attempts == 0 {
        errors.push(err(format!("{}.max_attempts", path), "must be at least 1"));
    }
}

fn check_rate_limiter(path: &str, rl: &RateLimiterConfig, errors: &mut Vec<ValidationError>) {
    if !rl.enabled {
        return;
    }
    if rl.limit_for_period == 0 {
        errors.push(err(
            format!("{}.limit_for_period", path),
            "must be greater than zero",
        ));
    }
    if rl.period_secs == 0 {
        errors.push(err(format!("{}.period_secs", path), "must be greater than zero"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CallGuardConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_threshold_and_url() {
        let mut config = CallGuardConfig::default();
        config.circuit_breaker.failure_rate_threshold = 0.0;
        config.jwks.authority_url = "not a url".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field == "circuit_breaker.failure_rate_threshold"));
        assert!(errors.iter().any(|e| e.field == "jwks.authority_url"));
    }

    #[test]
    fn test_disabled_control_is_not_checked() {
        let mut config = CallGuardConfig::default();
        config.rate_limiter.enabled = false;
        config.rate_limiter.limit_for_period = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_service_override_errors_carry_path() {
        let mut config = CallGuardConfig::default();
        config.services.insert(
            "billing".to_string(),
            crate::config::schema::ServiceOverrides {
                timeout_secs: Some(0),
                ..Default::default()
            },
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "services.billing.timeout_secs");
    }
}
