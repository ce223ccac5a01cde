//! Metrics collection.
//!
//! # Responsibilities
//! - Count resilience events (circuit transitions, rejections, retries)
//! - Count key refresh outcomes and token rejections
//!
//! # Design Decisions
//! - Counters only, via the `metrics` facade; installing a recorder and
//!   exposing an endpoint is the host process's concern
//! - Cheap enough to call from hot paths

use metrics::counter;

/// A circuit breaker changed state.
pub fn record_circuit_transition(service: &str, state: &'static str) {
    counter!(
        "callguard_circuit_transitions_total",
        "service" => service.to_string(),
        "state" => state
    )
    .increment(1);
}

/// A call was rejected because the circuit was open.
pub fn record_circuit_rejection(service: &str) {
    counter!(
        "callguard_circuit_rejections_total",
        "service" => service.to_string()
    )
    .increment(1);
}

/// A call gave up waiting for a rate-limit permit.
pub fn record_rate_limited(service: &str) {
    counter!(
        "callguard_rate_limited_total",
        "service" => service.to_string()
    )
    .increment(1);
}

/// An attempt is being retried.
pub fn record_retry(service: &str) {
    counter!(
        "callguard_retries_total",
        "service" => service.to_string()
    )
    .increment(1);
}

/// A key-ring refresh finished.
pub fn record_key_refresh(outcome: &'static str, keys: usize) {
    counter!(
        "callguard_key_refreshes_total",
        "outcome" => outcome
    )
    .increment(1);
    if outcome == "ok" {
        counter!("callguard_keys_fetched_total").increment(keys as u64);
    }
}

/// A token was rejected, labeled by the failure kind.
pub fn record_token_rejected(reason: &'static str) {
    counter!(
        "callguard_tokens_rejected_total",
        "reason" => reason
    )
    .increment(1);
}

/// A revocation marker matched a presented token.
pub fn record_revoked_hit() {
    counter!("callguard_revocations_hit_total").increment(1);
}
