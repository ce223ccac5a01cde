//! Resilient outbound transport.
//!
//! # Responsibilities
//! - Build one configured HTTP client per destination (connect/read/response
//!   timeouts)
//! - Route every call through the destination's resilience pipeline
//! - Cap buffered response bodies so a misbehaving downstream cannot grow
//!   memory without bound
//!
//! # Design Decisions
//! - Destination entries (client + pipeline) are created on first call and
//!   reused for the process lifetime; the destination set is assumed small
//!   and stable, so nothing is evicted
//! - The registry is an explicit object owned by the transport, injected
//!   into collaborators rather than reached as a process-wide global

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::StatusCode;
use url::Url;

use crate::config::CallGuardConfig;
use crate::resilience::{CallError, ServicePipeline};

/// A fully buffered response from a resilient call. Carries whatever status
/// the destination returned after resilience handling, including 4xx/5xx.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    /// HTTP status of the final attempt.
    pub status: StatusCode,
    /// Buffered response body, bounded by `max_response_bytes`.
    pub body: Vec<u8>,
}

impl ServiceResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug)]
struct Destination {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
    pipeline: ServicePipeline,
}

/// Outbound HTTP transport with per-destination resilience.
pub struct ResilientTransport {
    config: Arc<CallGuardConfig>,
    destinations: DashMap<String, Arc<Destination>>,
}

impl ResilientTransport {
    /// Create a transport. Destinations are materialized lazily.
    pub fn new(config: Arc<CallGuardConfig>) -> Self {
        Self {
            config,
            destinations: DashMap::new(),
        }
    }

    /// The configuration this transport was built from.
    pub fn config(&self) -> &CallGuardConfig {
        &self.config
    }

    /// The circuit state for a destination, if it has been used and has a
    /// breaker enabled.
    pub fn circuit_state(&self, service: &str) -> Option<crate::resilience::CircuitState> {
        self.destinations
            .get(service)
            .and_then(|d| d.pipeline.breaker().map(|b| b.state()))
    }

    fn destination(&self, service: &str, base_url: &str) -> Result<Arc<Destination>, CallError> {
        if let Some(existing) = self.destinations.get(service) {
            return Ok(existing.clone());
        }

        let policy = self.config.policy_for(service);
        let parsed = Url::parse(base_url)
            .map_err(|e| CallError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let timeouts = &self.config.timeouts;
        // The client crate has no separate write deadline; transmission is
        // bounded by the total response timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .read_timeout(Duration::from_secs(timeouts.read_secs))
            .timeout(Duration::from_secs(timeouts.response_secs))
            .build()
            .map_err(|e| CallError::Transport {
                service: service.to_string(),
                detail: e.to_string(),
            })?;

        tracing::info!(
            service,
            base_url = %parsed,
            timeout = ?policy.timeout,
            circuit_breaker = policy.circuit_breaker.enabled,
            retry = policy.retry.enabled,
            rate_limiter = policy.rate_limiter.enabled,
            "Destination initialized"
        );

        let destination = Arc::new(Destination {
            base_url: parsed,
            client,
            timeout: policy.timeout,
            pipeline: ServicePipeline::new(service, &policy),
        });

        Ok(self
            .destinations
            .entry(service.to_string())
            .or_insert(destination)
            .clone())
    }

    /// Issue a GET to `{base_url}{path}` through the destination's
    /// resilience pipeline.
    pub async fn get(
        &self,
        service: &str,
        base_url: &str,
        path: &str,
    ) -> Result<ServiceResponse, CallError> {
        let destination = self.destination(service, base_url)?;
        let url = destination
            .base_url
            .join(path)
            .map_err(|e| CallError::InvalidUrl(format!("{}: {}", path, e)))?;

        let service_name = service.to_string();
        let max_bytes = self.config.max_response_bytes;
        let client = destination.client.clone();
        let timeout = destination.timeout;

        destination
            .pipeline
            .execute(move || {
                let client = client.clone();
                let url = url.clone();
                let service = service_name.clone();
                async move { dispatch(client, url, service, timeout, max_bytes).await }
            })
            .await
    }
}

impl std::fmt::Debug for ResilientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientTransport")
            .field("destinations", &self.destinations.len())
            .finish()
    }
}

/// One network attempt: send, then buffer the body under the cap.
async fn dispatch(
    client: reqwest::Client,
    url: Url,
    service: String,
    timeout: Duration,
    max_bytes: usize,
) -> Result<ServiceResponse, CallError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_send_error(&service, e))?;

    let status = response.status();
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| map_send_error(&service, e))?;
        if body.len() + chunk.len() > max_bytes {
            tracing::warn!(service = %service, limit = max_bytes, "Response body over limit, dropping");
            return Err(CallError::ResponseTooLarge {
                service,
                limit: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(ServiceResponse { status, body })
}

fn map_send_error(service: &str, error: reqwest::Error) -> CallError {
    if error.is_timeout() {
        CallError::Timeout(service.to_string())
    } else {
        CallError::Transport {
            service: service.to_string(),
            detail: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_helper() {
        let response = ServiceResponse {
            status: StatusCode::OK,
            body: br#"{"keys":[]}"#.to_vec(),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert!(value.get("keys").is_some());
        assert!(response.is_success());
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let transport = ResilientTransport::new(Arc::new(CallGuardConfig::default()));
        let err = transport.destination("svc", "not a url").unwrap_err();
        assert!(matches!(err, CallError::InvalidUrl(_)));
    }

    #[test]
    fn test_destination_is_reused() {
        let transport = ResilientTransport::new(Arc::new(CallGuardConfig::default()));
        let a = transport.destination("svc", "http://localhost:1").unwrap();
        let b = transport.destination("svc", "http://localhost:1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
