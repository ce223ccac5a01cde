//! Key-set retrieval from the identity authority.
//!
//! # Responsibilities
//! - Fetch the published key set over the resilient transport
//! - Unwrap the authority's optional success envelope
//! - Replace the key ring atomically, keeping the stale ring on failure
//! - Refresh periodically in the background until shutdown

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::JwksConfig;
use crate::jwks::key_ring::{KeyRing, VerificationKey};
use crate::observability::metrics;
use crate::resilience::CallError;
use crate::transport::ResilientTransport;

/// Destination name the key-set calls are issued under; per-service
/// overrides in the config apply under this key.
pub const IDENTITY_SERVICE: &str = "identity-service";

/// Errors during a key-set refresh. Swallowed (logged) by the periodic
/// task; the previous ring keeps serving.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The resilient call itself failed.
    #[error(transparent)]
    Call(#[from] CallError),

    /// The authority answered with a non-success status.
    #[error("key-set endpoint returned status {0}")]
    Status(u16),

    /// The authority answered with an empty body.
    #[error("empty key-set response")]
    EmptyBody,

    /// The body was not a decodable key-set document.
    #[error("failed to decode key-set document: {0}")]
    Decode(String),
}

/// Keeps the [`KeyRing`] fresh against the identity authority.
pub struct KeyFetcher {
    ring: Arc<KeyRing>,
    transport: Arc<ResilientTransport>,
    config: JwksConfig,
}

impl KeyFetcher {
    /// Create a fetcher with an empty ring.
    pub fn new(transport: Arc<ResilientTransport>, config: JwksConfig) -> Self {
        Self {
            ring: Arc::new(KeyRing::new()),
            transport,
            config,
        }
    }

    /// The ring this fetcher maintains.
    pub fn ring(&self) -> &Arc<KeyRing> {
        &self.ring
    }

    /// Fetch the key set once and atomically replace the ring. On any
    /// failure the existing ring is left untouched. Returns the number of
    /// keys now in the ring.
    pub async fn refresh(&self) -> Result<usize, FetchError> {
        match self.refresh_inner().await {
            Ok(count) => {
                metrics::record_key_refresh("ok", count);
                tracing::info!(keys = count, "Key ring refreshed");
                Ok(count)
            }
            Err(e) => {
                metrics::record_key_refresh("error", 0);
                Err(e)
            }
        }
    }

    async fn refresh_inner(&self) -> Result<usize, FetchError> {
        tracing::debug!(
            authority = %self.config.authority_url,
            path = %self.config.jwks_path,
            "Refreshing verification keys"
        );

        let response = self
            .transport
            .get(IDENTITY_SERVICE, &self.config.authority_url, &self.config.jwks_path)
            .await?;

        if !response.is_success() {
            return Err(FetchError::Status(response.status.as_u16()));
        }
        if response.body.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let document: Value = serde_json::from_slice(&response.body)
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        let keys = parse_keys(unwrap_envelope(&document))?;
        let count = keys.len();

        self.ring.replace(keys);
        Ok(count)
    }

    /// Run one awaited initial refresh, then keep refreshing in the
    /// background until the shutdown signal fires.
    ///
    /// If the initial refresh fails the ring stays empty and every
    /// verification fails key lookup until a later refresh succeeds.
    pub async fn start(
        self: Arc<Self>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        if let Err(e) = self.refresh().await {
            tracing::warn!(
                error = %e,
                "Initial key refresh failed, serving an empty ring until a retry succeeds"
            );
        }

        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.refresh_interval_secs,
            "Key refresher starting"
        );

        let mut ticker = tokio::time::interval(self.config.refresh_interval());
        // The first tick fires immediately; the initial refresh already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(error = %e, "Periodic key refresh failed, keeping previous ring");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Key refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for KeyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFetcher")
            .field("authority_url", &self.config.authority_url)
            .field("keys", &self.ring.len())
            .finish()
    }
}

/// The authority may wrap the key set in its generic success envelope
/// (`{"success": true, "data": {"keys": [...]}}`) or publish it raw. Detect
/// the envelope by shape and unwrap it; otherwise use the document as-is.
fn unwrap_envelope(document: &Value) -> &Value {
    match document.get("data") {
        Some(data) if data.get("keys").map_or(false, Value::is_array) => data,
        _ => document,
    }
}

/// Decode the key-set document into verification keys. Only RSA signature
/// keys are usable here; other key types are skipped, not errored.
fn parse_keys(key_set: &Value) -> Result<Vec<VerificationKey>, FetchError> {
    let entries = key_set
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode("document has no keys array".to_string()))?;

    let mut keys = Vec::new();
    for entry in entries {
        let kty = entry.get("kty").and_then(Value::as_str).unwrap_or("");
        if !kty.eq_ignore_ascii_case("RSA") {
            tracing::debug!(kty, "Skipping non-RSA key set entry");
            continue;
        }

        let kid = match entry.get("kid").and_then(Value::as_str) {
            Some(kid) if !kid.is_empty() => kid,
            _ => {
                tracing::warn!("Skipping RSA key without a kid");
                continue;
            }
        };
        let (n, e) = match (
            entry.get("n").and_then(Value::as_str),
            entry.get("e").and_then(Value::as_str),
        ) {
            (Some(n), Some(e)) => (n, e),
            _ => {
                tracing::warn!(kid, "Skipping RSA key without modulus/exponent");
                continue;
            }
        };

        match jsonwebtoken::DecodingKey::from_rsa_components(n, e) {
            Ok(decoding_key) => {
                tracing::debug!(kid, "Cached verification key");
                keys.push(VerificationKey {
                    key_id: kid.to_string(),
                    algorithm: algorithm_from_name(entry.get("alg").and_then(Value::as_str)),
                    decoding_key,
                });
            }
            Err(e) => {
                tracing::warn!(kid, error = %e, "Skipping undecodable RSA key");
            }
        }
    }

    Ok(keys)
}

fn algorithm_from_name(name: Option<&str>) -> jsonwebtoken::Algorithm {
    match name {
        Some("RS384") => jsonwebtoken::Algorithm::RS384,
        Some("RS512") => jsonwebtoken::Algorithm::RS512,
        _ => jsonwebtoken::Algorithm::RS256,
    }
}
