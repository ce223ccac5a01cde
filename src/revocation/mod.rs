//! Token revocation checking.
//!
//! # Responsibilities
//! - Ask the shared cache whether a token id carries a revocation marker
//! - Write markers with a TTL equal to the token's remaining lifetime
//!   (logout flows)
//!
//! # Design Decisions
//! - Fail open: if the cache is unreachable the token is treated as not
//!   revoked. Availability is deliberately prioritized over strict
//!   revocation enforcement; a deployment that needs fail-closed semantics
//!   wraps the store with its own policy.
//! - Markers expire via the cache's own TTL mechanism; nothing here
//!   deletes them explicitly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::observability::metrics;

/// A failure talking to the backing cache.
#[derive(Debug, Error)]
#[error("revocation store error: {0}")]
pub struct StoreError(pub String);

/// The shared revocation cache collaborator. Implementations are expected
/// to be eventually consistent across processes.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Whether a marker exists under `key`.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    /// Set a marker under `key` that expires after `ttl`.
    async fn put_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Process-local store backed by a concurrent map of expiry instants.
/// Useful for single-process deployments and as the test double.
#[derive(Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, Instant>,
}

impl InMemoryRevocationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        if let Some(expires_at) = self.entries.get(key).map(|e| *e.value()) {
            if Instant::now() < expires_at {
                return Ok(true);
            }
            // Lazy eviction; the marker's lifetime is over.
            self.entries.remove(key);
        }
        Ok(false)
    }

    async fn put_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryRevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRevocationStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Checks token ids against the revocation cache under a key prefix.
pub struct RevocationChecker {
    store: Arc<dyn RevocationStore>,
    prefix: String,
}

impl RevocationChecker {
    /// Create a checker writing and reading keys as `{prefix}{token_id}`.
    pub fn new(store: Arc<dyn RevocationStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Whether `token_id` is revoked. A blank id short-circuits to `false`
    /// without a cache call; a store error logs and returns `false`.
    pub async fn is_revoked(&self, token_id: &str) -> bool {
        if token_id.trim().is_empty() {
            return false;
        }

        let key = format!("{}{}", self.prefix, token_id);
        match self.store.contains(&key).await {
            Ok(revoked) => {
                if revoked {
                    tracing::debug!(token_id, "Token carries a revocation marker");
                    metrics::record_revoked_hit();
                }
                revoked
            }
            Err(e) => {
                tracing::warn!(
                    token_id,
                    error = %e,
                    "Revocation cache unavailable, failing open"
                );
                false
            }
        }
    }

    /// Mark `token_id` revoked for `ttl` (the token's remaining lifetime).
    /// A blank id is a no-op.
    pub async fn revoke(&self, token_id: &str, ttl: Duration) -> Result<(), StoreError> {
        if token_id.trim().is_empty() {
            return Ok(());
        }

        let key = format!("{}{}", self.prefix, token_id);
        self.store.put_with_ttl(&key, ttl).await?;
        tracing::info!(token_id, ttl_secs = ttl.as_secs(), "Token revoked");
        Ok(())
    }
}

impl std::fmt::Debug for RevocationChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationChecker")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store that always errors, to exercise the fail-open path.
    struct UnreachableStore;

    #[async_trait]
    impl RevocationStore for UnreachableStore {
        async fn contains(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError("connection refused".to_string()))
        }

        async fn put_with_ttl(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError("connection refused".to_string()))
        }
    }

    fn checker(store: Arc<dyn RevocationStore>) -> RevocationChecker {
        RevocationChecker::new(store, "jwt:blacklist:")
    }

    #[tokio::test]
    async fn test_revoke_then_check() {
        let checker = checker(Arc::new(InMemoryRevocationStore::new()));
        assert!(!checker.is_revoked("token-1").await);

        checker.revoke("token-1", Duration::from_secs(60)).await.unwrap();
        assert!(checker.is_revoked("token-1").await);
        assert!(!checker.is_revoked("token-2").await);
    }

    #[tokio::test]
    async fn test_marker_expires_with_ttl() {
        let checker = checker(Arc::new(InMemoryRevocationStore::new()));
        checker.revoke("short", Duration::from_millis(20)).await.unwrap();
        assert!(checker.is_revoked("short").await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!checker.is_revoked("short").await);
    }

    #[tokio::test]
    async fn test_blank_id_short_circuits() {
        // Even against an erroring store a blank id never reaches it.
        let checker = checker(Arc::new(UnreachableStore));
        assert!(!checker.is_revoked("").await);
        assert!(!checker.is_revoked("   ").await);
        assert!(checker.revoke("", Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_error_fails_open() {
        let checker = checker(Arc::new(UnreachableStore));
        assert!(!checker.is_revoked("any-token").await);
    }
}
