//! End-to-end token verification against a mock identity authority.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use callguard::config::CallGuardConfig;
use callguard::revocation::{
    InMemoryRevocationStore, RevocationChecker, RevocationStore, StoreError,
};
use callguard::token::parser::{extract_roles, extract_tenant_id, extract_user_id};
use callguard::token::VerifyError;
use callguard::{KeyFetcher, ResilientTransport, Shutdown, TokenVerifier};

fn build_verifier(
    config: CallGuardConfig,
    store: Arc<dyn RevocationStore>,
) -> (Arc<KeyFetcher>, TokenVerifier) {
    let config = Arc::new(config);
    let transport = Arc::new(ResilientTransport::new(config.clone()));
    let fetcher = Arc::new(KeyFetcher::new(transport, config.jwks.clone()));
    let checker = RevocationChecker::new(store, config.jwks.blacklist_prefix.clone());
    let verifier = TokenVerifier::new(
        fetcher.clone(),
        checker,
        config.jwks.expected_issuer.clone(),
    );
    (fetcher, verifier)
}

fn standard_claims(jti: &str, exp: i64) -> Value {
    json!({
        "sub": "subject-1",
        "jti": jti,
        "exp": exp,
        "iss": "ecom-identity",
        "userId": "user-42",
        "tenantId": "tenant-7",
        "roles": ["admin", "viewer"],
    })
}

/// Break a signed token's signature while keeping it structurally valid.
fn corrupt_signature(token: &str) -> String {
    let mut parts: Vec<&str> = token.split('.').collect();
    parts[2] = "QUFBQUFBQUFBQUFBQUFBQQ";
    parts.join(".")
}

#[tokio::test]
async fn test_enveloped_key_set_round_trip_filters_non_rsa() {
    // Two RSA keys wrapped in the authority's success envelope, plus an EC
    // and an HMAC entry that must be ignored, not errored.
    let document = json!({
        "keys": [
            common::rsa_jwk("kid-a"),
            common::rsa_jwk("kid-b"),
            { "kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "AQ", "y": "AQ" },
            { "kty": "oct", "kid": "hmac-1", "k": "c2VjcmV0" },
        ]
    });
    let addr = common::start_fixed_backend(common::enveloped(document).to_string()).await;

    let (fetcher, _) = build_verifier(
        common::quiet_config(addr),
        Arc::new(InMemoryRevocationStore::new()),
    );

    let count = fetcher.refresh().await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(fetcher.ring().len(), 2);
    assert!(fetcher.ring().lookup("kid-a").is_some());
    assert!(fetcher.ring().lookup("kid-b").is_some());
    assert!(fetcher.ring().lookup("ec-1").is_none());
}

#[tokio::test]
async fn test_valid_token_verifies_with_claims_intact() {
    // Raw (non-enveloped) key-set form.
    let addr =
        common::start_fixed_backend(common::jwks_document(&["kid-a"]).to_string()).await;

    let mut config = common::quiet_config(addr);
    config.jwks.expected_issuer = Some("ecom-identity".to_string());
    let (fetcher, verifier) =
        build_verifier(config, Arc::new(InMemoryRevocationStore::new()));
    fetcher.refresh().await.unwrap();

    let token = common::sign_token(
        "kid-a",
        &standard_claims("tok-1", common::unix_now() + 3600),
    );
    let claims = verifier.verify(&token).await.unwrap();

    assert_eq!(claims.jti.as_deref(), Some("tok-1"));
    assert_eq!(extract_user_id(&claims).unwrap(), "user-42");
    assert_eq!(extract_tenant_id(&claims).unwrap(), "tenant-7");
    assert_eq!(extract_roles(&claims), vec!["admin", "viewer"]);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let addr =
        common::start_fixed_backend(common::jwks_document(&["kid-a"]).to_string()).await;
    let (fetcher, verifier) = build_verifier(
        common::quiet_config(addr),
        Arc::new(InMemoryRevocationStore::new()),
    );
    fetcher.refresh().await.unwrap();

    let token = common::sign_token(
        "kid-a",
        &standard_claims("tok-exp", common::unix_now() - 1),
    );
    assert_eq!(
        verifier.verify(&token).await.unwrap_err(),
        VerifyError::Expired
    );
}

#[tokio::test]
async fn test_revocation_wins_over_malformed_signature() {
    // The authority is unreachable and must not matter: a revoked token is
    // rejected before key lookup or signature verification.
    let addr = common::unreachable_addr().await;
    let store = Arc::new(InMemoryRevocationStore::new());
    let checker = RevocationChecker::new(store.clone(), "jwt:blacklist:");
    checker
        .revoke("revoked-1", Duration::from_secs(300))
        .await
        .unwrap();

    let (_, verifier) = build_verifier(common::quiet_config(addr), store);

    let good = common::sign_token(
        "kid-a",
        &standard_claims("revoked-1", common::unix_now() + 3600),
    );
    let broken = corrupt_signature(&good);

    assert_eq!(
        verifier.verify(&broken).await.unwrap_err(),
        VerifyError::Revoked
    );
}

#[tokio::test]
async fn test_bad_signature_with_known_key_is_rejected() {
    let addr =
        common::start_fixed_backend(common::jwks_document(&["kid-a"]).to_string()).await;
    let (fetcher, verifier) = build_verifier(
        common::quiet_config(addr),
        Arc::new(InMemoryRevocationStore::new()),
    );
    fetcher.refresh().await.unwrap();

    let token = corrupt_signature(&common::sign_token(
        "kid-a",
        &standard_claims("tok-2", common::unix_now() + 3600),
    ));
    assert_eq!(
        verifier.verify(&token).await.unwrap_err(),
        VerifyError::InvalidSignature
    );
}

#[tokio::test]
async fn test_unknown_kid_refreshes_exactly_once_then_fails() {
    let fetches = Arc::new(AtomicU32::new(0));
    let counter = fetches.clone();
    let addr = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (200, common::jwks_document(&["kid-a"]).to_string())
        }
    })
    .await;

    let (fetcher, verifier) = build_verifier(
        common::quiet_config(addr),
        Arc::new(InMemoryRevocationStore::new()),
    );
    fetcher.refresh().await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    let token = common::sign_token(
        "kid-unknown",
        &standard_claims("tok-3", common::unix_now() + 3600),
    );
    assert_eq!(
        verifier.verify(&token).await.unwrap_err(),
        VerifyError::KeyNotFound("kid-unknown".to_string())
    );
    assert_eq!(
        fetches.load(Ordering::SeqCst),
        2,
        "a ring miss triggers one refresh, and only one"
    );
}

#[tokio::test]
async fn test_rotated_key_is_picked_up_on_miss() {
    // First fetch serves kid-a; later fetches serve only kid-b, as if the
    // authority rotated its keys between our refreshes.
    let fetches = Arc::new(AtomicU32::new(0));
    let counter = fetches.clone();
    let addr = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                (200, common::jwks_document(&["kid-a"]).to_string())
            } else {
                (200, common::jwks_document(&["kid-b"]).to_string())
            }
        }
    })
    .await;

    let (fetcher, verifier) = build_verifier(
        common::quiet_config(addr),
        Arc::new(InMemoryRevocationStore::new()),
    );
    fetcher.refresh().await.unwrap();
    assert!(fetcher.ring().lookup("kid-a").is_some());

    let token = common::sign_token(
        "kid-b",
        &standard_claims("tok-4", common::unix_now() + 3600),
    );
    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.jti.as_deref(), Some("tok-4"));

    // Replacement, not a merge: the old generation is gone.
    assert!(fetcher.ring().lookup("kid-a").is_none());
}

/// Store that always errors, simulating a revocation cache outage.
struct UnreachableStore;

#[async_trait::async_trait]
impl RevocationStore for UnreachableStore {
    async fn contains(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError("connection refused".to_string()))
    }

    async fn put_with_ttl(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_revocation_outage_fails_open_and_verification_proceeds() {
    let addr =
        common::start_fixed_backend(common::jwks_document(&["kid-a"]).to_string()).await;
    let (fetcher, verifier) =
        build_verifier(common::quiet_config(addr), Arc::new(UnreachableStore));
    fetcher.refresh().await.unwrap();

    let token = common::sign_token(
        "kid-a",
        &standard_claims("tok-5", common::unix_now() + 3600),
    );
    let claims = verifier.verify(&token).await.unwrap();
    assert_eq!(claims.jti.as_deref(), Some("tok-5"));
}

#[tokio::test]
async fn test_failed_initial_refresh_leaves_empty_ring_until_shutdown() {
    let addr = common::unreachable_addr().await;
    let (fetcher, verifier) = build_verifier(
        common::quiet_config(addr),
        Arc::new(InMemoryRevocationStore::new()),
    );

    let shutdown = Shutdown::new();
    let handle = fetcher.clone().start(shutdown.subscribe()).await;

    // Startup survived the failed refresh, but nothing verifies.
    assert!(fetcher.ring().is_empty());
    let token = common::sign_token(
        "kid-a",
        &standard_claims("tok-6", common::unix_now() + 3600),
    );
    assert!(matches!(
        verifier.verify(&token).await.unwrap_err(),
        VerifyError::KeyNotFound(_)
    ));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("refresh task must stop on shutdown")
        .unwrap();
}
