//! The token verification state machine.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, Validation};

use crate::jwks::{KeyFetcher, VerificationKey};
use crate::observability::metrics;
use crate::revocation::RevocationChecker;
use crate::token::claims::Claims;
use crate::token::parser::{self, ParsedToken};
use crate::token::VerifyError;

/// Verifies bearer tokens against the key ring and revocation cache.
///
/// Steps run in a fixed order, each one a short-circuit point:
/// parse → token id → revocation → key lookup (refresh once on miss) →
/// signature → claims decode → expiry → soft issuer check.
pub struct TokenVerifier {
    fetcher: Arc<KeyFetcher>,
    revocation: RevocationChecker,
    expected_issuer: Option<String>,
}

impl TokenVerifier {
    /// Create a verifier. `expected_issuer` enables the soft issuer check.
    pub fn new(
        fetcher: Arc<KeyFetcher>,
        revocation: RevocationChecker,
        expected_issuer: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            revocation,
            expected_issuer,
        }
    }

    /// Verify a token, returning its claims or the first typed failure.
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        match self.verify_inner(token).await {
            Ok(claims) => Ok(claims),
            Err(e) => {
                metrics::record_token_rejected(e.label());
                Err(e)
            }
        }
    }

    async fn verify_inner(&self, token: &str) -> Result<Claims, VerifyError> {
        let parsed = parser::parse_token(token)?;
        let token_id = parser::token_id(&parsed);

        // Revocation runs before any crypto so known-bad tokens fail fast
        // and cheaply. Cache errors fail open inside the checker.
        if self.revocation.is_revoked(&token_id).await {
            tracing::warn!(token_id = %token_id, "Rejecting revoked token");
            return Err(VerifyError::Revoked);
        }

        let kid = match parsed.header.kid.as_deref() {
            Some(kid) if !kid.trim().is_empty() => kid,
            _ => return Err(VerifyError::MissingKeyId),
        };
        let key = self.locate_key(kid).await?;

        verify_signature(&parsed, &key)?;

        let claims: Claims = serde_json::from_value(parsed.payload.clone())
            .map_err(|_| VerifyError::MalformedClaims)?;

        if let Some(exp) = claims.exp {
            if exp <= unix_now() {
                return Err(VerifyError::Expired);
            }
        }

        // Soft check only: a foreign issuer is suspicious enough to log,
        // not enough to reject.
        if let (Some(expected), Some(actual)) =
            (self.expected_issuer.as_deref(), claims.iss.as_deref())
        {
            if expected != actual {
                tracing::warn!(expected, actual, "Token from unexpected issuer");
            }
        }

        Ok(claims)
    }

    /// Look the key up; on a miss, trigger exactly one refresh and retry
    /// once. A failed refresh is logged and surfaces as `KeyNotFound`.
    async fn locate_key(&self, kid: &str) -> Result<Arc<VerificationKey>, VerifyError> {
        let ring = self.fetcher.ring();
        if let Some(key) = ring.lookup(kid) {
            return Ok(key);
        }

        tracing::warn!(kid, "Verification key not cached, refreshing key ring");
        if let Err(e) = self.fetcher.refresh().await {
            tracing::warn!(kid, error = %e, "Key refresh on miss failed");
        }

        ring.lookup(kid)
            .ok_or_else(|| VerifyError::KeyNotFound(kid.to_string()))
    }

    /// The identifier a revocation marker for this token would use. Parses
    /// best-effort; an unparseable token still yields its fallback hash so
    /// logout flows can always produce a key.
    pub fn token_id(&self, token: &str) -> String {
        match parser::parse_token(token) {
            Ok(parsed) => parser::token_id(&parsed),
            Err(_) => parser::fallback_token_id(token),
        }
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("expected_issuer", &self.expected_issuer)
            .finish()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Verify the signature using the located key and the algorithm the token
/// declares. Anything other than a clean RSA verification, including an
/// unsupported algorithm, is `InvalidSignature`.
fn verify_signature(parsed: &ParsedToken, key: &VerificationKey) -> Result<(), VerifyError> {
    let algorithm = match parsed.header.alg.as_str() {
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        other => {
            tracing::debug!(alg = other, "Declared algorithm not verifiable here");
            return Err(VerifyError::InvalidSignature);
        }
    };

    let mut validation = Validation::new(algorithm);
    // Expiry is its own later step with its own error; no registered
    // claim is enforced at the signature stage.
    validation.validate_exp = false;
    validation.validate_aud = false;
    let no_required: [&str; 0] = [];
    validation.set_required_spec_claims(&no_required);

    jsonwebtoken::decode::<serde_json::Value>(&parsed.raw, &key.decoding_key, &validation)
        .map(|_| ())
        .map_err(|e| {
            tracing::debug!(error = %e, "Signature verification failed");
            VerifyError::InvalidSignature
        })
}
