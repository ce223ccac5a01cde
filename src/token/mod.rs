//! Bearer token verification.
//!
//! # Data Flow
//! ```text
//! token string
//!     → parser.rs (structural parse, token-id extraction)
//!     → revocation check (before any crypto, fail fast on known-bad)
//!     → jwks::KeyRing lookup (one refresh-and-retry on a miss)
//!     → signature verification
//!     → claims.rs (typed claim set)
//!     → expiry check, soft issuer check
//! ```
//!
//! Every step short-circuits with a typed failure; a rejected token is
//! never partially trusted.

pub mod claims;
pub mod parser;
pub mod verifier;

use thiserror::Error;

pub use claims::Claims;
pub use parser::ParsedToken;
pub use verifier::TokenVerifier;

/// Typed verification failures, returned to the immediate caller and never
/// silently swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The token is empty or not a well-formed three-part signed token.
    #[error("malformed token")]
    MalformedToken,

    /// The token header carries no key id.
    #[error("token header missing key id")]
    MissingKeyId,

    /// No trusted key matches the token's key id, even after a refresh.
    #[error("no verification key for kid {0}")]
    KeyNotFound(String),

    /// Signature verification failed (includes decode/crypto errors).
    #[error("invalid token signature")]
    InvalidSignature,

    /// The claims payload does not decode into the expected shape.
    #[error("malformed token claims")]
    MalformedClaims,

    /// The expiry claim is at or before the current time.
    #[error("token expired")]
    Expired,

    /// The token carries a revocation marker.
    #[error("token revoked")]
    Revoked,

    /// Neither a user-id claim nor a subject is present.
    #[error("token missing user id")]
    MissingUserId,

    /// No tenant-id claim is present.
    #[error("token missing tenant id")]
    MissingTenantId,
}

impl VerifyError {
    /// Stable label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            VerifyError::MalformedToken => "malformed_token",
            VerifyError::MissingKeyId => "missing_key_id",
            VerifyError::KeyNotFound(_) => "key_not_found",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::MalformedClaims => "malformed_claims",
            VerifyError::Expired => "expired",
            VerifyError::Revoked => "revoked",
            VerifyError::MissingUserId => "missing_user_id",
            VerifyError::MissingTenantId => "missing_tenant_id",
        }
    }
}
