//! Structural token parsing and pure claim extraction helpers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::token::claims::Claims;
use crate::token::VerifyError;

/// Decoded token header. Only the fields verification needs.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm, as written in the token.
    pub alg: String,

    /// Key id of the verification key, when present.
    #[serde(default)]
    pub kid: Option<String>,
}

/// A structurally valid token, decoded but not yet trusted. Created fresh
/// per verification call and discarded afterwards.
#[derive(Debug)]
pub struct ParsedToken {
    /// Decoded header.
    pub header: TokenHeader,

    /// Decoded claims payload (signature not yet checked).
    pub payload: Value,

    /// The raw token text, kept for signature verification and the
    /// fallback token id.
    pub raw: String,
}

/// Parse a token string. `MalformedToken` unless it is a non-blank,
/// three-part signed token whose header and payload decode as JSON.
pub fn parse_token(token: &str) -> Result<ParsedToken, VerifyError> {
    if token.trim().is_empty() {
        return Err(VerifyError::MalformedToken);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(VerifyError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|_| VerifyError::MalformedToken)?;
    let header: TokenHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| VerifyError::MalformedToken)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| VerifyError::MalformedToken)?;
    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| VerifyError::MalformedToken)?;
    if !payload.is_object() {
        return Err(VerifyError::MalformedToken);
    }

    Ok(ParsedToken {
        header,
        payload,
        raw: token.to_string(),
    })
}

/// The token's identifier for revocation checks: the `jti` claim when it is
/// a non-blank string, else a deterministic hash of the raw token so
/// revocation stays possible for tokens without one.
pub fn token_id(parsed: &ParsedToken) -> String {
    match parsed.payload.get("jti").and_then(Value::as_str) {
        Some(jti) if !jti.trim().is_empty() => jti.to_string(),
        _ => fallback_token_id(&parsed.raw),
    }
}

/// Deterministic fallback identifier derived from the raw token text.
pub fn fallback_token_id(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// User identifier: the dedicated `userId` claim, else `sub`.
pub fn extract_user_id(claims: &Claims) -> Result<String, VerifyError> {
    claims
        .user_id
        .as_deref()
        .or(claims.sub.as_deref())
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .ok_or(VerifyError::MissingUserId)
}

/// Tenant identifier; required.
pub fn extract_tenant_id(claims: &Claims) -> Result<String, VerifyError> {
    claims
        .tenant_id
        .clone()
        .ok_or(VerifyError::MissingTenantId)
}

/// Role names. An absent or wrongly shaped claim is an empty list, never
/// an error; non-string entries are dropped.
pub fn extract_roles(claims: &Claims) -> Vec<String> {
    match &claims.roles {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
