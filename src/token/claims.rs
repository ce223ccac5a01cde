//! Typed claim set decoded from a verified token payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claims carried by a verified token. Standard claims are typed; anything
/// else lands in `extra` untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Claims {
    /// Standard subject claim.
    #[serde(default)]
    pub sub: Option<String>,

    /// Token identifier.
    #[serde(default)]
    pub jti: Option<String>,

    /// Expiry, seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// Dedicated user-id claim, preferred over `sub` when present.
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,

    /// Tenant the token is scoped to.
    #[serde(default, rename = "tenantId")]
    pub tenant_id: Option<String>,

    /// Role names; kept loose so a wrong shape degrades to "no roles"
    /// instead of a decode failure.
    #[serde(default)]
    pub roles: Option<Value>,

    /// Every claim not captured above.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
