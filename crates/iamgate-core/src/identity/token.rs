//! Access token claims.
//!
//! Claims are read from the JWT payload segment only. Signatures are not
//! verified here; the provider is trusted to have issued the token.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Subset of the access token claims the application reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiry, seconds since epoch
    #[serde(default)]
    pub exp: Option<u64>,
    /// Issued at, seconds since epoch
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

/// Realm-scoped role grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenClaims {
    /// Decodes the payload segment of a compact JWT.
    ///
    /// # Errors
    /// Returns an error if the token is not a three-part JWT or the payload
    /// is not base64url-encoded JSON.
    pub fn from_jwt(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            anyhow::bail!("Access token is not a JWT (expected three segments)");
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .context("Failed to decode token payload")?;
        serde_json::from_slice(&bytes).context("Failed to parse token claims")
    }

    /// Whether the realm role set contains `role`. Empty names never match.
    pub fn has_realm_role(&self, role: &str) -> bool {
        if role.is_empty() {
            return false;
        }
        self.realm_access
            .as_ref()
            .is_some_and(|access| access.roles.iter().any(|r| r == role))
    }

    /// Whether less than `min_validity_secs` of validity remain.
    /// Tokens without an `exp` claim are treated as expired.
    pub fn expires_within(&self, min_validity_secs: u64) -> bool {
        let Some(exp) = self.exp else {
            return true;
        };
        now_secs().saturating_add(min_validity_secs) > exp
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(u64::MAX, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_parses_keycloak_claims() {
        let token = jwt(&json!({
            "sub": "f3c1",
            "preferred_username": "alice",
            "exp": 4_102_444_800u64,
            "realm_access": { "roles": ["default-roles-myrealm", "offline_access"] },
            "azp": "mytest"
        }));

        let claims = TokenClaims::from_jwt(&token).unwrap();
        assert_eq!(claims.preferred_username.as_deref(), Some("alice"));
        assert!(claims.has_realm_role("default-roles-myrealm"));
        assert!(!claims.has_realm_role("admin"));
        assert!(!claims.has_realm_role(""));
    }

    #[test]
    fn test_missing_realm_access_has_no_roles() {
        let claims = TokenClaims::from_jwt(&jwt(&json!({ "sub": "x" }))).unwrap();
        assert!(!claims.has_realm_role("default-roles-myrealm"));
        assert!(claims.preferred_username.is_none());
    }

    #[test]
    fn test_rejects_non_jwt() {
        assert!(TokenClaims::from_jwt("opaque-token").is_err());
        assert!(TokenClaims::from_jwt("a.b.c.d").is_err());
        assert!(TokenClaims::from_jwt("a.!!!.c").is_err());
    }

    #[test]
    fn test_expires_within() {
        let now = now_secs();
        let fresh = TokenClaims {
            exp: Some(now + 300),
            ..TokenClaims::default()
        };
        assert!(!fresh.expires_within(5));
        assert!(fresh.expires_within(600));

        let stale = TokenClaims {
            exp: Some(now.saturating_sub(1)),
            ..TokenClaims::default()
        };
        assert!(stale.expires_within(0));
        assert!(TokenClaims::default().expires_within(0));
    }

    #[test]
    fn test_exactly_min_validity_left_is_still_valid() {
        let claims = TokenClaims {
            exp: Some(now_secs() + 60),
            ..TokenClaims::default()
        };
        assert!(!claims.expires_within(60));
        assert!(claims.expires_within(61));
    }
}
