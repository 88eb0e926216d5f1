//! JWT identity module.
//!
//! The identity service signs a token per session; every ledger call
//! presents it. Decoding yields the caller's [`Identity`], which the ledger
//! trusts verbatim.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use kassa_core::{Capabilities, Identity};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,

    pub branch: String,
    pub branch_id: i64,
    pub company_id: i64,

    /// Till the user is working, `0` when none is open
    #[serde(default)]
    pub till_num: i64,

    #[serde(default)]
    pub capabilities: Capabilities,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            username: claims.sub,
            branch: claims.branch,
            branch_id: claims.branch_id,
            company_id: claims.company_id,
            till_num: claims.till_num,
            capabilities: claims.capabilities,
        }
    }
}

/// Signs and resolves identity tokens.
pub struct IdentityResolver {
    secret: String,
}

impl IdentityResolver {
    pub fn new(secret: String) -> Self {
        IdentityResolver { secret }
    }

    /// Signs a token for `identity`, valid for `lifetime_secs`.
    pub fn issue(&self, identity: &Identity, lifetime_secs: i64) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(lifetime_secs);

        let claims = Claims {
            sub: identity.username.clone(),
            branch: identity.branch.clone(),
            branch_id: identity.branch_id,
            company_id: identity.company_id,
            till_num: identity.till_num,
            capabilities: identity.capabilities,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::unauthenticated(format!("Failed to sign token: {}", e)))
    }

    /// Validates `token` and returns the identity it carries.
    pub fn resolve(&self, token: &str) -> Result<Identity, ApiError> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| ApiError::unauthenticated(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims.into())
    }

    /// Resolves an `Authorization: Bearer <token>` header value.
    pub fn resolve_header(&self, auth_header: &str) -> Result<Identity, ApiError> {
        let token = extract_bearer_token(auth_header)
            .ok_or_else(|| ApiError::unauthenticated("Invalid authorization header"))?;
        self.resolve(token)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn cashier() -> Identity {
        Identity {
            username: "amina".into(),
            branch: "Westlands".into(),
            branch_id: 2,
            company_id: 1,
            till_num: 202610160001,
            capabilities: Capabilities {
                make_sales: true,
                accept_payment: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_identity_roundtrip() {
        let resolver = IdentityResolver::new("test-secret".to_string());
        let token = resolver.issue(&cashier(), 3600).unwrap();

        let identity = resolver.resolve_header(&format!("Bearer {}", token)).unwrap();
        assert_eq!(identity, cashier());
    }

    #[test]
    fn test_wrong_secret_is_unauthenticated() {
        let token = IdentityResolver::new("one".to_string()).issue(&cashier(), 3600).unwrap();
        let err = IdentityResolver::new("two".to_string()).resolve(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[test]
    fn test_expired_token() {
        let resolver = IdentityResolver::new("test-secret".to_string());
        let token = resolver.issue(&cashier(), -3600).unwrap();
        assert!(resolver.resolve(&token).is_err());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }
}
