/// Token codec: signed bearer tokens and opaque one-time tokens
///
/// Bearer tokens are compact HS256 JWTs carrying identity claims only;
/// permission state lives in the session record, never in the token, so
/// revoking permissions does not require reissuing tokens.
use crate::{
    account::AccountRole,
    error::{GateError, GateResult},
};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in every bearer token
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    profile_id: String,
    email: String,
    role: String,
    iat: i64,
    exp: i64,
}

/// Identity triple extracted from a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub account_id: Uuid,
    pub profile_id: Uuid,
    pub email: String,
}

/// Signs and verifies bearer tokens with the server secret
#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    token_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: impl Into<String>, token_ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            token_ttl: Duration::seconds(token_ttl_secs),
        }
    }

    /// Issue a bearer token expiring after the configured TTL
    pub fn issue(
        &self,
        account_id: Uuid,
        profile_id: Uuid,
        email: &str,
        role: AccountRole,
    ) -> GateResult<String> {
        self.issue_with_expiry(account_id, profile_id, email, role, Utc::now() + self.token_ttl)
    }

    /// Issue a bearer token with an explicit expiry timestamp
    pub fn issue_with_expiry(
        &self,
        account_id: Uuid,
        profile_id: Uuid,
        email: &str,
        role: AccountRole,
        expiry: DateTime<Utc>,
    ) -> GateResult<String> {
        let claims = Claims {
            id: account_id.to_string(),
            profile_id: profile_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            iat: Utc::now().timestamp(),
            exp: expiry.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| GateError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry, then extract the identity triple
    ///
    /// Signature, algorithm and expiry failures are authentication errors;
    /// a missing or unparseable claim after a successful decode is a shape
    /// error and maps to an internal failure instead.
    pub fn verify(&self, token: &str) -> GateResult<IdentityClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew (5 minutes)
        validation.leeway = 300;

        let data =
            decode::<serde_json::Value>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
                .map_err(|e| {
                    tracing::warn!("bearer token verification failed: {}", e);
                    GateError::Authentication("Invalid token".to_string())
                })?;

        let claims = &data.claims;

        let account_id = Self::claim_str(claims, "id")?;
        let profile_id = Self::claim_str(claims, "profile_id")?;
        let email = Self::claim_str(claims, "email")?;

        let account_id = Uuid::parse_str(&account_id)
            .map_err(|_| GateError::Internal("Failed to parse account ID from token".to_string()))?;
        let profile_id = Uuid::parse_str(&profile_id)
            .map_err(|_| GateError::Internal("Failed to parse profile ID from token".to_string()))?;

        Ok(IdentityClaims {
            account_id,
            profile_id,
            email,
        })
    }

    fn claim_str(claims: &serde_json::Value, name: &str) -> GateResult<String> {
        claims
            .get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GateError::Internal(format!("Failed to extract {} claim from token", name))
            })
    }
}

/// Generate an opaque one-time token: 16 random bytes, URL-safe base64
pub fn generate_one_time_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("unit-test-secret-key-0123456789-0123456789", 3600)
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let codec = codec();
        let account_id = Uuid::new_v4();
        let profile_id = Uuid::new_v4();

        let token = codec
            .issue(account_id, profile_id, "alice@example.com", AccountRole::User)
            .unwrap();
        let identity = codec.verify(&token).unwrap();

        assert_eq!(identity.account_id, account_id);
        assert_eq!(identity.profile_id, profile_id);
        assert_eq!(identity.email, "alice@example.com");
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let codec = codec();
        let expired = Utc::now() - Duration::hours(1);
        let token = codec
            .issue_with_expiry(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "alice@example.com",
                AccountRole::User,
                expired,
            )
            .unwrap();

        match codec.verify(&token) {
            Err(GateError::Authentication(_)) => {}
            other => panic!("expected authentication error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let codec = codec();
        let other = TokenCodec::new("a-different-secret-key-0123456789-012345", 3600);

        let token = codec
            .issue(Uuid::new_v4(), Uuid::new_v4(), "alice@example.com", AccountRole::User)
            .unwrap();

        match other.verify(&token) {
            Err(GateError::Authentication(_)) => {}
            other => panic!("expected authentication error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_verify_missing_claim_is_internal_error() {
        let codec = codec();

        // Hand-roll a token without the profile_id claim
        #[derive(Serialize)]
        struct PartialClaims {
            id: String,
            email: String,
            exp: i64,
        }
        let token = encode(
            &Header::default(),
            &PartialClaims {
                id: Uuid::new_v4().to_string(),
                email: "alice@example.com".to_string(),
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
            },
            &EncodingKey::from_secret("unit-test-secret-key-0123456789-0123456789".as_bytes()),
        )
        .unwrap();

        match codec.verify(&token) {
            Err(GateError::Internal(_)) => {}
            other => panic!("expected internal error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_one_time_tokens_are_unique() {
        let a = generate_one_time_token();
        let b = generate_one_time_token();
        assert_ne!(a, b);
        // 16 bytes -> 24 base64 chars (with padding)
        assert_eq!(a.len(), 24);
    }
}
