/// Session validation: bearer token + server-side session record
///
/// The bearer token alone is never enough: the signature proves who the
/// caller is, the session record decides whether the session is still
/// valid and what the caller may do. Deleting the record (logout) or
/// flipping its status to `updated` (invalidation) takes effect on the
/// next request even though the token itself stays cryptographically
/// valid until expiry.
use crate::{
    context::AppContext,
    error::GateError,
    session::{Capability, PermissionSet, SessionStatus},
    token::IdentityClaims,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Authenticated request context
///
/// Extracting this runs the full validation pipeline: bearer header →
/// signature/expiry → identity claims → session record → freshness →
/// permission projection.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: IdentityClaims,
    pub permissions: PermissionSet,
}

impl AuthContext {
    /// Enforce a module capability for this request
    pub fn require(&self, module_id: &str, capability: Capability) -> Result<(), GateError> {
        self.permissions.require(module_id, capability)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = GateError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        // Extract bearer token from Authorization header
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            GateError::Authentication("Missing or invalid authorization header".to_string())
        })?;

        // Verify signature and expiry, extract the identity triple
        let identity = state.token_codec.verify(&token)?;

        // Load the session record; a miss means logout or forced
        // invalidation already took effect
        let record = state
            .session_store
            .get(identity.account_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!("no session record for {}", identity.account_id);
                GateError::Authentication("You are not logged in. Token is not valid".to_string())
            })?;

        // A record marked updated exists but must not validate
        if record.status == SessionStatus::Updated {
            tracing::warn!("stale session record for {}", identity.account_id);
            return Err(GateError::Authentication(
                "Your data has changed. Please log in again".to_string(),
            ));
        }

        let permissions = PermissionSet::from_grants(&record.module);

        Ok(AuthContext {
            identity,
            permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        account::AccountRole,
        config::*,
        session::{ModuleGrant, SessionRecord},
    };
    use axum::http::Request;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn test_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                account_db: PathBuf::from(":memory:"),
                max_connections: 10,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                token_ttl: 3600,
                one_time_token_ttl: 3600,
                bcrypt_cost: 4,
            },
            cache: CacheConfig { redis_url: None },
            email: None,
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    async fn test_context() -> AppContext {
        AppContext::new(test_config()).await.unwrap()
    }

    fn parts_with_bearer(token: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header("authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn grants() -> Vec<ModuleGrant> {
        vec![ModuleGrant {
            module_id: "profile".to_string(),
            module_access: true,
            read_access: true,
            write_access: true,
            delete_access: false,
        }]
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[tokio::test]
    async fn test_valid_token_with_record_yields_identity() {
        let ctx = test_context().await;
        let account_id = Uuid::new_v4();
        let profile_id = Uuid::new_v4();

        let token = ctx
            .token_codec
            .issue(account_id, profile_id, "alice@example.com", AccountRole::User)
            .unwrap();
        ctx.session_store
            .put(account_id, &SessionRecord::new(token.clone(), grants()))
            .await
            .unwrap();

        let mut parts = parts_with_bearer(&token);
        let auth = AuthContext::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap();

        assert_eq!(auth.identity.account_id, account_id);
        assert_eq!(auth.identity.profile_id, profile_id);
        assert_eq!(auth.identity.email, "alice@example.com");
        assert!(auth.require("profile", Capability::Write).is_ok());
        assert!(auth.require("wallet", Capability::Read).is_err());
    }

    #[tokio::test]
    async fn test_missing_record_and_stale_record_fail_differently() {
        let ctx = test_context().await;
        let account_id = Uuid::new_v4();

        let token = ctx
            .token_codec
            .issue(account_id, Uuid::new_v4(), "alice@example.com", AccountRole::User)
            .unwrap();

        // No record at all: the "not logged in" reason
        let mut parts = parts_with_bearer(&token);
        let err = AuthContext::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        let GateError::Authentication(no_session) = err else {
            panic!("expected authentication error");
        };
        assert!(no_session.contains("not logged in"));

        // Record present but marked updated: the "data changed" reason
        ctx.session_store
            .put(account_id, &SessionRecord::new(token.clone(), grants()))
            .await
            .unwrap();
        ctx.session_store.mark_updated(account_id).await.unwrap();

        let mut parts = parts_with_bearer(&token);
        let err = AuthContext::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        let GateError::Authentication(stale) = err else {
            panic!("expected authentication error");
        };
        assert!(stale.contains("data has changed"));
        assert_ne!(no_session, stale);
    }

    #[tokio::test]
    async fn test_garbage_token_is_authentication_error() {
        let ctx = test_context().await;

        let mut parts = parts_with_bearer("not-a-jwt");
        let err = AuthContext::from_request_parts(&mut parts, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Authentication(_)));
    }
}
