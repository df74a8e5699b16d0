//! BASE strategy: gateway session tokens checked against registered users.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::auth::access::AccessValidator;
use crate::auth::context::{AuthOutcome, AuthUser};
use crate::auth::strategy::{AuthRequest, AuthStrategy};
use crate::auth::token::{TokenVerifier, token_fingerprint};
use crate::db::ServerAuthType;
use crate::types::{ServerId, TenantId};

/// Authenticates bearer session tokens issued by the end-user session
/// service, then authorizes the caller through the access validator.
pub struct BaseStrategy {
    verifier: Arc<dyn TokenVerifier>,
    validator: Arc<AccessValidator>,
}

impl BaseStrategy {
    /// Create the strategy over a token verifier and access validator.
    pub fn new(verifier: Arc<dyn TokenVerifier>, validator: Arc<AccessValidator>) -> Self {
        Self {
            verifier,
            validator,
        }
    }
}

#[async_trait]
impl AuthStrategy for BaseStrategy {
    fn auth_type(&self) -> ServerAuthType {
        ServerAuthType::Base
    }

    async fn authenticate(
        &self,
        server_id: &ServerId,
        request: &AuthRequest,
    ) -> anyhow::Result<AuthOutcome> {
        // No token, or a non-Bearer scheme: fail without any lookup.
        let Some(token) = request.bearer_token() else {
            return Ok(AuthOutcome::denied("Missing bearer token"));
        };

        let Some(claims) = self.verifier.verify(token).await else {
            debug!(
                server_id = %server_id,
                token = %token_fingerprint(token),
                "Session token did not verify"
            );
            return Ok(AuthOutcome::denied("Invalid or expired session token"));
        };

        let decision = self
            .validator
            .validate_access(server_id, &claims.email)
            .await?;

        if let Some(error) = decision.error {
            return Ok(AuthOutcome::denied(error));
        }
        if decision.user_not_found {
            return Ok(AuthOutcome::denied(format!(
                "No access to server {}",
                server_id
            )));
        }

        // Access confirmed; load the user record for the caller context.
        let user = self.validator.lookup_user(server_id, &claims.email).await?;
        let Some(user) = user else {
            // The user disappeared between the access check and this
            // lookup (cache window or concurrent delete).
            return Ok(AuthOutcome::denied(format!(
                "No access to server {}",
                server_id
            )));
        };

        Ok(AuthOutcome::granted(AuthUser {
            user_id: user.id.to_string(),
            tenant_id: Some(TenantId::new(user.tenant_id)),
            email: Some(user.email),
            auth_type: ServerAuthType::Base,
            raw_token: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::{SessionClaims, SignedTokenVerifier};
    use crate::cache::TtlCache;
    use crate::config::CacheConfig;
    use crate::db::{
        DatabaseConfig, Db, EndUserCreate, QueryBuilder, ServerCreate, create_connection,
        ensure_schema,
    };
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    const SECRET: &str = "test-session-secret";

    fn issue_token(email: &str) -> String {
        let claims = SessionClaims {
            id: "session-user-1".to_string(),
            email: email.to_string(),
            tenant_id: Some("t1".to_string()),
            jti: None,
            exp: 4102444800,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn setup() -> (Db, BaseStrategy) {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let cache = Arc::new(TtlCache::new(&CacheConfig::default()));
        let validator = Arc::new(AccessValidator::new(db.clone(), cache));
        let strategy = BaseStrategy::new(Arc::new(SignedTokenVerifier::new(SECRET)), validator);
        (db, strategy)
    }

    async fn seed(db: &Db, server_enabled: bool, user_enabled: bool) {
        QueryBuilder::create_server(
            db,
            &ServerCreate {
                slug: "s1".to_string(),
                name: None,
                tenant_id: "t1".to_string(),
                auth_type: Some("BASE".to_string()),
                enabled: server_enabled,
            },
        )
        .await
        .unwrap();
        QueryBuilder::create_end_user(
            db,
            &EndUserCreate {
                email: "a@x.com".to_string(),
                tenant_id: "t1".to_string(),
                display_name: None,
                enabled: user_enabled,
            },
        )
        .await
        .unwrap();
    }

    fn bearer(token: &str) -> AuthRequest {
        AuthRequest {
            authorization: Some(format!("Bearer {}", token)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_token_short_circuits() {
        let (_db, strategy) = setup().await;
        let outcome = strategy
            .authenticate(&ServerId::new("s1"), &AuthRequest::default())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_message().contains("Missing bearer token"));
    }

    #[tokio::test]
    async fn test_wrong_scheme_short_circuits() {
        let (_db, strategy) = setup().await;
        let request = AuthRequest {
            authorization: Some("Basic dXNlcjpwYXNz".to_string()),
            ..Default::default()
        };
        let outcome = strategy
            .authenticate(&ServerId::new("s1"), &request)
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_invalid_token_denied() {
        let (db, strategy) = setup().await;
        seed(&db, true, true).await;

        let outcome = strategy
            .authenticate(&ServerId::new("s1"), &bearer("bogus"))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_message().contains("Invalid or expired"));
    }

    #[tokio::test]
    async fn test_unknown_server_denied_with_server_message() {
        let (_db, strategy) = setup().await;

        let outcome = strategy
            .authenticate(&ServerId::new("ghost"), &bearer(&issue_token("a@x.com")))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_message().contains("Invalid or disabled server: ghost"));
    }

    #[tokio::test]
    async fn test_disabled_user_denied_with_access_message() {
        let (db, strategy) = setup().await;
        seed(&db, true, false).await;

        let outcome = strategy
            .authenticate(&ServerId::new("s1"), &bearer(&issue_token("a@x.com")))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_message().contains("Insufficient access"));
    }

    #[tokio::test]
    async fn test_unregistered_email_gets_generic_denial() {
        let (db, strategy) = setup().await;
        seed(&db, true, true).await;

        let outcome = strategy
            .authenticate(&ServerId::new("s1"), &bearer(&issue_token("ghost@x.com")))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_message(), "No access to server s1");
    }

    #[tokio::test]
    async fn test_valid_caller_granted_with_context() {
        let (db, strategy) = setup().await;
        seed(&db, true, true).await;

        let outcome = strategy
            .authenticate(&ServerId::new("s1"), &bearer(&issue_token("a@x.com")))
            .await
            .unwrap();
        assert!(outcome.success);

        let user = outcome.user.unwrap();
        assert_eq!(user.auth_type, ServerAuthType::Base);
        assert_eq!(user.tenant_id.unwrap().as_str(), "t1");
        assert_eq!(user.email.as_deref(), Some("a@x.com"));
        assert!(user.raw_token.is_none());
        assert!(!user.user_id.is_empty());
    }
}
