//! Request-scoped authentication results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::ServerAuthType;
use crate::types::{ProviderId, TenantId};

/// Identity of an authenticated caller.
///
/// Attached to the request once authentication succeeds and passed to the
/// transport layer so downstream consumers can scope their work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// Caller identifier: the end-user record id (BASE) or the token's
    /// subject claim (JWT).
    pub user_id: String,
    /// Tenant the caller belongs to, when known.
    pub tenant_id: Option<TenantId>,
    /// Email, when the scheme provides one.
    pub email: Option<String>,
    /// Scheme that authenticated this caller.
    pub auth_type: ServerAuthType,
    /// Original bearer token, preserved for JWT callers so it can be
    /// forwarded to the tool-execution layer.
    pub raw_token: Option<String>,
}

/// Supplementary facts about a successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMetadata {
    /// Provider that verified the credential (JWT scheme).
    pub provider_id: Option<ProviderId>,
    /// When verification completed.
    pub validated_at: DateTime<Utc>,
}

impl AuthMetadata {
    /// Metadata stamped with the current time.
    pub fn now(provider_id: Option<ProviderId>) -> Self {
        Self {
            provider_id,
            validated_at: Utc::now(),
        }
    }
}

/// Outcome of running an authentication strategy.
///
/// Created once per request and discarded when the request completes; it is
/// never cached. Expected failures are values here, not errors; only
/// store/network breakage surfaces as `Err` from a strategy.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// Whether authentication succeeded.
    pub success: bool,
    /// Caller identity on success.
    pub user: Option<AuthUser>,
    /// Human-readable reason on failure.
    pub error: Option<String>,
    /// Supplementary facts on success.
    pub metadata: Option<AuthMetadata>,
}

impl AuthOutcome {
    /// A successful outcome.
    pub fn granted(user: AuthUser) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
            metadata: None,
        }
    }

    /// A successful outcome carrying metadata.
    pub fn granted_with_metadata(user: AuthUser, metadata: AuthMetadata) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
            metadata: Some(metadata),
        }
    }

    /// A failed outcome with a reason.
    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// The failure reason, or a generic fallback.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Authentication failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            user_id: "u1".to_string(),
            tenant_id: Some(TenantId::new("t1")),
            email: Some("a@x.com".to_string()),
            auth_type: ServerAuthType::Base,
            raw_token: None,
        }
    }

    #[test]
    fn test_granted() {
        let outcome = AuthOutcome::granted(user());
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.user.unwrap().user_id, "u1");
    }

    #[test]
    fn test_denied() {
        let outcome = AuthOutcome::denied("no access");
        assert!(!outcome.success);
        assert!(outcome.user.is_none());
        assert_eq!(outcome.error_message(), "no access");
    }

    #[test]
    fn test_metadata_carries_provider() {
        let outcome = AuthOutcome::granted_with_metadata(
            user(),
            AuthMetadata::now(Some(ProviderId::new("p1"))),
        );
        let metadata = outcome.metadata.unwrap();
        assert_eq!(metadata.provider_id.unwrap().as_str(), "p1");
        assert!(metadata.validated_at <= Utc::now());
    }
}
