//! Strategy contract and resolver.
//!
//! Authentication schemes are a closed set: the resolver maps a server's
//! stored auth-type string onto one of the fixed strategy instances and
//! rejects anything else outright. A silent fallback here would be an
//! unauthenticated pass-through, so unknown types are a hard failure.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::auth::base::BaseStrategy;
use crate::auth::context::AuthOutcome;
use crate::auth::jwt::JwtStrategy;
use crate::db::ServerAuthType;
use crate::types::ServerId;

/// Credential material extracted from an HTTP request.
///
/// The middleware extracts once; strategies pick the sources they accept.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    /// `token` query parameter.
    pub query_token: Option<String>,
    /// `X-Auth-Token` header value.
    pub custom_header_token: Option<String>,
    /// `token` field of a JSON request body (body-bearing verbs only).
    pub body_token: Option<String>,
}

impl AuthRequest {
    /// The bearer token from the `Authorization` header, if the header is
    /// present and uses the Bearer scheme.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|header| header.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
    }
}

/// One interchangeable authentication scheme.
///
/// Expected failures (bad token, no access, misconfigured provider) are
/// returned inside [`AuthOutcome`]; `Err` is reserved for store or network
/// breakage the middleware reports as an internal error.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// The scheme this strategy implements.
    fn auth_type(&self) -> ServerAuthType;

    /// Authenticate a request against the addressed server.
    async fn authenticate(
        &self,
        server_id: &ServerId,
        request: &AuthRequest,
    ) -> anyhow::Result<AuthOutcome>;
}

/// A server's stored auth type matched no registered strategy.
///
/// This is a deployment bug (records are only written through the admin
/// console, which validates the type), so it surfaces as a hard error
/// rather than an authentication failure.
#[derive(Debug, Clone)]
pub struct UnsupportedStrategy {
    /// The offending stored value.
    pub auth_type: String,
}

impl fmt::Display for UnsupportedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported authentication type: {}", self.auth_type)
    }
}

impl std::error::Error for UnsupportedStrategy {}

/// Maps configured auth types onto the fixed strategy instances.
pub struct StrategyResolver {
    base: Arc<BaseStrategy>,
    jwt: Arc<JwtStrategy>,
}

impl StrategyResolver {
    /// Build the resolver over the two registered strategies.
    pub fn new(base: Arc<BaseStrategy>, jwt: Arc<JwtStrategy>) -> Self {
        Self { base, jwt }
    }

    /// Resolve a parsed auth type. Total over the closed set.
    pub fn resolve(&self, auth_type: ServerAuthType) -> Arc<dyn AuthStrategy> {
        match auth_type {
            ServerAuthType::Base => self.base.clone(),
            ServerAuthType::Jwt => self.jwt.clone(),
        }
    }

    /// Resolve a stored auth-type string, failing on unknown values.
    pub fn resolve_raw(&self, raw: &str) -> Result<Arc<dyn AuthStrategy>, UnsupportedStrategy> {
        ServerAuthType::parse(raw)
            .map(|ty| self.resolve(ty))
            .ok_or_else(|| UnsupportedStrategy {
                auth_type: raw.to_string(),
            })
    }

    /// Whether a stored auth-type string maps to a registered strategy.
    pub fn is_supported(&self, raw: &str) -> bool {
        ServerAuthType::parse(raw).is_some()
    }

    /// Stored string forms of every registered auth type.
    pub fn supported_types(&self) -> Vec<&'static str> {
        vec![ServerAuthType::Base.as_str(), ServerAuthType::Jwt.as_str()]
    }

    /// The JWT strategy, for admin affordances that bypass dispatch.
    pub fn jwt(&self) -> &Arc<JwtStrategy> {
        &self.jwt
    }
}
