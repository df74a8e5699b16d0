//! Authentication middleware.
//!
//! Per-request flow: resolve the addressed server id, resolve the server's
//! configured strategy, run it, then either attach the outcome to the
//! request or reject. Requests with no resolvable server id are rejected
//! before any authentication work; there is no server to authenticate
//! against.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use futures::future::BoxFuture;
use http::{Method, StatusCode, header};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

use crate::auth::access::AccessValidator;
use crate::auth::base::BaseStrategy;
use crate::auth::context::AuthOutcome;
use crate::auth::jwks::KeySetVerifier;
use crate::auth::jwt::JwtStrategy;
use crate::auth::strategy::{AuthRequest, StrategyResolver};
use crate::auth::token::TokenVerifier;
use crate::cache::TtlCache;
use crate::config::GatewayConfig;
use crate::db::{Db, ServerAuthType};
use crate::transport::http::rpc_error_response;
use crate::types::ServerId;

/// Query parameter naming the addressed server.
pub const SERVER_ID_QUERY_PARAM: &str = "serverId";

/// Query parameter carrying a JWT credential.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Custom header carrying a JWT credential.
pub const CUSTOM_AUTH_HEADER: &str = "x-auth-token";

/// Body field carrying a JWT credential (body-bearing verbs only).
const BODY_TOKEN_FIELD: &str = "token";

/// Largest request body the middleware will buffer to look for a token.
const MAX_BODY_PEEK_BYTES: usize = 64 * 1024;

/// Result of running the full authentication flow for one request.
enum AuthFlow {
    /// Strategy ran; outcome may be success or an expected failure.
    Completed {
        server_id: ServerId,
        outcome: AuthOutcome,
    },
    /// No server id could be derived from the request.
    MissingServerId,
    /// Resolution or the strategy itself broke unexpectedly.
    Internal,
}

/// Bundles the strategies, resolver, and server-id resolution policy.
pub struct Authenticator {
    config: GatewayConfig,
    validator: Arc<AccessValidator>,
    resolver: StrategyResolver,
}

impl Authenticator {
    /// Wire the full authentication stack over a store connection.
    pub fn new(
        db: Db,
        cache: Arc<TtlCache>,
        config: GatewayConfig,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let validator = Arc::new(AccessValidator::new(db.clone(), cache));
        let keys = Arc::new(KeySetVerifier::new(&config.jwks));
        let base = Arc::new(BaseStrategy::new(token_verifier, validator.clone()));
        let jwt = Arc::new(JwtStrategy::new(db, validator.clone(), keys));
        let resolver = StrategyResolver::new(base, jwt);

        Self {
            config,
            validator,
            resolver,
        }
    }

    /// The strategy resolver.
    pub fn resolver(&self) -> &StrategyResolver {
        &self.resolver
    }

    /// The access validator (shared with admin tooling for invalidation).
    pub fn validator(&self) -> &Arc<AccessValidator> {
        &self.validator
    }

    /// Derive the addressed server id: fixed override, then `serverId`
    /// query parameter, then subdomain of the configured base domain.
    fn resolve_server_id(&self, req: &Request) -> Option<ServerId> {
        if let Some(id) = &self.config.server_id_override {
            return Some(ServerId::new(id.clone()));
        }

        if let Some(query) = req.uri().query() {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if key == SERVER_ID_QUERY_PARAM && !value.is_empty() {
                    return Some(ServerId::new(value.into_owned()));
                }
            }
        }

        let base = self.config.base_domain.as_deref()?;
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())?;
        let host = host.split(':').next().unwrap_or(host);
        let label = host.strip_suffix(&format!(".{}", base))?;
        if label.is_empty() || label.contains('.') {
            return None;
        }
        Some(ServerId::new(label))
    }

    /// Run the authentication flow, returning the (possibly rebuilt)
    /// request alongside the result.
    async fn process(&self, req: Request) -> (Request, AuthFlow) {
        let path = req.uri().path().to_string();

        let Some(server_id) = self.resolve_server_id(&req) else {
            warn!(path = %path, "Request rejected: no server identifier");
            return (req, AuthFlow::MissingServerId);
        };

        let server = match self.validator.lookup_server(&server_id).await {
            Ok(server) => server,
            Err(e) => {
                error!(
                    server_id = %server_id,
                    path = %path,
                    "Server lookup failed: {:#}",
                    e
                );
                return (req, AuthFlow::Internal);
            }
        };

        // Servers with no stored auth configuration default to BASE.
        let raw_type = server
            .as_ref()
            .and_then(|s| s.auth_type.clone())
            .unwrap_or_else(|| ServerAuthType::Base.as_str().to_string());

        let strategy = match self.resolver.resolve_raw(&raw_type) {
            Ok(strategy) => strategy,
            Err(e) => {
                error!(server_id = %server_id, path = %path, "{}", e);
                return (req, AuthFlow::Internal);
            }
        };

        let (req, credentials) = extract_credentials(req, strategy.auth_type()).await;

        match strategy.authenticate(&server_id, &credentials).await {
            Ok(outcome) => (req, AuthFlow::Completed { server_id, outcome }),
            Err(e) => {
                // Log the request coordinates, never its body.
                error!(
                    server_id = %server_id,
                    path = %path,
                    "Authentication errored: {:#}",
                    e
                );
                (req, AuthFlow::Internal)
            }
        }
    }
}

/// Pull credential material out of the request.
///
/// The body is only buffered when the JWT strategy may need it: a
/// body-bearing verb with no token in any cheaper source.
async fn extract_credentials(req: Request, auth_type: ServerAuthType) -> (Request, AuthRequest) {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let custom_header_token = req
        .headers()
        .get(CUSTOM_AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let query_token = req.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, value)| key == TOKEN_QUERY_PARAM && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    });

    let mut credentials = AuthRequest {
        authorization,
        query_token,
        custom_header_token,
        body_token: None,
    };

    let body_verb = matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH);
    let have_token = credentials.authorization.is_some()
        || credentials.query_token.is_some()
        || credentials.custom_header_token.is_some();

    if auth_type != ServerAuthType::Jwt || !body_verb || have_token {
        return (req, credentials);
    }

    let content_length = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if !content_length.is_some_and(|len| len > 0 && len <= MAX_BODY_PEEK_BYTES) {
        return (req, credentials);
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_PEEK_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to buffer request body for token extraction: {}", e);
            return (Request::from_parts(parts, Body::empty()), credentials);
        }
    };

    credentials.body_token = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|value| {
            value
                .get(BODY_TOKEN_FIELD)
                .and_then(|t| t.as_str())
                .map(String::from)
        });

    (Request::from_parts(parts, Body::from(bytes)), credentials)
}

async fn finish_require(auth: &Authenticator, req: Request, next: Next) -> Response {
    let (mut req, flow) = auth.process(req).await;
    match flow {
        AuthFlow::Completed { server_id, outcome } if outcome.success => {
            req.extensions_mut().insert(server_id);
            req.extensions_mut().insert(outcome);
            next.run(req).await
        }
        AuthFlow::Completed { server_id, outcome } => {
            debug!(
                server_id = %server_id,
                "Authentication failed: {}",
                outcome.error_message()
            );
            rpc_error_response(StatusCode::UNAUTHORIZED, -32001, outcome.error_message())
        }
        AuthFlow::MissingServerId => {
            rpc_error_response(StatusCode::BAD_REQUEST, -32600, "Missing server identifier")
        }
        AuthFlow::Internal => rpc_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            -32603,
            "Internal authentication error",
        ),
    }
}

/// Middleware: authenticate or reject.
pub async fn require_auth(
    State(auth): State<Arc<Authenticator>>,
    req: Request,
    next: Next,
) -> Response {
    finish_require(&auth, req, next).await
}

/// Middleware: authenticate but never block.
///
/// The outcome, success or failure, is attached to the request for
/// downstream conditional logic.
pub async fn optional_auth(
    State(auth): State<Arc<Authenticator>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut req, flow) = auth.process(req).await;
    match flow {
        AuthFlow::Completed { server_id, outcome } => {
            req.extensions_mut().insert(server_id);
            req.extensions_mut().insert(outcome);
        }
        AuthFlow::MissingServerId => {
            req.extensions_mut()
                .insert(AuthOutcome::denied("Missing server identifier"));
        }
        AuthFlow::Internal => {
            req.extensions_mut()
                .insert(AuthOutcome::denied("Internal authentication error"));
        }
    }
    next.run(req).await
}

type InitFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<Authenticator>> + Send + Sync;

/// Authenticator that builds its data-access dependency on first use
/// rather than at process start.
#[derive(Clone)]
pub struct LazyAuthenticator {
    cell: Arc<OnceCell<Arc<Authenticator>>>,
    init: Arc<InitFn>,
}

impl LazyAuthenticator {
    /// Create a lazy wrapper around an async constructor.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Authenticator>> + Send + 'static,
    {
        Self {
            cell: Arc::new(OnceCell::new()),
            init: Arc::new(move || Box::pin(init())),
        }
    }

    /// The underlying authenticator, constructed on first call.
    pub async fn get(&self) -> anyhow::Result<Arc<Authenticator>> {
        self.cell
            .get_or_try_init(|| async { Ok(Arc::new((self.init)().await?)) })
            .await
            .cloned()
    }
}

/// Middleware: [`require_auth`] over a lazily-constructed authenticator.
pub async fn require_auth_lazy(
    State(lazy): State<LazyAuthenticator>,
    req: Request,
    next: Next,
) -> Response {
    match lazy.get().await {
        Ok(auth) => finish_require(&auth, req, next).await,
        Err(e) => {
            error!("Authenticator initialization failed: {:#}", e);
            rpc_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                -32603,
                "Internal authentication error",
            )
        }
    }
}
