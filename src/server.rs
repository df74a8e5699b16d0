//! HTTP server wiring.
//!
//! Builds the axum router: the protocol endpoints behind the
//! authentication middleware, plus an unauthenticated health probe.

use anyhow::Result;
use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{Authenticator, TokenVerifier, require_auth};
use crate::cache::TtlCache;
use crate::config::GatewayConfig;
use crate::db::Db;
use crate::transport::http::{
    MCP_PATH, MESSAGES_PATH, establish_stream, handle_streamable_request, method_not_allowed,
    plain_error_response, post_session_message,
};
use crate::transport::{GatewayRuntimeFactory, RuntimeFactory, SessionRegistry};

/// Shared state behind every protocol endpoint.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Db,
    pub cache: Arc<TtlCache>,
    pub sessions: Arc<SessionRegistry>,
    pub authenticator: Arc<Authenticator>,
    pub runtime_factory: Arc<dyn RuntimeFactory>,
}

impl GatewayState {
    /// Wire the state over an existing store connection.
    pub fn new(
        db: Db,
        config: GatewayConfig,
        token_verifier: Arc<dyn TokenVerifier>,
        runtime_factory: Arc<dyn RuntimeFactory>,
    ) -> Self {
        let cache = Arc::new(TtlCache::new(&config.cache));
        let authenticator = Arc::new(Authenticator::new(
            db.clone(),
            cache.clone(),
            config,
            token_verifier,
        ));
        Self {
            db,
            cache,
            sessions: Arc::new(SessionRegistry::new()),
            authenticator,
            runtime_factory,
        }
    }

    /// State with the default handshake runtime.
    pub fn with_default_runtime(
        db: Db,
        config: GatewayConfig,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self::new(
            db,
            config,
            token_verifier,
            Arc::new(GatewayRuntimeFactory),
        )
    }
}

/// Build the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    let protocol = Router::new()
        .route(
            MCP_PATH,
            post(handle_streamable_request)
                .get(establish_stream)
                .delete(method_not_allowed),
        )
        .route(MESSAGES_PATH, post(post_session_message))
        .layer(from_fn_with_state(
            state.authenticator.clone(),
            require_auth,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .merge(protocol)
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> axum::response::Response {
    plain_error_response(http::StatusCode::NOT_FOUND, 404, "Not found")
}

/// Bind and serve until the process exits.
pub async fn start_http(state: GatewayState, bind: &str) -> Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("MCP gateway listening on http://{}", bind);
    axum::serve(listener, router).await?;
    Ok(())
}
