// Core modules
mod cache;
mod config;
pub mod db;
mod types;

// Authentication and delivery
pub mod auth;
pub mod server;
pub mod transport;

// Re-export key types and functions
pub use cache::{CacheCategory, TtlCache};
pub use config::{CacheConfig, GatewayConfig, JwksConfig};
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use types::{ProviderId, ServerId, SessionId, TenantId};

pub use auth::{Authenticator, LazyAuthenticator, SignedTokenVerifier, TokenVerifier};
pub use server::{GatewayState, build_router, start_http};

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Convenience function to create a fully wired gateway.
///
/// Connects to the store, ensures the schema, and assembles the
/// authentication stack with the default handshake runtime.
pub async fn create_gateway(
    db_config: DatabaseConfig,
    config: GatewayConfig,
) -> Result<GatewayState> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let secret = match &config.session_token_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!(
                "GATEWAY_SESSION_SECRET not set; session tokens will not verify on this instance"
            );
            uuid::Uuid::new_v4().to_string()
        }
    };
    let token_verifier: Arc<dyn TokenVerifier> = Arc::new(SignedTokenVerifier::new(&secret));

    Ok(GatewayState::with_default_runtime(db, config, token_verifier))
}
