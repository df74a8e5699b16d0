//! Gateway configuration.
//!
//! All knobs have environment-variable defaults so a bare `serve` works for
//! local development, while deployments override through `GATEWAY_*`.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default TTL for cached server records (seconds).
pub const DEFAULT_SERVER_TTL_SECONDS: u64 = 120;

/// Default TTL for cached access-check results (seconds).
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 300;

/// Default TTL for cached JWKS documents (seconds).
pub const DEFAULT_JWKS_TTL_SECONDS: u64 = 3600;

/// Default timeout for JWKS endpoint fetches (seconds).
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base domain used to derive a server id from the request subdomain
    /// (e.g. `mcp.example.com` makes `acme.mcp.example.com` resolve to
    /// server `acme`). When unset, subdomain resolution is disabled.
    pub base_domain: Option<String>,
    /// Fixed server id override for local development. Takes precedence
    /// over both the query parameter and the subdomain.
    pub server_id_override: Option<String>,
    /// Secret used to verify gateway-issued session tokens (BASE scheme).
    pub session_token_secret: Option<String>,
    /// Cache TTLs for the access-validation layer.
    #[serde(default)]
    pub cache: CacheConfig,
    /// JWKS fetching policy for the JWT scheme.
    #[serde(default)]
    pub jwks: JwksConfig,
}

/// TTLs for the access-validation cache categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached server records (seconds).
    #[serde(default = "default_server_ttl")]
    pub server_ttl_seconds: u64,
    /// TTL for cached access-check outcomes (seconds).
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: u64,
}

/// JWKS fetch and cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksConfig {
    /// TTL for cached key sets (seconds).
    #[serde(default = "default_jwks_ttl")]
    pub cache_ttl_seconds: u64,
    /// Timeout applied to JWKS endpoint fetches (seconds). An unresponsive
    /// provider must not stall every request authenticating against it.
    #[serde(default = "default_jwks_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Whether to serve stale cached keys when a refresh fails.
    #[serde(default = "default_allow_stale")]
    pub allow_stale: bool,
}

fn default_server_ttl() -> u64 {
    DEFAULT_SERVER_TTL_SECONDS
}

fn default_access_ttl() -> u64 {
    DEFAULT_ACCESS_TTL_SECONDS
}

fn default_jwks_ttl() -> u64 {
    DEFAULT_JWKS_TTL_SECONDS
}

fn default_jwks_fetch_timeout() -> u64 {
    DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS
}

fn default_allow_stale() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            server_ttl_seconds: DEFAULT_SERVER_TTL_SECONDS,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    /// TTL for cached server records.
    pub fn server_ttl(&self) -> Duration {
        Duration::from_secs(self.server_ttl_seconds)
    }

    /// TTL for cached access-check outcomes.
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_seconds)
    }
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: DEFAULT_JWKS_TTL_SECONDS,
            fetch_timeout_seconds: DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            allow_stale: true,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_domain: env::var("GATEWAY_BASE_DOMAIN").ok(),
            server_id_override: env::var("GATEWAY_SERVER_ID").ok(),
            session_token_secret: env::var("GATEWAY_SESSION_SECRET").ok(),
            cache: CacheConfig::default(),
            jwks: JwksConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a config for local development pinned to a single server id.
    pub fn local(server_id: impl Into<String>) -> Self {
        Self {
            base_domain: None,
            server_id_override: Some(server_id.into()),
            session_token_secret: None,
            cache: CacheConfig::default(),
            jwks: JwksConfig::default(),
        }
    }

    /// Create a config that resolves server ids from subdomains of `domain`.
    pub fn with_base_domain(domain: impl Into<String>) -> Self {
        Self {
            base_domain: Some(domain.into()),
            server_id_override: None,
            session_token_secret: None,
            cache: CacheConfig::default(),
            jwks: JwksConfig::default(),
        }
    }
}
