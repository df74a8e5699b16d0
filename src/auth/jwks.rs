//! JWKS (JSON Web Key Set) fetching, caching, and token verification.
//!
//! Key sets are fetched per provider URL and cached so an unchanging
//! provider costs one network call per TTL window. Verification converts
//! every failure mode (unreachable endpoint, unknown key id, bad
//! signature, expired token) into a [`VerifyOutcome`] with a specific
//! reason string; nothing here can take down the request pipeline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::JwksConfig;

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Maximum stale cache age in seconds (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA")
    pub kty: String,
    /// Key ID (optional, used to match JWT header kid)
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use (e.g., "sig" for signature)
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url encoded)
    pub n: Option<String>,
    /// RSA exponent (base64url encoded)
    pub e: Option<String>,
    /// X.509 certificate chain
    pub x5c: Option<Vec<String>>,
}

/// A JWKS document containing multiple keys.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Cached key set for one provider URL.
struct CachedKeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// Result of verifying a token against a provider's key set.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    /// Whether signature and temporal claims checked out.
    pub valid: bool,
    /// Verified claim set on success.
    pub payload: Option<Value>,
    /// Specific failure reason otherwise.
    pub error: Option<String>,
}

impl VerifyOutcome {
    fn ok(payload: Value) -> Self {
        Self {
            valid: true,
            payload: Some(payload),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Verifies JWTs against dynamically-fetched, cached key sets.
pub struct KeySetVerifier {
    /// Cached keys by provider URL, then by kid.
    cache: RwLock<HashMap<String, CachedKeySet>>,
    /// Cache TTL.
    cache_ttl: Duration,
    /// Whether to serve stale keys when a refresh fails.
    allow_stale: bool,
    /// HTTP client for fetching key sets.
    client: reqwest::Client,
}

impl KeySetVerifier {
    /// Create a verifier with the given fetch policy.
    pub fn new(config: &JwksConfig) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            allow_stale: config.allow_stale,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.fetch_timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Verify a token's signature and temporal claims against the key set
    /// published at `jwks_url`.
    pub async fn verify(&self, token: &str, jwks_url: &str) -> VerifyOutcome {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => return VerifyOutcome::failed(format!("Malformed token: {}", e)),
        };

        let decoding_key = match self.get_key(jwks_url, header.kid.as_deref()).await {
            Ok(key) => key,
            Err(e) => return VerifyOutcome::failed(e.to_string()),
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_nbf = true;

        match decode::<Value>(token, &decoding_key, &validation) {
            Ok(data) => VerifyOutcome::ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => VerifyOutcome::failed("Token expired"),
                ErrorKind::ImmatureSignature => VerifyOutcome::failed("Token not yet valid"),
                ErrorKind::InvalidSignature => VerifyOutcome::failed("Signature mismatch"),
                _ => VerifyOutcome::failed(format!("Token validation failed: {}", e)),
            },
        }
    }

    /// Get a decoding key for `jwks_url` by key ID.
    ///
    /// If `kid` is None, returns the first available key. Fetches from the
    /// endpoint if the cached set is stale or the key is unknown.
    async fn get_key(&self, jwks_url: &str, kid: Option<&str>) -> Result<DecodingKey, KeySetError> {
        let should_refresh = {
            let cache = self.cache.read().await;
            match cache.get(jwks_url) {
                Some(set) => set.fetched_at.elapsed() > self.cache_ttl,
                None => true,
            }
        };

        if !should_refresh {
            if let Some(key) = self.get_from_cache(jwks_url, kid).await {
                return Ok(key);
            }
        }

        match self.fetch_keys(jwks_url).await {
            Ok(()) => self
                .get_from_cache(jwks_url, kid)
                .await
                .ok_or_else(|| match kid {
                    Some(k) => KeySetError::KeyNotFound(k.to_string()),
                    None => KeySetError::NoKeysAvailable,
                }),
            Err(e) => {
                // Fetch failed - try stale cache if allowed
                if self.allow_stale {
                    let cache = self.cache.read().await;
                    let stale_ok = cache.get(jwks_url).is_some_and(|set| {
                        set.fetched_at.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS)
                    });
                    drop(cache);

                    if stale_ok {
                        warn!("JWKS fetch failed, using stale cache: {}", e);
                        if let Some(key) = self.get_from_cache(jwks_url, kid).await {
                            return Ok(key);
                        }
                    }
                }

                Err(e)
            }
        }
    }

    /// Get a key from the cache without fetching.
    async fn get_from_cache(&self, jwks_url: &str, kid: Option<&str>) -> Option<DecodingKey> {
        let cache = self.cache.read().await;
        let set = cache.get(jwks_url)?;

        match kid {
            Some(k) => set.keys.get(k).cloned(),
            None => set.keys.values().next().cloned(),
        }
    }

    /// Fetch and cache the key set published at `jwks_url`.
    pub async fn fetch_keys(&self, jwks_url: &str) -> Result<(), KeySetError> {
        debug!("Fetching JWKS from {}", jwks_url);

        let response = self
            .client
            .get(jwks_url)
            .send()
            .await
            .map_err(|e| KeySetError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::FetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwksDocument = response
            .json()
            .await
            .map_err(|e| KeySetError::ParseError(e.to_string()))?;

        let mut new_keys = HashMap::new();

        for jwk in jwks.keys {
            // Only process RSA keys for now
            if jwk.kty != "RSA" {
                debug!("Skipping non-RSA key: {:?}", jwk.kty);
                continue;
            }

            // Only process signature keys
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key");
                continue;
            }

            match Self::jwk_to_decoding_key(&jwk) {
                Ok(decoding_key) => {
                    let kid = jwk.kid.clone().unwrap_or_else(|| "default".to_string());
                    debug!("Cached key with kid: {}", kid);
                    new_keys.insert(kid, decoding_key);
                }
                Err(e) => {
                    warn!("Failed to parse JWK: {}", e);
                }
            }
        }

        if new_keys.is_empty() {
            return Err(KeySetError::NoValidKeys);
        }

        let key_count = new_keys.len();
        let mut cache = self.cache.write().await;
        cache.insert(
            jwks_url.to_string(),
            CachedKeySet {
                keys: new_keys,
                fetched_at: Instant::now(),
            },
        );

        debug!("Successfully cached {} keys for {}", key_count, jwks_url);
        Ok(())
    }

    /// Convert a JWK to a jsonwebtoken DecodingKey.
    fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, KeySetError> {
        // Try X.509 certificate first
        if let Some(x5c) = &jwk.x5c {
            if let Some(cert) = x5c.first() {
                // x5c carries standard (not URL-safe) base64 DER
                let cert_der = base64::engine::general_purpose::STANDARD
                    .decode(cert)
                    .map_err(|e| KeySetError::ParseError(format!("Invalid x5c: {}", e)))?;

                return Ok(DecodingKey::from_rsa_der(&cert_der));
            }
        }

        // Fall back to n and e (most common case)
        let n = jwk
            .n
            .as_ref()
            .ok_or_else(|| KeySetError::ParseError("Missing 'n' in RSA key".to_string()))?;
        let e = jwk
            .e
            .as_ref()
            .ok_or_else(|| KeySetError::ParseError("Missing 'e' in RSA key".to_string()))?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| KeySetError::ParseError(format!("Invalid RSA components: {}", e)))
    }

    /// Check if a key set for the URL is cached.
    pub async fn has_keys(&self, jwks_url: &str) -> bool {
        let cache = self.cache.read().await;
        cache.get(jwks_url).is_some_and(|set| !set.keys.is_empty())
    }

    /// Drop all cached key sets (useful for testing).
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }
}

/// Errors that can occur when working with key sets.
#[derive(Debug, Clone)]
pub enum KeySetError {
    /// Failed to fetch JWKS from endpoint.
    FetchError(String),
    /// Failed to parse JWKS response.
    ParseError(String),
    /// No valid keys found in JWKS.
    NoValidKeys,
    /// Key with specified kid not found.
    KeyNotFound(String),
    /// No keys available in cache.
    NoKeysAvailable,
}

impl std::fmt::Display for KeySetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::ParseError(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
            Self::NoKeysAvailable => write!(f, "No keys available in cache"),
        }
    }
}

impl std::error::Error for KeySetError {}
