//! Session-token verification for the BASE scheme.
//!
//! The gateway's end-user session service issues signed tokens; this module
//! holds the verification contract ([`TokenVerifier`]) and the shipped
//! HS256 implementation. Deployments fronting an external session service
//! implement the trait themselves.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Claims carried by a verified session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session-service user identifier.
    pub id: String,
    /// End-user email the token was issued to.
    pub email: String,
    /// Tenant the session belongs to, if scoped.
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    /// Token identifier, for revocation bookkeeping.
    pub jti: Option<String>,
    /// Expiry (Unix timestamp).
    pub exp: u64,
}

/// Verifies gateway session tokens.
///
/// Returns the decoded claims, or `None` for any invalid, malformed, or
/// expired token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<SessionClaims>;
}

/// HS256 session-token verifier backed by a shared gateway secret.
pub struct SignedTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SignedTokenVerifier {
    /// Create a verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl TokenVerifier for SignedTokenVerifier {
    async fn verify(&self, token: &str) -> Option<SessionClaims> {
        match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(
                    token = %token_fingerprint(token),
                    "Session token rejected: {}",
                    e
                );
                None
            }
        }
    }
}

/// Short SHA-256 fingerprint of a token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..12].to_string()
}
