//! Server authentication.
//!
//! Every protocol request is authenticated against the addressed server's
//! configured scheme before any transport is established:
//!
//! - **BASE**: the bearer token is a gateway-issued session token; the
//!   caller must be a pre-registered, enabled end user of the server's
//!   tenant.
//! - **JWT**: the bearer token is a third-party JWT verified against the
//!   JWKS published by the server's enabled provider.
//!
//! ## Security model
//!
//! - The set of schemes is closed: an unknown stored auth type is a hard
//!   configuration failure, never an unauthenticated pass-through.
//! - Expected authentication failures are returned as data
//!   ([`AuthOutcome`]) so the middleware maps them uniformly to 401.
//! - Raw credentials never reach the logs; tokens are reduced to a SHA-256
//!   fingerprint first.
//!
//! ## Usage
//!
//! ```ignore
//! let authenticator = Arc::new(Authenticator::new(db, cache, config, verifier));
//! let router = Router::new()
//!     .route("/api/mcp", post(handler))
//!     .layer(middleware::from_fn_with_state(authenticator, require_auth));
//! ```

mod access;
mod base;
mod context;
pub mod jwks;
pub(crate) mod jwt;
mod middleware;
mod strategy;
mod token;

pub use access::{AccessDecision, AccessValidator};
pub use base::BaseStrategy;
pub use context::{AuthMetadata, AuthOutcome, AuthUser};
pub use jwks::{KeySetError, KeySetVerifier, VerifyOutcome};
pub use jwt::JwtStrategy;
pub use middleware::{Authenticator, LazyAuthenticator, optional_auth, require_auth, require_auth_lazy};
pub use strategy::{AuthRequest, AuthStrategy, StrategyResolver, UnsupportedStrategy};
pub use token::{SessionClaims, SignedTokenVerifier, TokenVerifier, token_fingerprint};
