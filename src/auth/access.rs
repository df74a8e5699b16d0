//! Cache-backed access validation.
//!
//! Decides whether a caller (identified by email) may use a server. Both
//! the server record and the overall decision are cached so repeated checks
//! for the same caller/server pair within the TTL window perform no store
//! lookups at all.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheCategory, TtlCache};
use crate::db::{Db, EndUserRecord, QueryBuilder, ServerRecord};
use crate::types::ServerId;

/// Outcome of an access check. Absence of both fields signals success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessDecision {
    /// The caller's email matched no end user in the server's tenant.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub user_not_found: bool,
    /// The server was invalid or the caller's access is insufficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessDecision {
    /// Successful check.
    pub fn ok() -> Self {
        Self::default()
    }

    /// The caller's email is not registered for this tenant.
    pub fn not_found() -> Self {
        Self {
            user_not_found: true,
            error: None,
        }
    }

    /// The check failed with a reason.
    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            user_not_found: false,
            error: Some(error.into()),
        }
    }

    /// Whether the check passed.
    pub fn is_ok(&self) -> bool {
        !self.user_not_found && self.error.is_none()
    }
}

/// Validates caller access to servers, with cache-backed lookups.
pub struct AccessValidator {
    db: Db,
    cache: Arc<TtlCache>,
}

impl AccessValidator {
    /// Create a new validator over the given store and cache.
    pub fn new(db: Db, cache: Arc<TtlCache>) -> Self {
        Self { db, cache }
    }

    /// Look up a server by its external id, through the cache.
    ///
    /// Negative results are cached too, so a burst of requests for an
    /// unknown slug does not hammer the store.
    pub async fn lookup_server(&self, server_id: &ServerId) -> Result<Option<ServerRecord>> {
        if let Some(cached) = self
            .cache
            .get_as::<Option<ServerRecord>>(CacheCategory::Server, &[server_id.as_str()])
        {
            return Ok(cached);
        }

        let server = QueryBuilder::find_server_by_slug(&self.db, server_id.as_str()).await?;
        self.cache
            .insert(CacheCategory::Server, &[server_id.as_str()], &server);
        Ok(server)
    }

    /// Check whether `email` may use `server_id`.
    ///
    /// The server is validated first so an invalid server never costs a
    /// user query. The overall decision is cached under
    /// (server id, email); concurrent misses for the same pair are not
    /// deduplicated.
    pub async fn validate_access(&self, server_id: &ServerId, email: &str) -> Result<AccessDecision> {
        let key = [server_id.as_str(), email];
        if let Some(cached) = self
            .cache
            .get_as::<AccessDecision>(CacheCategory::ServerAccess, &key)
        {
            debug!(server_id = %server_id, "Access decision served from cache");
            return Ok(cached);
        }

        let decision = self.compute_access(server_id, email).await?;
        self.cache
            .insert(CacheCategory::ServerAccess, &key, &decision);
        Ok(decision)
    }

    async fn compute_access(&self, server_id: &ServerId, email: &str) -> Result<AccessDecision> {
        let server = match self.lookup_server(server_id).await? {
            Some(server) if server.enabled => server,
            _ => {
                return Ok(AccessDecision::denied(format!(
                    "Invalid or disabled server: {}",
                    server_id
                )));
            }
        };

        let user =
            QueryBuilder::find_end_user_by_email(&self.db, &server.tenant_id, email).await?;

        match user {
            None => Ok(AccessDecision::not_found()),
            Some(user) if !user.enabled => Ok(AccessDecision::denied(format!(
                "Insufficient access to server {}",
                server_id
            ))),
            Some(_) => Ok(AccessDecision::ok()),
        }
    }

    /// Look up the end-user record for `email` in the server's tenant.
    ///
    /// Used after a successful access check to populate the caller context.
    /// Not cached: it runs once per authenticated request.
    pub async fn lookup_user(
        &self,
        server_id: &ServerId,
        email: &str,
    ) -> Result<Option<EndUserRecord>> {
        let Some(server) = self.lookup_server(server_id).await? else {
            return Ok(None);
        };
        QueryBuilder::find_end_user_by_email(&self.db, &server.tenant_id, email).await
    }

    /// Drop all cached state for one server: its record and every access
    /// decision under it. Called by admin tooling after mutating records.
    pub fn invalidate_server(&self, server_id: &ServerId) {
        self.cache
            .invalidate(CacheCategory::Server, &[server_id.as_str()]);
        self.cache
            .invalidate_prefix(CacheCategory::ServerAccess, &[server_id.as_str()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::db::{
        DatabaseConfig, EndUserCreate, ServerCreate, create_connection, ensure_schema,
    };

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    async fn seed_server(db: &Db, slug: &str, enabled: bool) {
        QueryBuilder::create_server(
            db,
            &ServerCreate {
                slug: slug.to_string(),
                name: None,
                tenant_id: "t1".to_string(),
                auth_type: Some("BASE".to_string()),
                enabled,
            },
        )
        .await
        .unwrap();
    }

    async fn seed_user(db: &Db, email: &str, enabled: bool) {
        QueryBuilder::create_end_user(
            db,
            &EndUserCreate {
                email: email.to_string(),
                tenant_id: "t1".to_string(),
                display_name: None,
                enabled,
            },
        )
        .await
        .unwrap();
    }

    fn validator(db: Db, config: &CacheConfig) -> AccessValidator {
        AccessValidator::new(db, Arc::new(TtlCache::new(config)))
    }

    #[tokio::test]
    async fn test_access_granted() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", true).await;
        seed_user(&db, "a@x.com", true).await;

        let validator = validator(db, &CacheConfig::default());
        let decision = validator
            .validate_access(&ServerId::new("s1"), "a@x.com")
            .await
            .unwrap();
        assert!(decision.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_server_short_circuits() {
        let db = setup_test_db().await;
        let validator = validator(db, &CacheConfig::default());

        let decision = validator
            .validate_access(&ServerId::new("nope"), "a@x.com")
            .await
            .unwrap();
        assert!(!decision.is_ok());
        assert!(decision.error.unwrap().contains("nope"));
        assert!(!decision.user_not_found);
    }

    #[tokio::test]
    async fn test_disabled_server_is_invalid() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", false).await;
        seed_user(&db, "a@x.com", true).await;

        let validator = validator(db, &CacheConfig::default());
        let decision = validator
            .validate_access(&ServerId::new("s1"), "a@x.com")
            .await
            .unwrap();
        assert!(decision.error.unwrap().contains("Invalid or disabled"));
    }

    #[tokio::test]
    async fn test_unknown_user_reports_not_found() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", true).await;

        let validator = validator(db, &CacheConfig::default());
        let decision = validator
            .validate_access(&ServerId::new("s1"), "ghost@x.com")
            .await
            .unwrap();
        assert!(decision.user_not_found);
        assert!(decision.error.is_none());
    }

    #[tokio::test]
    async fn test_disabled_user_is_insufficient() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", true).await;
        seed_user(&db, "a@x.com", false).await;

        let validator = validator(db, &CacheConfig::default());
        let decision = validator
            .validate_access(&ServerId::new("s1"), "a@x.com")
            .await
            .unwrap();
        assert!(decision.error.unwrap().contains("Insufficient access"));
    }

    #[tokio::test]
    async fn test_second_check_is_a_pure_cache_hit() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", true).await;
        seed_user(&db, "a@x.com", true).await;

        let validator = validator(db.clone(), &CacheConfig::default());
        let first = validator
            .validate_access(&ServerId::new("s1"), "a@x.com")
            .await
            .unwrap();
        assert!(first.is_ok());

        // Disable the user behind the cache's back; within the TTL window
        // the second check must not touch the store.
        QueryBuilder::set_end_user_enabled(&db, "t1", "a@x.com", false)
            .await
            .unwrap();

        let second = validator
            .validate_access(&ServerId::new("s1"), "a@x.com")
            .await
            .unwrap();
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_expired_ttl_reexecutes_lookup() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", true).await;
        seed_user(&db, "a@x.com", true).await;

        let config = CacheConfig {
            server_ttl_seconds: 0,
            access_ttl_seconds: 0,
        };
        let validator = validator(db.clone(), &config);

        assert!(
            validator
                .validate_access(&ServerId::new("s1"), "a@x.com")
                .await
                .unwrap()
                .is_ok()
        );

        QueryBuilder::set_end_user_enabled(&db, "t1", "a@x.com", false)
            .await
            .unwrap();

        // Zero TTL: every entry is expired by the next read.
        let second = validator
            .validate_access(&ServerId::new("s1"), "a@x.com")
            .await
            .unwrap();
        assert!(!second.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_server_drops_cached_state() {
        let db = setup_test_db().await;
        seed_server(&db, "s1", true).await;
        seed_user(&db, "a@x.com", true).await;

        let validator = validator(db.clone(), &CacheConfig::default());
        let server_id = ServerId::new("s1");
        assert!(
            validator
                .validate_access(&server_id, "a@x.com")
                .await
                .unwrap()
                .is_ok()
        );

        QueryBuilder::set_end_user_enabled(&db, "t1", "a@x.com", false)
            .await
            .unwrap();
        validator.invalidate_server(&server_id);

        let decision = validator
            .validate_access(&server_id, "a@x.com")
            .await
            .unwrap();
        assert!(!decision.is_ok());
    }

    #[tokio::test]
    async fn test_negative_server_lookup_is_cached() {
        let db = setup_test_db().await;
        let validator = validator(db.clone(), &CacheConfig::default());
        let server_id = ServerId::new("late");

        assert!(validator.lookup_server(&server_id).await.unwrap().is_none());

        // The server appears after the negative result was cached; the
        // cached miss holds until TTL or invalidation.
        seed_server(&db, "late", true).await;
        assert!(validator.lookup_server(&server_id).await.unwrap().is_none());

        validator.invalidate_server(&server_id);
        assert!(validator.lookup_server(&server_id).await.unwrap().is_some());
    }
}
