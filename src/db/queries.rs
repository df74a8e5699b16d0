// Database query helpers for SurrealDB.
//
// The authentication subsystem only ever reads through these paths; the
// create/update helpers exist for the admin CLI and tests.

use crate::db::schema::*;
use anyhow::{Result, anyhow};
use surrealdb::{RecordId, Surreal, engine::any::Any};

pub struct QueryBuilder;

impl QueryBuilder {
    /// Find a server by its external slug.
    pub async fn find_server_by_slug(
        db: &Surreal<Any>,
        slug: &str,
    ) -> Result<Option<ServerRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM server
                WHERE slug = $slug
                LIMIT 1
                "#,
            )
            .bind(("slug", slug.to_string()))
            .await?;

        let server: Option<ServerRecord> = res.take(0)?;
        Ok(server)
    }

    /// Find the JWT provider configured for a server.
    ///
    /// Returns the record regardless of its enabled flag so callers can
    /// report "provider disabled" distinctly from "no provider configured".
    pub async fn find_provider_for_server(
        db: &Surreal<Any>,
        server_id: &RecordId,
    ) -> Result<Option<JwtProviderRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM jwt_provider
                WHERE server_id = $server_id
                LIMIT 1
                "#,
            )
            .bind(("server_id", server_id.clone()))
            .await?;

        let provider: Option<JwtProviderRecord> = res.take(0)?;
        Ok(provider)
    }

    /// Find an end user by email, scoped to a tenant.
    pub async fn find_end_user_by_email(
        db: &Surreal<Any>,
        tenant_id: &str,
        email: &str,
    ) -> Result<Option<EndUserRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM end_user
                WHERE tenant_id = $tenant_id
                  AND email = $email
                LIMIT 1
                "#,
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("email", email.to_string()))
            .await?;

        let user: Option<EndUserRecord> = res.take(0)?;
        Ok(user)
    }

    /// Create a new server record.
    pub async fn create_server(db: &Surreal<Any>, data: &ServerCreate) -> Result<ServerRecord> {
        let mut res = db
            .query(
                r#"
                CREATE server SET
                    slug = $slug,
                    name = $name,
                    tenant_id = $tenant_id,
                    auth_type = $auth_type,
                    enabled = $enabled,
                    created_at = time::now(),
                    updated_at = time::now()
                "#,
            )
            .bind(("slug", data.slug.clone()))
            .bind(("name", data.name.clone()))
            .bind(("tenant_id", data.tenant_id.clone()))
            .bind(("auth_type", data.auth_type.clone()))
            .bind(("enabled", data.enabled))
            .await?;

        let created: Option<ServerRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create server record"))
    }

    /// Create a new JWT provider record.
    pub async fn create_jwt_provider(
        db: &Surreal<Any>,
        data: &JwtProviderCreate,
    ) -> Result<JwtProviderRecord> {
        let mut res = db
            .query(
                r#"
                CREATE jwt_provider SET
                    server_id = $server_id,
                    name = $name,
                    jwks_url = $jwks_url,
                    enabled = $enabled,
                    created_at = time::now(),
                    updated_at = time::now()
                "#,
            )
            .bind(("server_id", data.server_id.clone()))
            .bind(("name", data.name.clone()))
            .bind(("jwks_url", data.jwks_url.clone()))
            .bind(("enabled", data.enabled))
            .await?;

        let created: Option<JwtProviderRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create jwt provider record"))
    }

    /// Create a new end-user record.
    pub async fn create_end_user(db: &Surreal<Any>, data: &EndUserCreate) -> Result<EndUserRecord> {
        let mut res = db
            .query(
                r#"
                CREATE end_user SET
                    email = $email,
                    tenant_id = $tenant_id,
                    display_name = $display_name,
                    enabled = $enabled,
                    created_at = time::now(),
                    updated_at = time::now()
                "#,
            )
            .bind(("email", data.email.clone()))
            .bind(("tenant_id", data.tenant_id.clone()))
            .bind(("display_name", data.display_name.clone()))
            .bind(("enabled", data.enabled))
            .await?;

        let created: Option<EndUserRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create end user record"))
    }

    /// Enable or disable an end user by tenant and email.
    ///
    /// Returns whether a matching user existed.
    pub async fn set_end_user_enabled(
        db: &Surreal<Any>,
        tenant_id: &str,
        email: &str,
        enabled: bool,
    ) -> Result<bool> {
        let mut res = db
            .query(
                r#"
                UPDATE end_user SET
                    enabled = $enabled,
                    updated_at = time::now()
                WHERE tenant_id = $tenant_id
                  AND email = $email
                "#,
            )
            .bind(("enabled", enabled))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("email", email.to_string()))
            .await?;

        let updated: Vec<EndUserRecord> = res.take(0)?;
        Ok(!updated.is_empty())
    }

    /// Enable or disable a server by slug. Returns whether it existed.
    pub async fn set_server_enabled(
        db: &Surreal<Any>,
        slug: &str,
        enabled: bool,
    ) -> Result<bool> {
        let mut res = db
            .query(
                r#"
                UPDATE server SET
                    enabled = $enabled,
                    updated_at = time::now()
                WHERE slug = $slug
                "#,
            )
            .bind(("enabled", enabled))
            .bind(("slug", slug.to_string()))
            .await?;

        let updated: Vec<ServerRecord> = res.take(0)?;
        Ok(!updated.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    async fn setup_test_db() -> crate::db::Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_find_server() {
        let db = setup_test_db().await;

        let created = QueryBuilder::create_server(
            &db,
            &ServerCreate {
                slug: "acme".to_string(),
                name: Some("Acme CRM".to_string()),
                tenant_id: "t1".to_string(),
                auth_type: Some("BASE".to_string()),
                enabled: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(created.slug, "acme");

        let found = QueryBuilder::find_server_by_slug(&db, "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.tenant_id, "t1");
        assert_eq!(found.auth_type.as_deref(), Some("BASE"));
        assert!(found.enabled);

        assert!(
            QueryBuilder::find_server_by_slug(&db, "unknown")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_provider_lookup_includes_disabled() {
        let db = setup_test_db().await;

        let server = QueryBuilder::create_server(
            &db,
            &ServerCreate {
                slug: "s2".to_string(),
                name: None,
                tenant_id: "t1".to_string(),
                auth_type: Some("JWT".to_string()),
                enabled: true,
            },
        )
        .await
        .unwrap();

        QueryBuilder::create_jwt_provider(
            &db,
            &JwtProviderCreate {
                server_id: server.id.clone(),
                name: "issuer".to_string(),
                jwks_url: "https://issuer.example/.well-known/jwks.json".to_string(),
                enabled: false,
            },
        )
        .await
        .unwrap();

        let provider = QueryBuilder::find_provider_for_server(&db, &server.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!provider.enabled);
    }

    #[tokio::test]
    async fn test_end_user_lookup_is_tenant_scoped() {
        let db = setup_test_db().await;

        QueryBuilder::create_end_user(
            &db,
            &EndUserCreate {
                email: "a@x.com".to_string(),
                tenant_id: "t1".to_string(),
                display_name: None,
                enabled: true,
            },
        )
        .await
        .unwrap();

        assert!(
            QueryBuilder::find_end_user_by_email(&db, "t1", "a@x.com")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            QueryBuilder::find_end_user_by_email(&db, "t2", "a@x.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_set_end_user_enabled() {
        let db = setup_test_db().await;

        QueryBuilder::create_end_user(
            &db,
            &EndUserCreate {
                email: "a@x.com".to_string(),
                tenant_id: "t1".to_string(),
                display_name: None,
                enabled: true,
            },
        )
        .await
        .unwrap();

        assert!(
            QueryBuilder::set_end_user_enabled(&db, "t1", "a@x.com", false)
                .await
                .unwrap()
        );
        let user = QueryBuilder::find_end_user_by_email(&db, "t1", "a@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!user.enabled);

        assert!(
            !QueryBuilder::set_end_user_enabled(&db, "t1", "nobody@x.com", false)
                .await
                .unwrap()
        );
    }
}
