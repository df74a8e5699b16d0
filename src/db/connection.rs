use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "gateway".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "mcp".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    // Use the specified namespace and database
    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    // Define schema for each table
    let schema_queries = vec![
        // Tenant-configured MCP servers
        "DEFINE TABLE server SCHEMAFULL;
         DEFINE FIELD slug ON TABLE server TYPE string;
         DEFINE FIELD name ON TABLE server TYPE option<string>;
         DEFINE FIELD tenant_id ON TABLE server TYPE string;
         DEFINE FIELD auth_type ON TABLE server TYPE option<string>;
         DEFINE FIELD enabled ON TABLE server TYPE bool DEFAULT true;
         DEFINE FIELD created_at ON TABLE server VALUE time::now();
         DEFINE FIELD updated_at ON TABLE server VALUE time::now();",
        // JWT providers referenced by JWT-typed servers
        "DEFINE TABLE jwt_provider SCHEMAFULL;
         DEFINE FIELD server_id ON TABLE jwt_provider TYPE record<server>;
         DEFINE FIELD name ON TABLE jwt_provider TYPE string;
         DEFINE FIELD jwks_url ON TABLE jwt_provider TYPE string;
         DEFINE FIELD enabled ON TABLE jwt_provider TYPE bool DEFAULT true;
         DEFINE FIELD created_at ON TABLE jwt_provider VALUE time::now();
         DEFINE FIELD updated_at ON TABLE jwt_provider VALUE time::now();",
        // Pre-registered end users, scoped by tenant
        "DEFINE TABLE end_user SCHEMAFULL;
         DEFINE FIELD email ON TABLE end_user TYPE string;
         DEFINE FIELD tenant_id ON TABLE end_user TYPE string;
         DEFINE FIELD display_name ON TABLE end_user TYPE option<string>;
         DEFINE FIELD enabled ON TABLE end_user TYPE bool DEFAULT true;
         DEFINE FIELD created_at ON TABLE end_user VALUE time::now();
         DEFINE FIELD updated_at ON TABLE end_user VALUE time::now();",
        // Indexes for the point lookups on the hot path
        "DEFINE INDEX server_slug ON TABLE server COLUMNS slug UNIQUE;
         DEFINE INDEX jwt_provider_server ON TABLE jwt_provider COLUMNS server_id;
         DEFINE INDEX end_user_tenant_email ON TABLE end_user COLUMNS tenant_id, email;",
    ];

    for query in schema_queries {
        db.query(query).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_connection_and_schema() {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();

        // ensure_schema is idempotent
        ensure_schema(&db).await.unwrap();
    }
}
