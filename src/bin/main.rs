use anyhow::Result;
use clap::{Parser, Subcommand};
use mcp_gateway::db::{EndUserCreate, JwtProviderCreate, QueryBuilder, ServerCreate};
use mcp_gateway::{DatabaseConfig, GatewayConfig, create_gateway};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-gateway")]
#[command(about = "Multi-tenant MCP gateway with pluggable server authentication")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:3920
        #[arg(long, default_value = "0.0.0.0:3920")]
        bind: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Base domain for subdomain server resolution
        #[arg(long, env = "GATEWAY_BASE_DOMAIN")]
        base_domain: Option<String>,
        /// Fixed server id override for local development
        #[arg(long, env = "GATEWAY_SERVER_ID")]
        server_id: Option<String>,
        /// Secret for verifying gateway session tokens
        #[arg(long, env = "GATEWAY_SESSION_SECRET")]
        session_secret: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Create a server record
    CreateServer {
        /// External slug clients address the server by
        slug: String,
        /// Owning tenant id
        #[arg(long)]
        tenant: String,
        /// Human-readable name
        #[arg(long)]
        name: Option<String>,
        /// Authentication type (BASE or JWT)
        #[arg(long, default_value = "BASE")]
        auth_type: String,
        /// Create the server disabled
        #[arg(long, default_value_t = false)]
        disabled: bool,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Attach a JWT provider to a server
    CreateProvider {
        /// Slug of the server the provider authenticates for
        server: String,
        /// Provider display name
        #[arg(long)]
        name: String,
        /// JWKS endpoint URL
        #[arg(long)]
        jwks_url: String,
        /// Create the provider disabled
        #[arg(long, default_value_t = false)]
        disabled: bool,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Register an end user for a tenant
    CreateUser {
        /// Login email
        email: String,
        /// Owning tenant id
        #[arg(long)]
        tenant: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Create the user disabled
        #[arg(long, default_value_t = false)]
        disabled: bool,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Enable or disable an end user
    SetUserEnabled {
        /// Login email
        email: String,
        /// Owning tenant id
        #[arg(long)]
        tenant: String,
        /// New enabled state (true or false)
        enabled: bool,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Check a JWKS URL the way the JWT scheme will use it
    TestJwks {
        /// JWKS endpoint URL to probe
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mcp_gateway=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            base_domain,
            server_id,
            session_secret,
        } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url: {}", db_config.url);

            let config = GatewayConfig {
                base_domain,
                server_id_override: server_id,
                session_token_secret: session_secret,
                ..Default::default()
            };

            if config.base_domain.is_none() && config.server_id_override.is_none() {
                tracing::warn!(
                    "No base domain or server id override configured - requests must carry a serverId query parameter"
                );
            }

            let state = create_gateway(db_config, config).await?;
            mcp_gateway::start_http(state, &bind).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = mcp_gateway::create_connection(db_config).await?;
            mcp_gateway::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateServer {
            slug,
            tenant,
            name,
            auth_type,
            disabled,
            db_url,
        } => {
            if mcp_gateway::db::ServerAuthType::parse(&auth_type).is_none() {
                anyhow::bail!("unsupported auth type '{}' (expected BASE or JWT)", auth_type);
            }

            let db = connect(&db_url).await?;
            let server = QueryBuilder::create_server(
                &db,
                &ServerCreate {
                    slug: slug.clone(),
                    name,
                    tenant_id: tenant,
                    auth_type: Some(auth_type),
                    enabled: !disabled,
                },
            )
            .await?;

            println!("Server created:");
            println!("  Slug:    {}", server.slug);
            println!("  Tenant:  {}", server.tenant_id);
            println!("  Auth:    {}", server.auth_type.as_deref().unwrap_or("BASE"));
            println!("  Enabled: {}", server.enabled);
        }
        Commands::CreateProvider {
            server,
            name,
            jwks_url,
            disabled,
            db_url,
        } => {
            let db = connect(&db_url).await?;
            let server_record = QueryBuilder::find_server_by_slug(&db, &server)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no server with slug '{}'", server))?;

            let provider = QueryBuilder::create_jwt_provider(
                &db,
                &JwtProviderCreate {
                    server_id: server_record.id,
                    name,
                    jwks_url,
                    enabled: !disabled,
                },
            )
            .await?;

            println!("Provider created:");
            println!("  Name:    {}", provider.name);
            println!("  Server:  {}", server);
            println!("  JWKS:    {}", provider.jwks_url);
            println!("  Enabled: {}", provider.enabled);
        }
        Commands::CreateUser {
            email,
            tenant,
            name,
            disabled,
            db_url,
        } => {
            let db = connect(&db_url).await?;
            let user = QueryBuilder::create_end_user(
                &db,
                &EndUserCreate {
                    email,
                    tenant_id: tenant,
                    display_name: name,
                    enabled: !disabled,
                },
            )
            .await?;

            println!("User created:");
            println!("  Email:   {}", user.email);
            println!("  Tenant:  {}", user.tenant_id);
            println!("  Enabled: {}", user.enabled);
        }
        Commands::SetUserEnabled {
            email,
            tenant,
            enabled,
            db_url,
        } => {
            let db = connect(&db_url).await?;
            let updated = QueryBuilder::set_end_user_enabled(&db, &tenant, &email, enabled).await?;

            if updated {
                println!(
                    "User '{}' in tenant '{}' is now {}.",
                    email,
                    tenant,
                    if enabled { "enabled" } else { "disabled" }
                );
            } else {
                println!("No user '{}' found in tenant '{}'.", email, tenant);
            }
        }
        Commands::TestJwks { url } => {
            use mcp_gateway::auth::{AccessValidator, JwtStrategy, KeySetVerifier};
            use mcp_gateway::{CacheConfig, JwksConfig, TtlCache};
            use std::sync::Arc;

            // Run the same configuration check the JWT scheme applies.
            let db = connect("memory").await?;
            let cache = Arc::new(TtlCache::new(&CacheConfig::default()));
            let validator = Arc::new(AccessValidator::new(db.clone(), cache));
            let keys = Arc::new(KeySetVerifier::new(&JwksConfig::default()));
            let strategy = JwtStrategy::new(db, validator, keys);

            let errors = strategy.validate_configuration(&url).await;

            if errors.is_empty() {
                println!("JWKS URL OK: {}", url);
            } else {
                println!("JWKS URL has problems:");
                for error in &errors {
                    println!("  - {}", error);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn connect(db_url: &str) -> Result<mcp_gateway::db::Db> {
    let db_config = DatabaseConfig {
        url: db_url.to_string(),
        ..Default::default()
    };
    let db = mcp_gateway::create_connection(db_config).await?;
    mcp_gateway::ensure_schema(&db).await?;
    Ok(db)
}
