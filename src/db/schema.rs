use serde::{Deserialize, Serialize};
use std::fmt;
use surrealdb::{RecordId, sql::Datetime};

/// Authentication scheme configured on a server.
///
/// This is a closed set: stored auth-type strings outside it are rejected
/// as a hard configuration failure rather than falling back to an
/// unauthenticated pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerAuthType {
    /// Gateway-issued session token, authorized against pre-registered
    /// end users.
    #[serde(rename = "BASE")]
    Base,
    /// Third-party JWT verified against the server's provider JWKS.
    #[serde(rename = "JWT")]
    Jwt,
}

impl ServerAuthType {
    /// Stored string form of this auth type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::Jwt => "JWT",
        }
    }

    /// Parse a stored auth-type string. Returns `None` for unknown values.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BASE" => Some(Self::Base),
            "JWT" => Some(Self::Jwt),
            _ => None,
        }
    }
}

impl fmt::Display for ServerAuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted representation of a tenant-configured MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Stable database identifier for this server (table: `server`).
    pub id: RecordId,
    /// External slug clients address this server by.
    pub slug: String,
    /// Human-friendly name shown in the admin console.
    pub name: Option<String>,
    /// Tenant that owns this server and its end users.
    pub tenant_id: String,
    /// Configured authentication scheme ("BASE" or "JWT"). Servers created
    /// before auth configuration existed have no value and default to BASE.
    pub auth_type: Option<String>,
    /// Whether this server accepts traffic.
    pub enabled: bool,
    /// When this record was first created.
    pub created_at: Option<Datetime>,
    /// When this record was last updated.
    pub updated_at: Option<Datetime>,
}

/// Payload used when inserting a new server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCreate {
    /// External slug clients address this server by.
    pub slug: String,
    /// Human-friendly name.
    pub name: Option<String>,
    /// Owning tenant.
    pub tenant_id: String,
    /// Configured authentication scheme, if any.
    pub auth_type: Option<String>,
    /// Whether this server accepts traffic.
    pub enabled: bool,
}

/// Persisted representation of a JWT provider attached to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtProviderRecord {
    /// Stable database identifier (table: `jwt_provider`).
    pub id: RecordId,
    /// Server this provider authenticates for.
    pub server_id: RecordId,
    /// Provider display name (e.g. the issuing identity platform).
    pub name: String,
    /// JWKS endpoint the provider publishes its signing keys at.
    pub jwks_url: String,
    /// Whether tokens from this provider are accepted.
    pub enabled: bool,
    /// When this record was first created.
    pub created_at: Option<Datetime>,
    /// When this record was last updated.
    pub updated_at: Option<Datetime>,
}

/// Payload used when inserting a new JWT provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtProviderCreate {
    /// Server this provider authenticates for.
    pub server_id: RecordId,
    /// Provider display name.
    pub name: String,
    /// JWKS endpoint URL.
    pub jwks_url: String,
    /// Whether tokens from this provider are accepted.
    pub enabled: bool,
}

/// Persisted representation of a pre-registered end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndUserRecord {
    /// Stable database identifier (table: `end_user`).
    pub id: RecordId,
    /// Login email, unique within a tenant.
    pub email: String,
    /// Tenant this user belongs to.
    pub tenant_id: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Whether this user may access tenant servers.
    pub enabled: bool,
    /// When this record was first created.
    pub created_at: Option<Datetime>,
    /// When this record was last updated.
    pub updated_at: Option<Datetime>,
}

/// Payload used when inserting a new end user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndUserCreate {
    /// Login email.
    pub email: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Whether this user may access tenant servers.
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_type_parse_known() {
        assert_eq!(ServerAuthType::parse("BASE"), Some(ServerAuthType::Base));
        assert_eq!(ServerAuthType::parse("JWT"), Some(ServerAuthType::Jwt));
    }

    #[test]
    fn test_auth_type_parse_unknown() {
        assert_eq!(ServerAuthType::parse("OAUTH"), None);
        assert_eq!(ServerAuthType::parse("base"), None);
        assert_eq!(ServerAuthType::parse(""), None);
    }

    #[test]
    fn test_auth_type_serde_matches_stored_form() {
        let json = serde_json::to_string(&ServerAuthType::Jwt).unwrap();
        assert_eq!(json, "\"JWT\"");
        let back: ServerAuthType = serde_json::from_str("\"BASE\"").unwrap();
        assert_eq!(back, ServerAuthType::Base);
    }
}
