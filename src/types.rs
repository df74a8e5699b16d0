//! NewType wrappers for strong typing throughout the gateway.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a tenant id where a server id is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// External identifier of a tenant-configured MCP server.
    ///
    /// This is the slug clients address the server by (subdomain label,
    /// `serverId` query parameter). It is distinct from the database record
    /// id of the `server` table row.
    ServerId
);

newtype_string!(
    /// Identifier of the tenant that owns a server and its end users.
    ///
    /// End-user lookups are always scoped by tenant so that the same email
    /// can exist under different tenants without colliding.
    TenantId
);

newtype_string!(
    /// Identifier of a streaming transport session.
    ///
    /// Generated when a streaming connection is established and used by the
    /// client to address follow-up messages. Lives only in process memory.
    SessionId
);

newtype_string!(
    /// Database-facing identifier of a JWT provider record.
    ProviderId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtype_roundtrip() {
        let id = ServerId::new("acme");
        assert_eq!(id.as_str(), "acme");
        assert_eq!(id.to_string(), "acme");
        assert_eq!(ServerId::from("acme"), id);
        assert_eq!(id.clone().into_inner(), "acme");
    }

    #[test]
    fn test_newtype_serde_transparent() {
        let id = TenantId::new("t1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t1\"");
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_distinct_types_do_not_compare() {
        // Compile-time property: ServerId and TenantId are different types.
        let server = ServerId::new("x");
        let tenant = TenantId::new("x");
        assert_eq!(server.as_str(), tenant.as_str());
    }
}
