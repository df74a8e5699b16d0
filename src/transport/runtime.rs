//! Protocol-runtime seam between the transports and the MCP layer.
//!
//! Transports deliver raw JSON-RPC messages to a [`ProtocolRuntime`] and
//! relay whatever it returns. The default [`GatewayRuntime`] answers the
//! protocol handshake (`initialize`, `ping`); tool listing and execution
//! belong to the tool-execution layer that plugs in through the same
//! trait.

use async_trait::async_trait;
use rmcp::model::{
    ErrorCode, ErrorData, Implementation, InitializeResult, ProtocolVersion, ServerCapabilities,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::AuthUser;

/// Handles protocol messages for one connection or request.
#[async_trait]
pub trait ProtocolRuntime: Send + Sync {
    /// Handle one client message. `None` means the message was a
    /// notification and produced no response.
    ///
    /// # Errors
    ///
    /// Only for broken runtime state (e.g. already closed); protocol-level
    /// problems are returned as JSON-RPC error envelopes.
    async fn handle_message(&self, message: Value) -> anyhow::Result<Option<Value>>;

    /// Release the runtime's resources. Idempotent; synchronous so
    /// connection-close hooks can call it without an executor.
    fn close(&self);

    /// Whether [`close`](Self::close) has run.
    fn is_closed(&self) -> bool;
}

/// Creates a runtime per connection or request.
pub trait RuntimeFactory: Send + Sync {
    /// Build a runtime bound to the authenticated caller, if any.
    fn create(&self, user: Option<AuthUser>) -> Arc<dyn ProtocolRuntime>;
}

/// Default runtime: answers the MCP handshake and rejects other methods.
pub struct GatewayRuntime {
    user: Option<AuthUser>,
    closed: AtomicBool,
}

impl GatewayRuntime {
    /// Create a runtime for the given caller.
    pub fn new(user: Option<AuthUser>) -> Self {
        Self {
            user,
            closed: AtomicBool::new(false),
        }
    }

    /// The caller this runtime serves.
    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    fn initialize_result() -> InitializeResult {
        InitializeResult {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Gateway endpoint for a tenant-configured MCP server. \
                 Authenticate with a bearer credential accepted by the \
                 server's configured scheme."
                    .to_string(),
            ),
        }
    }
}

/// Wrap a result in a JSON-RPC response envelope.
pub fn result_envelope(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Wrap an error in a JSON-RPC response envelope.
pub fn error_envelope(id: Value, error: &ErrorData) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": serde_json::to_value(error).unwrap_or_else(|_| json!({
            "code": -32603,
            "message": "Internal error",
        })),
    })
}

#[async_trait]
impl ProtocolRuntime for GatewayRuntime {
    async fn handle_message(&self, message: Value) -> anyhow::Result<Option<Value>> {
        if self.is_closed() {
            anyhow::bail!("runtime is closed");
        }

        let method = message
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        let id = message.get("id").cloned();

        // Requests carry an id; notifications do not and get no response.
        let Some(id) = id else {
            return Ok(None);
        };

        let response = match method.as_str() {
            "initialize" => {
                let result = serde_json::to_value(Self::initialize_result())?;
                result_envelope(id, result)
            }
            "ping" => result_envelope(id, json!({})),
            other => error_envelope(
                id,
                &ErrorData::new(
                    ErrorCode(-32601),
                    format!("Method not found: {}", other),
                    None,
                ),
            ),
        };

        Ok(Some(response))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory producing [`GatewayRuntime`] instances.
#[derive(Default)]
pub struct GatewayRuntimeFactory;

impl RuntimeFactory for GatewayRuntimeFactory {
    fn create(&self, user: Option<AuthUser>) -> Arc<dyn ProtocolRuntime> {
        Arc::new(GatewayRuntime::new(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_handshake() {
        let runtime = GatewayRuntime::new(None);
        let response = runtime
            .handle_message(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {"protocolVersion": "2025-06-18", "capabilities": {}},
            }))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        assert!(response["result"]["capabilities"].is_object());
        assert!(response["result"]["protocolVersion"].is_string());
    }

    #[tokio::test]
    async fn test_ping_returns_empty_result() {
        let runtime = GatewayRuntime::new(None);
        let response = runtime
            .handle_message(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_unknown_method_gets_error_envelope() {
        let runtime = GatewayRuntime::new(None);
        let response = runtime
            .handle_message(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response["error"]["code"], -32601);
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .contains("tools/call")
        );
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let runtime = GatewayRuntime::new(None);
        let response = runtime
            .handle_message(json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized",
            }))
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_closed_runtime_refuses_messages() {
        let runtime = GatewayRuntime::new(None);
        assert!(!runtime.is_closed());
        runtime.close();
        assert!(runtime.is_closed());

        let result = runtime
            .handle_message(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await;
        assert!(result.is_err());

        // close is idempotent
        runtime.close();
        assert!(runtime.is_closed());
    }
}
