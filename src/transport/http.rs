//! HTTP handlers for both transport modes, plus the error payload
//! builders shared with the authentication middleware.
//!
//! Protocol endpoints report failures as JSON-RPC-shaped bodies
//! (`{jsonrpc, error:{code, message}}`); non-RPC endpoints use the plain
//! `{error:{code, message}}` shape.

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::auth::AuthOutcome;
use crate::server::GatewayState;
use crate::transport::session::SessionRegistry;
use crate::transport::streamable::StreamableTransport;
use crate::types::{ServerId, SessionId};

/// Protocol endpoint path.
pub const MCP_PATH: &str = "/api/mcp";

/// Session-message endpoint path.
pub const MESSAGES_PATH: &str = "/api/mcp/messages";

/// Outbound message buffer per streaming connection.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// JSON-RPC-shaped error response for protocol endpoints.
pub fn rpc_error_response(status: StatusCode, code: i32, message: &str) -> Response {
    (
        status,
        Json(json!({
            "jsonrpc": "2.0",
            "error": {"code": code, "message": message},
        })),
    )
        .into_response()
}

/// Plain error response for non-RPC endpoints.
pub fn plain_error_response(status: StatusCode, code: i32, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": {"code": code, "message": message},
        })),
    )
        .into_response()
}

/// Removes the session from the registry when the SSE stream is dropped.
///
/// Owned by the response stream so removal happens synchronously with the
/// connection-close event; deferred cleanup would let registry entries
/// outlive their transports.
struct SessionGuard {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// `GET /api/mcp`: establish a streaming session.
///
/// The first SSE event names the message endpoint (with the generated
/// session id); subsequent `message` events carry server responses.
pub async fn establish_stream(
    State(state): State<GatewayState>,
    Extension(server_id): Extension<ServerId>,
    Extension(outcome): Extension<AuthOutcome>,
) -> Response {
    let (tx, rx) = mpsc::channel::<Value>(STREAM_CHANNEL_CAPACITY);
    let runtime = state.runtime_factory.create(outcome.user.clone());
    let session = state.sessions.create(server_id.clone(), tx, runtime);

    info!(
        session_id = %session.id(),
        server_id = %server_id,
        "Streaming session established"
    );

    let endpoint = format!("{}?sessionId={}", MESSAGES_PATH, session.id());
    let guard = SessionGuard {
        id: session.id().clone(),
        registry: state.sessions.clone(),
    };

    let endpoint_event = Event::default().event("endpoint").data(endpoint);
    let message_events = ReceiverStream::new(rx)
        .map(|message| Event::default().event("message").data(message.to_string()));
    let stream = futures::stream::once(async move { endpoint_event })
        .chain(message_events)
        .map(move |event| {
            // The guard lives inside the stream; dropping the stream
            // removes the session.
            let _held = &guard;
            Ok::<_, Infallible>(event)
        });

    Sse::new(stream)
        .keep_alive(KeepAlive::default().interval(Duration::from_secs(15)))
        .into_response()
}

/// Query parameters of the session-message endpoint.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `POST /api/mcp/messages?sessionId=<id>`: deliver a client message to a
/// streaming session.
///
/// An unknown session id is a normal condition (client retried after a
/// restart or failover): reported as 404, logged at debug level, no
/// session created.
pub async fn post_session_message(
    State(state): State<GatewayState>,
    Query(query): Query<SessionQuery>,
    Json(message): Json<Value>,
) -> Response {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return rpc_error_response(StatusCode::BAD_REQUEST, -32600, "Missing sessionId");
    };
    let session_id = SessionId::new(session_id);

    let Some(session) = state.sessions.get(&session_id) else {
        debug!(session_id = %session_id, "Session not found");
        return rpc_error_response(StatusCode::NOT_FOUND, -32001, "Session not found");
    };

    match session.runtime().handle_message(message).await {
        Ok(Some(response)) => {
            if !session.send(response).await {
                warn!(
                    session_id = %session_id,
                    server_id = %session.server_id(),
                    "Stream closed before response delivery"
                );
            }
            (StatusCode::ACCEPTED, "Accepted").into_response()
        }
        Ok(None) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => {
            // No bytes of this response have been written yet, so the
            // failure can still be reported as a structured error.
            error!(
                session_id = %session_id,
                server_id = %session.server_id(),
                "Message handling failed: {:#}",
                e
            );
            rpc_error_response(StatusCode::INTERNAL_SERVER_ERROR, -32603, "Internal error")
        }
    }
}

/// `POST /api/mcp`: stateless per-request exchange.
pub async fn handle_streamable_request(
    State(state): State<GatewayState>,
    Extension(server_id): Extension<ServerId>,
    Extension(outcome): Extension<AuthOutcome>,
    Json(message): Json<Value>,
) -> Response {
    let runtime = state.runtime_factory.create(outcome.user.clone());
    let transport = StreamableTransport::new(runtime);

    let result = transport.handle(message).await;
    // The response is fully buffered, so handler exit is response close:
    // release the transport and runtime on every path.
    transport.close();

    match result {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => {
            error!(server_id = %server_id, "Message handling failed: {:#}", e);
            rpc_error_response(StatusCode::INTERNAL_SERVER_ERROR, -32603, "Internal error")
        }
    }
}

/// `DELETE /api/mcp` (and other unsupported verbs).
pub async fn method_not_allowed() -> Response {
    rpc_error_response(StatusCode::METHOD_NOT_ALLOWED, -32000, "Method not allowed")
}
