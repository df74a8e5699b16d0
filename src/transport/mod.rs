//! Session and transport management for authenticated protocol traffic.
//!
//! Two delivery modes:
//!
//! - **Streaming**: a long-lived SSE connection registered in the
//!   [`SessionRegistry`] under a generated session id; follow-up messages
//!   arrive on a separate endpoint carrying that id. The session is removed
//!   synchronously when the connection closes.
//! - **Streamable**: a per-request exchange; the transport and its
//!   protocol-runtime instance are both closed when the response
//!   completes, error paths included.
//!
//! Message payloads are opaque JSON-RPC values; interpreting them is the
//! [`ProtocolRuntime`]'s job.

pub mod http;
mod runtime;
mod session;
mod streamable;

pub use runtime::{GatewayRuntime, GatewayRuntimeFactory, ProtocolRuntime, RuntimeFactory};
pub use session::{SessionRegistry, StreamingSession};
pub use streamable::StreamableTransport;
