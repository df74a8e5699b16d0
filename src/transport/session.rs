//! In-process registry of streaming sessions.
//!
//! The registry is an explicitly constructed, injectable object rather
//! than a module-level map, so tests get isolation and a distributed backing
//! store could replace it without touching call sites. Sessions are pinned
//! to this process: a horizontally-scaled deployment routes follow-up
//! messages to the instance that accepted the stream.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::transport::runtime::ProtocolRuntime;
use crate::types::{ServerId, SessionId};

/// One live streaming connection.
pub struct StreamingSession {
    id: SessionId,
    server_id: ServerId,
    tx: mpsc::Sender<Value>,
    runtime: Arc<dyn ProtocolRuntime>,
}

impl StreamingSession {
    /// The generated session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The server this session is authenticated against.
    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// The protocol runtime bound to this connection.
    pub fn runtime(&self) -> &Arc<dyn ProtocolRuntime> {
        &self.runtime
    }

    /// Queue a server message for delivery over the stream. Returns false
    /// when the connection is already gone.
    pub async fn send(&self, message: Value) -> bool {
        self.tx.send(message).await.is_ok()
    }
}

/// Create/get/remove table of streaming sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<StreamingSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with a generated id.
    pub fn create(
        &self,
        server_id: ServerId,
        tx: mpsc::Sender<Value>,
        runtime: Arc<dyn ProtocolRuntime>,
    ) -> Arc<StreamingSession> {
        let session = Arc::new(StreamingSession {
            id: SessionId::new(Uuid::new_v4().to_string()),
            server_id,
            tx,
            runtime,
        });
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a live session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<StreamingSession>> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.get(id).cloned()
    }

    /// Remove a session, closing its runtime. Safe to call for ids that
    /// were already removed.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<StreamingSession>> {
        let removed = {
            let mut sessions = self.sessions.write().expect("session lock poisoned");
            sessions.remove(id)
        };
        if let Some(session) = &removed {
            session.runtime.close();
            debug!(session_id = %id, server_id = %session.server_id, "Streaming session removed");
        }
        removed
    }

    /// Whether a session id is currently registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.contains_key(id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().expect("session lock poisoned");
        sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
