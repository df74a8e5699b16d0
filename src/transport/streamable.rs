//! Per-request (streamable) transport.
//!
//! A fresh transport and protocol-runtime instance serve exactly one HTTP
//! request. Both must be released when the response closes, including
//! error paths, or sustained errors would leak open handles. `close` is
//! idempotent and also runs on drop, so the handler's scope is the
//! response-close hook of last resort.

use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::transport::runtime::ProtocolRuntime;

/// Transport for one stateless request/response exchange.
pub struct StreamableTransport {
    runtime: Arc<dyn ProtocolRuntime>,
    closed: AtomicBool,
}

impl StreamableTransport {
    /// Create a transport over a per-request runtime instance.
    pub fn new(runtime: Arc<dyn ProtocolRuntime>) -> Self {
        Self {
            runtime,
            closed: AtomicBool::new(false),
        }
    }

    /// Pass the request message to the runtime.
    pub async fn handle(&self, message: Value) -> anyhow::Result<Option<Value>> {
        if self.is_closed() {
            anyhow::bail!("transport is closed");
        }
        self.runtime.handle_message(message).await
    }

    /// Close the transport and its runtime exactly once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.runtime.close();
        }
    }

    /// Whether the transport has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StreamableTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Runtime that counts closes and optionally fails every message.
    struct CountingRuntime {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl ProtocolRuntime for CountingRuntime {
        async fn handle_message(&self, message: Value) -> anyhow::Result<Option<Value>> {
            if self.fail {
                anyhow::bail!("handler exploded");
            }
            Ok(Some(message))
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::SeqCst) > 0
        }
    }

    fn counting(fail: bool) -> (Arc<CountingRuntime>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(CountingRuntime {
                closes: closes.clone(),
                fail,
            }),
            closes,
        )
    }

    #[tokio::test]
    async fn test_handle_forwards_to_runtime() {
        let (runtime, _closes) = counting(false);
        let transport = StreamableTransport::new(runtime);
        let echoed = transport.handle(json!({"id": 1})).await.unwrap().unwrap();
        assert_eq!(echoed, json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_close_closes_runtime_exactly_once() {
        let (runtime, closes) = counting(false);
        let transport = StreamableTransport::new(runtime);

        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        drop(transport);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_closed_once_even_when_handler_errors() {
        let (runtime, closes) = counting(true);
        let transport = StreamableTransport::new(runtime);

        let result = transport.handle(json!({"id": 1})).await;
        assert!(result.is_err());

        transport.close();
        drop(transport);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_alone_closes_runtime() {
        let (runtime, closes) = counting(false);
        {
            let _transport = StreamableTransport::new(runtime);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_transport_refuses_messages() {
        let (runtime, _closes) = counting(false);
        let transport = StreamableTransport::new(runtime);
        transport.close();
        assert!(transport.handle(json!({"id": 1})).await.is_err());
    }
}
