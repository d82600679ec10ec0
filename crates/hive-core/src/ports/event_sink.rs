//! EventSink port: the seam to the pub/sub transport.
//!
//! Design intent:
//! - Notifications are best-effort. A failing sink is logged and
//!   forgotten; it never blocks or fails the mutation that produced the
//!   event.
//! - The transport owns ordering and delivery semantics; the core only
//!   promises "eventually, once, to interested subscribers".

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::DomainEvent;

#[derive(Debug, Error)]
#[error("event sink: {0}")]
pub struct SinkError(pub String);

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), SinkError>;
}

/// Best-effort emission. 失敗は warn のみ、呼び出し元には伝播しない。
pub async fn emit(sink: &dyn EventSink, event: &DomainEvent) {
    if let Err(err) = sink.publish(event.topic(), event.payload()).await {
        warn!(topic = event.topic(), error = %err, "event notification dropped");
    }
}

/// Sink for embedders without a transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _topic: &str, _payload: serde_json::Value) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Recording sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    published: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), SinkError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}
