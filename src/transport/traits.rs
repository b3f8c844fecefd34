//! Transport trait abstraction for pluggable pub/sub backends

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Publish to {topic} rejected: {reason}")]
    Rejected { topic: String, reason: String },
}

/// Best-effort, at-most-once publisher
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a payload on a topic. Success means handed to the transport,
    /// not delivered.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
