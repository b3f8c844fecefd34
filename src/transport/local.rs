//! In-process pub/sub bus
//!
//! Every subscriber sees every message published after it subscribed. A
//! subscriber that falls more than `capacity` messages behind loses the oldest
//! ones, which matches the at-most-once guarantee of the real transport.

use super::traits::{Publisher, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::trace;

/// A message as seen on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Publisher for LocalBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        // No subscribers is not an error on a best-effort bus
        if self.tx.send(message).is_err() {
            trace!(topic, "Published with no subscribers");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_messages() {
        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish("drone/D1/cmd", Bytes::from_static(b"{}")).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "drone/D1/cmd");
        assert_eq!(&msg.payload[..], b"{}");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = LocalBus::new(8);
        assert!(bus.publish("mission/m-1", Bytes::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_oldest() {
        let bus = LocalBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..4u8 {
            bus.publish("t", Bytes::from(vec![i])).await.unwrap();
        }

        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(2))));
        assert_eq!(&rx.recv().await.unwrap().payload[..], &[2]);
    }
}
