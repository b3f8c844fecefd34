use crate::coordinator::Coordinator;
use crate::transport::BusMessage;
use resqterra_shared::{codec, InboundMessage, Mission, Vehicle};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Telemetry(Vehicle),
    Event { rescue: Option<Mission> },
    Ack { matched: bool },
    /// Malformed or unroutable; logged and discarded
    Dropped,
}

pub struct Ingestor {
    coordinator: Arc<Coordinator>,
}

impl Ingestor {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Process one message. Never fails: parse errors become `Dropped`.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Ingested {
        let message = match codec::decode(topic, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic, bytes = payload.len(), error = %e, "Dropping malformed message");
                return Ingested::Dropped;
            }
        };

        match message {
            InboundMessage::Telemetry { callsign, msg } => {
                Ingested::Telemetry(self.coordinator.ingest_telemetry(&callsign, &msg).await)
            }
            InboundMessage::Event { callsign, msg } => Ingested::Event {
                rescue: self.coordinator.ingest_event(&callsign, &msg).await,
            },
            InboundMessage::Ack { callsign, msg } => Ingested::Ack {
                matched: self.coordinator.handle_ack(&callsign, &msg).await,
            },
        }
    }

    /// Consume a bus subscription until the bus closes.
    ///
    /// The coordinator's own commands and mission updates travel on the same
    /// bus and are skipped.
    pub async fn run(&self, mut rx: broadcast::Receiver<BusMessage>) {
        info!("Ingestion pipeline started");

        loop {
            match rx.recv().await {
                Ok(message) => {
                    if codec::is_outbound(&message.topic) {
                        continue;
                    }
                    let outcome = self.handle(&message.topic, &message.payload).await;
                    debug!(topic = %message.topic, ?outcome, "Ingested");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Ingestion fell behind, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Bus closed, ingestion pipeline stopping");
                    break;
                }
            }
        }
    }
}
