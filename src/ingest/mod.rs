//! Telemetry/Event Ingestion Pipeline
//!
//! Decodes inbound `(topic, payload)` pairs and routes them to the
//! coordinator by message category. A bad message is logged and dropped,
//! never fatal.

mod pipeline;

pub use pipeline::{Ingested, Ingestor};
