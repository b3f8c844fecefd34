//! ResQTerra fleet coordinator
//!
//! Tracks every vehicle from its telemetry, keeps a priority queue of
//! missions, assigns them to the best available vehicle, forces critical
//! vehicles home, and correlates commands with their acknowledgments.

pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fleet;
pub mod ingest;
pub mod mission;
pub mod sim;
pub mod store;
pub mod transport;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, FleetEvent, MissionOutcome};
pub use error::{CoordinatorError, Result};
pub use ingest::{Ingested, Ingestor};
