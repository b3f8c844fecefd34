//! External mission/event store
//!
//! Durable storage lives outside the coordinator. The coordinator only needs
//! to save mission records, reload them at startup, and append to the event
//! log.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resqterra_shared::{EventMessage, Mission};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One entry of the append-only event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub callsign: String,
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EventMessage,
}

#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Insert or replace a mission record
    async fn save_mission(&self, mission: &Mission) -> Result<(), StoreError>;

    async fn load_missions(&self) -> Result<Vec<Mission>, StoreError>;

    async fn append_event(&self, record: &EventRecord) -> Result<(), StoreError>;
}
