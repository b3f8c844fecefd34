use super::{EventRecord, MissionStore, StoreError};
use async_trait::async_trait;
use resqterra_shared::Mission;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Store kept in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    missions: RwLock<HashMap<String, Mission>>,
    events: RwLock<Vec<EventRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the event log, oldest first
    pub async fn events(&self) -> Vec<EventRecord> {
        self.events.read().await.clone()
    }

    pub async fn mission(&self, id: &str) -> Option<Mission> {
        self.missions.read().await.get(id).cloned()
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn save_mission(&self, mission: &Mission) -> Result<(), StoreError> {
        self.missions
            .write()
            .await
            .insert(mission.id.clone(), mission.clone());
        Ok(())
    }

    async fn load_missions(&self) -> Result<Vec<Mission>, StoreError> {
        Ok(self.missions.read().await.values().cloned().collect())
    }

    async fn append_event(&self, record: &EventRecord) -> Result<(), StoreError> {
        self.events.write().await.push(record.clone());
        Ok(())
    }
}
