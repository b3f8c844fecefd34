//! State-change notifications for observers

use resqterra_shared::{Mission, Vehicle};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FleetEvent {
    VehicleUpdated(Vehicle),
    MissionCreated(Mission),
    MissionUpdated(Mission),
}
