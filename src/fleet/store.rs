use chrono::{DateTime, Utc};
use resqterra_shared::{Position, TelemetryMessage, Vehicle, VehicleMode};
use std::collections::HashMap;

/// Result of merging one telemetry sample
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// The record after the update
    pub vehicle: Vehicle,
    /// True when this sample created the record
    pub first_seen: bool,
}

#[derive(Debug)]
pub struct FleetStore {
    vehicles: HashMap<String, Vehicle>,
    history_capacity: usize,
}

impl FleetStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            vehicles: HashMap::new(),
            history_capacity,
        }
    }

    /// Merge a telemetry sample into the vehicle's record, creating it if needed.
    ///
    /// Fields missing from the sample keep their stored value (or the record
    /// defaults of 100% battery and `IDLE` on first sight). A position is only
    /// appended to the history when both `lat` and `lng` are present.
    pub fn upsert(
        &mut self,
        callsign: &str,
        telemetry: &TelemetryMessage,
        received_at: DateTime<Utc>,
    ) -> Upserted {
        let first_seen = !self.vehicles.contains_key(callsign);
        let vehicle = self
            .vehicles
            .entry(callsign.to_string())
            .or_insert_with(|| Vehicle::new(callsign, received_at));

        if let Some(battery) = telemetry.battery {
            vehicle.battery = battery.clamp(0.0, 100.0);
        }
        if let Some(mode) = telemetry.mode {
            vehicle.mode = mode;
        }
        if let (Some(lat), Some(lng)) = (telemetry.lat, telemetry.lng) {
            let alt = telemetry
                .alt
                .or(vehicle.position.map(|p| p.alt))
                .unwrap_or(0.0);
            let position = Position {
                lat,
                lng,
                alt,
                at: received_at,
            };
            vehicle.push_position(position, self.history_capacity);
        }
        vehicle.last_seen = received_at;

        Upserted {
            vehicle: vehicle.clone(),
            first_seen,
        }
    }

    /// Snapshot of every known vehicle, in no particular order
    pub fn list(&self) -> Vec<Vehicle> {
        self.vehicles.values().cloned().collect()
    }

    pub fn get(&self, callsign: &str) -> Option<&Vehicle> {
        self.vehicles.get(callsign)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Override a vehicle's mode, returning the updated record
    pub fn set_mode(&mut self, callsign: &str, mode: VehicleMode) -> Option<&Vehicle> {
        let vehicle = self.vehicles.get_mut(callsign)?;
        vehicle.mode = mode;
        Some(vehicle)
    }
}
