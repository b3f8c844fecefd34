//! Fleet-wide state guarded by the coordinator's single lock
//!
//! Everything here is synchronous: each method is one atomic decision taken
//! while the caller holds the lock. Effects (persist, notify) are collected in
//! [`Changes`] and carried out after the lock is released.

use crate::fleet::FleetStore;
use crate::mission::{is_eligible, plan_next, Assignment, MissionQueue};
use chrono::{DateTime, Utc};
use resqterra_shared::state_machine::{self, LifecycleEvent, TransitionResult};
use resqterra_shared::{Mission, TelemetryMessage, Vehicle, VehicleMode};
use tracing::{info, warn};

/// Mission records touched by one decision, in the order they changed
#[derive(Debug, Default)]
pub(crate) struct Changes {
    pub created: Vec<Mission>,
    pub updated: Vec<Mission>,
    pub assignments: Vec<Assignment>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }
}

/// Outcome of applying one telemetry sample
#[derive(Debug)]
pub(crate) struct TelemetryApplied {
    pub vehicle: Vehicle,
    pub first_seen: bool,
    /// Battery failsafe forced RTL on this sample
    pub failsafe: bool,
    pub changes: Changes,
}

#[derive(Debug)]
pub(crate) struct FleetState {
    pub fleet: FleetStore,
    pub missions: MissionQueue,
}

impl FleetState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            fleet: FleetStore::new(history_capacity),
            missions: MissionQueue::new(),
        }
    }

    /// Assign queued missions until no mission/vehicle pair remains.
    ///
    /// Each pass assigns at most one mission, so the number of passes is
    /// bounded by the queue length at entry.
    pub fn drain_assignments(&mut self, min_battery: f64, changes: &mut Changes) -> usize {
        let bound = self.missions.queued_count();
        let mut assigned = 0;

        for _ in 0..bound {
            let Some(plan) = plan_next(&self.fleet, &self.missions, min_battery) else {
                break;
            };

            let event = LifecycleEvent::Assigned {
                callsign: plan.callsign.clone(),
            };
            match self.missions.transition(&plan.mission_id, event) {
                Some(TransitionResult::Success(_)) => {}
                other => {
                    warn!(mission_id = %plan.mission_id, result = ?other, "Planned assignment could not be applied");
                    break;
                }
            }

            if let Some(mission) = self.missions.get(&plan.mission_id) {
                info!(
                    mission_id = %mission.id,
                    callsign = %plan.callsign,
                    priority = mission.priority,
                    "Mission assigned"
                );
                changes.updated.push(mission.clone());
            }
            changes.assignments.push(plan);
            assigned += 1;
        }

        assigned
    }

    /// Put the vehicle's active mission back in the queue
    pub fn release_active(&mut self, callsign: &str, changes: &mut Changes) -> Option<String> {
        let mission_id = self.missions.active_for(callsign)?.id.clone();
        self.release(&mission_id, changes).then_some(mission_id)
    }

    /// Release one mission if it is active
    pub fn release(&mut self, mission_id: &str, changes: &mut Changes) -> bool {
        match self.missions.transition(mission_id, LifecycleEvent::Released) {
            Some(TransitionResult::Success(_)) => {
                if let Some(mission) = self.missions.get(mission_id) {
                    changes.updated.push(mission.clone());
                }
                true
            }
            _ => false,
        }
    }

    /// Merge telemetry, run the battery failsafe and drain the queue if the
    /// sample freed or qualified a vehicle
    pub fn apply_telemetry(
        &mut self,
        callsign: &str,
        telemetry: &TelemetryMessage,
        received_at: DateTime<Utc>,
        critical_battery: f64,
        min_battery: f64,
    ) -> TelemetryApplied {
        let upserted = self.fleet.upsert(callsign, telemetry, received_at);
        let mut changes = Changes::default();
        let mut vehicle = upserted.vehicle;

        let failsafe =
            state_machine::requires_failsafe(vehicle.battery, vehicle.mode, critical_battery);
        if failsafe {
            if let Some(updated) = self.fleet.set_mode(callsign, VehicleMode::Rtl) {
                vehicle = updated.clone();
            }
            warn!(callsign, battery = vehicle.battery, "Battery critical, forcing RTL");

            if let Some(mission_id) = self.release_active(callsign, &mut changes) {
                warn!(callsign, mission_id = %mission_id, "Mission returned to queue after failsafe");
            }
        }

        let busy = self.missions.busy_callsigns();
        let vehicle_available = is_eligible(&vehicle, &busy, min_battery);
        if (!changes.updated.is_empty() || vehicle_available) && self.missions.queued_count() > 0 {
            self.drain_assignments(min_battery, &mut changes);
        }

        TelemetryApplied {
            vehicle,
            first_seen: upserted.first_seen,
            failsafe,
            changes,
        }
    }
}
