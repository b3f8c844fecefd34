//! Mission Lifecycle State Machine
//!
//! Defines valid mission status transitions and the battery failsafe rule.

use crate::{Mission, MissionStatus, VehicleMode};

/// Events that can move a mission through its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A vehicle took the mission (also used to move an active mission to another vehicle)
    Assigned { callsign: String },
    /// The assignee gave the mission up (failsafe, ack timeout); back to the queue
    Released,
    /// Mission flown to the end
    Completed,
    /// Mission aborted by the operator or the vehicle
    Failed,
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and the mission now has this status
    Success(MissionStatus),
    /// Transition was invalid from the current status; the mission is unchanged
    Invalid {
        from: MissionStatus,
        event: LifecycleEvent,
    },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success(_))
    }
}

/// Apply a lifecycle event to a mission, keeping status and assignee consistent
pub fn apply(mission: &mut Mission, event: LifecycleEvent) -> TransitionResult {
    use LifecycleEvent as E;
    use MissionStatus as S;

    match (mission.status, event) {
        (S::Queued | S::Active, E::Assigned { callsign }) => {
            mission.status = S::Active;
            mission.assigned_to = Some(callsign);
            TransitionResult::Success(S::Active)
        }
        (S::Active, E::Released) => {
            mission.status = S::Queued;
            mission.assigned_to = None;
            TransitionResult::Success(S::Queued)
        }
        (S::Active, E::Completed) => {
            mission.status = S::Completed;
            TransitionResult::Success(S::Completed)
        }
        (S::Active, E::Failed) => {
            mission.status = S::Failed;
            TransitionResult::Success(S::Failed)
        }
        (from, event) => TransitionResult::Invalid { from, event },
    }
}

/// Battery at or below the critical level forces RTL unless already returning
pub fn requires_failsafe(battery: f64, mode: VehicleMode, critical_percent: f64) -> bool {
    battery <= critical_percent && !mode.is_rtl()
}
