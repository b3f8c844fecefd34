use super::MissionQueue;
use crate::fleet::FleetStore;
use resqterra_shared::Vehicle;
use std::cmp::Ordering;
use std::collections::HashSet;

/// A proposed mission/vehicle pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub mission_id: String,
    pub callsign: String,
}

/// A vehicle may take a mission when it has enough charge, is not returning
/// to launch, and does not already own an active mission
pub fn is_eligible(vehicle: &Vehicle, busy: &HashSet<&str>, min_battery: f64) -> bool {
    vehicle.battery >= min_battery
        && !vehicle.mode.is_rtl()
        && !busy.contains(vehicle.callsign.as_str())
}

/// Pick the eligible vehicle with the highest battery.
///
/// Equal batteries resolve to the lexicographically smallest callsign so the
/// choice does not depend on map iteration order.
pub fn select_vehicle<'a>(
    vehicles: impl IntoIterator<Item = &'a Vehicle>,
    busy: &HashSet<&str>,
    min_battery: f64,
) -> Option<&'a Vehicle> {
    vehicles
        .into_iter()
        .filter(|v| is_eligible(v, busy, min_battery))
        .max_by(|a, b| {
            a.battery
                .partial_cmp(&b.battery)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.callsign.cmp(&a.callsign))
        })
}

/// Decide the next assignment: the most urgent queued mission goes to the best
/// eligible vehicle. `None` when the queue is empty or no vehicle qualifies.
pub fn plan_next(fleet: &FleetStore, queue: &MissionQueue, min_battery: f64) -> Option<Assignment> {
    let mission = queue.next_queued()?;
    let busy = queue.busy_callsigns();
    let vehicle = select_vehicle(fleet.iter(), &busy, min_battery)?;

    Some(Assignment {
        mission_id: mission.id.clone(),
        callsign: vehicle.callsign.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use resqterra_shared::state_machine::LifecycleEvent;
    use resqterra_shared::{Mission, MissionStatus, TelemetryMessage, VehicleMode, Waypoint};

    fn vehicle(callsign: &str, battery: f64, mode: VehicleMode) -> Vehicle {
        let mut v = Vehicle::new(callsign, Utc::now());
        v.battery = battery;
        v.mode = mode;
        v
    }

    fn make_fleet(entries: &[(&str, f64, VehicleMode)]) -> FleetStore {
        let mut fleet = FleetStore::new(10);
        for (callsign, battery, mode) in entries {
            let telemetry = TelemetryMessage {
                battery: Some(*battery),
                mode: Some(*mode),
                ..Default::default()
            };
            fleet.upsert(callsign, &telemetry, Utc::now());
        }
        fleet
    }

    fn mission(id: &str, priority: i64) -> Mission {
        Mission {
            id: id.into(),
            name: None,
            waypoints: vec![Waypoint(0.0, 0.0)],
            supplies: vec![],
            priority,
            metadata: Default::default(),
            status: MissionStatus::Queued,
            assigned_to: None,
            created_at: Utc::now(),
            seq: 0,
        }
    }

    #[test]
    fn test_eligibility_rules() {
        let busy: HashSet<&str> = ["D3"].into_iter().collect();

        assert!(is_eligible(&vehicle("D1", 35.0, VehicleMode::Idle), &busy, 35.0));
        assert!(!is_eligible(&vehicle("D1", 34.9, VehicleMode::Idle), &busy, 35.0));
        assert!(!is_eligible(&vehicle("D2", 90.0, VehicleMode::Rtl), &busy, 35.0));
        assert!(!is_eligible(&vehicle("D3", 90.0, VehicleMode::Idle), &busy, 35.0));
    }

    #[test]
    fn test_highest_battery_wins() {
        let vehicles = [
            vehicle("D1", 60.0, VehicleMode::Idle),
            vehicle("D2", 95.0, VehicleMode::Rtl),
            vehicle("D3", 80.0, VehicleMode::Loiter),
        ];
        let chosen = select_vehicle(&vehicles, &HashSet::new(), 35.0);
        assert_eq!(chosen.map(|v| v.callsign.as_str()), Some("D3"));
    }

    #[test]
    fn test_battery_tie_is_deterministic() {
        let vehicles = [
            vehicle("D2", 70.0, VehicleMode::Idle),
            vehicle("D1", 70.0, VehicleMode::Idle),
        ];
        let chosen = select_vehicle(&vehicles, &HashSet::new(), 35.0);
        assert_eq!(chosen.map(|v| v.callsign.as_str()), Some("D1"));
    }

    #[test]
    fn test_plan_next_skips_busy_vehicles() {
        let fleet = make_fleet(&[("D1", 90.0, VehicleMode::Active), ("D2", 50.0, VehicleMode::Idle)]);
        let mut queue = MissionQueue::new();
        queue.enqueue(mission("m-1", 5));
        queue.enqueue(mission("m-2", 5));
        queue.transition("m-1", LifecycleEvent::Assigned { callsign: "D1".into() });

        let plan = plan_next(&fleet, &queue, 35.0);
        assert_eq!(
            plan,
            Some(Assignment {
                mission_id: "m-2".into(),
                callsign: "D2".into()
            })
        );
    }

    #[test]
    fn test_plan_next_nothing_to_do() {
        let queue = MissionQueue::new();
        let fleet = make_fleet(&[("D1", 90.0, VehicleMode::Idle)]);
        assert!(plan_next(&fleet, &queue, 35.0).is_none());

        let mut queue = MissionQueue::new();
        queue.enqueue(mission("m-1", 5));
        let fleet = make_fleet(&[("D1", 20.0, VehicleMode::Idle)]);
        assert!(plan_next(&fleet, &queue, 35.0).is_none());
    }
}
