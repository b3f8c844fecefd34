use resqterra_shared::state_machine::{self, LifecycleEvent, TransitionResult};
use resqterra_shared::{Mission, MissionStatus};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct MissionQueue {
    missions: HashMap<String, Mission>,
    next_seq: u64,
}

impl MissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mission as `queued`, clearing any assignment it carried
    pub fn enqueue(&mut self, mut mission: Mission) -> &Mission {
        mission.status = MissionStatus::Queued;
        mission.assigned_to = None;
        self.insert(mission)
    }

    /// Insert a mission keeping its status (used when reloading from the store)
    pub fn insert(&mut self, mut mission: Mission) -> &Mission {
        mission.seq = self.next_seq;
        self.next_seq += 1;
        match self.missions.entry(mission.id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(mission);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(mission),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Mission> {
        self.missions.get(id)
    }

    /// Apply a lifecycle event to one mission
    pub fn transition(&mut self, id: &str, event: LifecycleEvent) -> Option<TransitionResult> {
        let mission = self.missions.get_mut(id)?;
        Some(state_machine::apply(mission, event))
    }

    /// Most urgent queued mission: lowest priority value, then oldest
    pub fn next_queued(&self) -> Option<&Mission> {
        self.missions
            .values()
            .filter(|m| m.status == MissionStatus::Queued)
            .min_by_key(|m| m.queue_key())
    }

    pub fn queued_count(&self) -> usize {
        self.missions
            .values()
            .filter(|m| m.status == MissionStatus::Queued)
            .count()
    }

    /// The active mission owned by `callsign`, if any
    pub fn active_for(&self, callsign: &str) -> Option<&Mission> {
        self.missions.values().find(|m| m.is_active_for(callsign))
    }

    /// Callsigns that currently own an active mission
    pub fn busy_callsigns(&self) -> HashSet<&str> {
        self.missions
            .values()
            .filter(|m| m.status == MissionStatus::Active)
            .filter_map(|m| m.assigned_to.as_deref())
            .collect()
    }

    /// All missions in queue order
    pub fn list(&self) -> Vec<Mission> {
        let mut missions: Vec<Mission> = self.missions.values().cloned().collect();
        missions.sort_by_key(|m| m.queue_key());
        missions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use resqterra_shared::Waypoint;

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
    fn test_priority_then_creation_order() {
        let mut queue = MissionQueue::new();
        let base = Utc::now();

        let mut late_urgent = mission("late-urgent", 1);
        late_urgent.created_at = base + Duration::seconds(10);
        let mut early_routine = mission("early-routine", 5);
        early_routine.created_at = base;
        let mut early_urgent = mission("early-urgent", 1);
        early_urgent.created_at = base + Duration::seconds(5);

        queue.enqueue(late_urgent);
        queue.enqueue(early_routine);
        queue.enqueue(early_urgent);

        assert_eq!(queue.next_queued().map(|m| m.id.as_str()), Some("early-urgent"));
        let order: Vec<String> = queue.list().into_iter().map(|m| m.id).collect();
        assert_eq!(order, ["early-urgent", "late-urgent", "early-routine"]);
    }

    #[test]
    fn test_equal_timestamps_fall_back_to_insertion_order() {
        let mut queue = MissionQueue::new();
        let at = Utc::now();
        for id in ["a", "b", "c"] {
            let mut m = mission(id, 5);
            m.created_at = at;
            queue.enqueue(m);
        }
        assert_eq!(queue.next_queued().map(|m| m.id.as_str()), Some("a"));
    }

    #[test]
    fn test_enqueue_resets_assignment() {
        let mut queue = MissionQueue::new();
        let mut m = mission("m-1", 5);
        m.status = MissionStatus::Active;
        m.assigned_to = Some("D1".into());

        let queued = queue.enqueue(m);
        assert_eq!(queued.status, MissionStatus::Queued);
        assert!(queue.busy_callsigns().is_empty());
    }

    #[test]
    fn test_active_missions_leave_the_queue() {
        let mut queue = MissionQueue::new();
        queue.enqueue(mission("m-1", 5));
        queue.enqueue(mission("m-2", 5));

        let result = queue.transition("m-1", LifecycleEvent::Assigned { callsign: "D1".into() });
        assert_eq!(result, Some(TransitionResult::Success(MissionStatus::Active)));

        assert_eq!(queue.queued_count(), 1);
        assert_eq!(queue.next_queued().map(|m| m.id.as_str()), Some("m-2"));
        assert_eq!(queue.active_for("D1").map(|m| m.id.as_str()), Some("m-1"));
        assert!(queue.busy_callsigns().contains("D1"));
    }

    #[test]
    fn test_transition_unknown_mission() {
        let mut queue = MissionQueue::new();
        assert!(queue.transition("nope", LifecycleEvent::Released).is_none());
    }
}
