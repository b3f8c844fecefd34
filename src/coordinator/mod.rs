//! Fleet coordinator
//!
//! Owns the Fleet State Store and the Mission Queue behind one lock, so every
//! select-then-assign decision is atomic with respect to concurrent telemetry,
//! mission requests and the periodic sweep. Persistence and notifications run
//! after the lock is released, persist first, on a commit lane entered before
//! the lock is let go, so they land in decision order.

mod events;
mod state;

pub use events::FleetEvent;

use crate::command::{CommandTracker, DispatchOutcome};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::mission::Assignment;
use crate::store::{EventRecord, MissionStore};
use crate::transport::Publisher;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use resqterra_shared::state_machine::{LifecycleEvent, TransitionResult};
use resqterra_shared::{
    codec, topics, AckMessage, CommandMessage, CommandRequest, EventMessage, ForceAssignRequest,
    Mission, MissionRequest, MissionStatus, TelemetryMessage, Vehicle, Waypoint,
};
use serde_json::{json, Map};
use state::{Changes, FleetState};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Command sent to a vehicle when the battery failsafe fires
pub const RTL_COMMAND: &str = "RTL";
/// Ack-tracked command confirming an assignment (see `confirm_assignments`)
pub const START_MISSION_COMMAND: &str = "START_MISSION";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External end-of-mission outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOutcome {
    Completed,
    Failed,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    /// Single ordering domain for vehicle and mission state
    state: Mutex<FleetState>,
    /// Held from the end of a decision through its persist and publish
    commit_lane: Mutex<()>,
    tracker: CommandTracker,
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn MissionStore>,
    events: broadcast::Sender<FleetEvent>,
    me: Weak<Coordinator>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn MissionStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|me| Self {
            state: Mutex::new(FleetState::new(config.history_capacity)),
            commit_lane: Mutex::new(()),
            tracker: CommandTracker::new(publisher.clone(), config.min_command_interval()),
            config,
            publisher,
            store,
            events,
            me: me.clone(),
        })
    }

    pub fn tracker(&self) -> &CommandTracker {
        &self.tracker
    }

    /// Receive vehicle/mission state-change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.events.subscribe()
    }

    pub async fn vehicles(&self) -> Vec<Vehicle> {
        self.state.lock().await.fleet.list()
    }

    pub async fn vehicle(&self, callsign: &str) -> Option<Vehicle> {
        self.state.lock().await.fleet.get(callsign).cloned()
    }

    /// All missions in queue order
    pub async fn missions(&self) -> Vec<Mission> {
        self.state.lock().await.missions.list()
    }

    pub async fn mission(&self, id: &str) -> Option<Mission> {
        self.state.lock().await.missions.get(id).cloned()
    }

    /// Merge a telemetry sample, run the battery failsafe, and notify
    pub async fn ingest_telemetry(&self, callsign: &str, telemetry: &TelemetryMessage) -> Vehicle {
        let (applied, lane) = {
            let mut state = self.state.lock().await;
            let applied = state.apply_telemetry(
                callsign,
                telemetry,
                resqterra_shared::now(),
                self.config.critical_battery_percent,
                self.config.min_assignment_battery_percent,
            );
            (applied, self.commit_lane.lock().await)
        };

        if applied.first_seen {
            info!(callsign, battery = applied.vehicle.battery, mode = %applied.vehicle.mode, "New vehicle");
        }
        if applied.failsafe {
            let command = CommandMessage::new(RTL_COMMAND).with_meta(Some(json!({
                "reason": "battery_critical",
                "battery": applied.vehicle.battery,
            })));
            if let Err(e) = self
                .tracker
                .dispatch(callsign, command, false, self.config.ack_timeout())
                .await
            {
                warn!(callsign, error = %e, "Failsafe RTL command not sent");
            }
        }

        self.emit(FleetEvent::VehicleUpdated(applied.vehicle.clone()));
        self.commit(applied.changes, lane).await;
        applied.vehicle
    }

    /// Log an event and, for qualifying detections, create a rescue mission
    pub async fn ingest_event(&self, callsign: &str, event: &EventMessage) -> Option<Mission> {
        let record = EventRecord {
            callsign: callsign.to_string(),
            received_at: resqterra_shared::now(),
            event: event.clone(),
        };
        if let Err(e) = self.store.append_event(&record).await {
            error!(callsign, event = %event.event, error = %e, "Failed to append event");
        }

        if !self.config.is_rescue_event(&event.event) {
            debug!(callsign, event = %event.event, "Event logged");
            return None;
        }
        let Some(location) = event.location else {
            debug!(callsign, event = %event.event, "Detection without location, no mission created");
            return None;
        };

        let mut metadata = Map::new();
        metadata.insert("source".into(), json!("auto"));
        metadata.insert("event".into(), json!(event.event));
        metadata.insert("reportedBy".into(), json!(callsign));
        if let Some(confidence) = event.confidence {
            metadata.insert("confidence".into(), json!(confidence));
        }
        if let Some(image) = &event.image {
            metadata.insert("image".into(), json!(image));
        }

        let request = MissionRequest {
            name: Some(format!("Rescue: {} reported by {}", event.event, callsign)),
            waypoints: Some(vec![Waypoint(location.lat, location.lng)]),
            supplies: None,
            priority: Some(self.config.rescue_priority),
            metadata: Some(metadata),
        };
        match self.create_mission(request).await {
            Ok(mission) => {
                info!(callsign, mission_id = %mission.id, lat = location.lat, lng = location.lng, "Rescue mission created");
                Some(mission)
            }
            Err(e) => {
                warn!(callsign, error = %e, "Detection could not become a mission");
                None
            }
        }
    }

    /// Hand an acknowledgment to the tracker. Unmatched acks are discarded.
    pub async fn handle_ack(&self, callsign: &str, ack: &AckMessage) -> bool {
        self.tracker.resolve(callsign, ack).await
    }

    /// Validate and queue a new mission, then try to assign it
    pub async fn create_mission(&self, request: MissionRequest) -> Result<Mission> {
        let mission = self.build_mission(request)?;
        let id = mission.id.clone();

        let (current, changes, lane) = {
            let mut state = self.state.lock().await;
            let mut changes = Changes::default();
            let queued = state.missions.enqueue(mission).clone();
            changes.created.push(queued.clone());
            state.drain_assignments(self.config.min_assignment_battery_percent, &mut changes);
            let current = state.missions.get(&id).cloned().unwrap_or(queued);
            (current, changes, self.commit_lane.lock().await)
        };

        info!(mission_id = %id, priority = current.priority, status = %current.status, "Mission created");
        self.commit(changes, lane).await;
        Ok(current)
    }

    /// Assign queued missions until no mission/vehicle pair remains.
    /// Returns how many missions were assigned.
    pub async fn try_assign_next(&self) -> usize {
        let (changes, lane) = {
            let mut state = self.state.lock().await;
            let mut changes = Changes::default();
            state.drain_assignments(self.config.min_assignment_battery_percent, &mut changes);
            (changes, self.commit_lane.lock().await)
        };

        let assigned = changes.assignments.len();
        self.commit(changes, lane).await;
        assigned
    }

    /// Put a mission on a specific vehicle, bypassing selection
    pub async fn force_assign(&self, request: ForceAssignRequest) -> Result<Mission> {
        let ForceAssignRequest {
            mission_id,
            callsign,
        } = request;

        let (mission, changes, lane) = {
            let mut state = self.state.lock().await;

            let mission = state
                .missions
                .get(&mission_id)
                .ok_or_else(|| CoordinatorError::NotFound(format!("mission {mission_id}")))?;
            if mission.status.is_terminal() {
                return Err(CoordinatorError::InvalidInput(format!(
                    "mission {mission_id} is already {}",
                    mission.status
                )));
            }
            if state.fleet.get(&callsign).is_none() {
                return Err(CoordinatorError::NotFound(format!("vehicle {callsign}")));
            }
            if let Some(other) = state.missions.active_for(&callsign) {
                if other.id != mission_id {
                    return Err(CoordinatorError::InvalidInput(format!(
                        "vehicle {callsign} already flies mission {}",
                        other.id
                    )));
                }
            }

            let mut changes = Changes::default();
            let event = LifecycleEvent::Assigned {
                callsign: callsign.clone(),
            };
            match state.missions.transition(&mission_id, event) {
                Some(TransitionResult::Success(_)) => {}
                other => {
                    return Err(CoordinatorError::InvalidInput(format!(
                        "mission {mission_id} cannot be assigned: {other:?}"
                    )))
                }
            }
            let mission = state
                .missions
                .get(&mission_id)
                .cloned()
                .ok_or_else(|| CoordinatorError::NotFound(format!("mission {mission_id}")))?;
            changes.updated.push(mission.clone());
            changes.assignments.push(Assignment {
                mission_id: mission_id.clone(),
                callsign: callsign.clone(),
            });

            // A previous assignee may be free now
            state.drain_assignments(self.config.min_assignment_battery_percent, &mut changes);
            (mission, changes, self.commit_lane.lock().await)
        };

        info!(mission_id = %mission.id, callsign = %callsign, "Mission force-assigned");
        self.commit(changes, lane).await;
        Ok(mission)
    }

    /// Record the end of an active mission and free its vehicle
    pub async fn complete_mission(&self, mission_id: &str, outcome: MissionOutcome) -> Result<Mission> {
        let event = match outcome {
            MissionOutcome::Completed => LifecycleEvent::Completed,
            MissionOutcome::Failed => LifecycleEvent::Failed,
        };

        let (mission, changes, lane) = {
            let mut state = self.state.lock().await;
            match state.missions.transition(mission_id, event) {
                None => return Err(CoordinatorError::NotFound(format!("mission {mission_id}"))),
                Some(TransitionResult::Invalid { from, .. }) => {
                    return Err(CoordinatorError::InvalidInput(format!(
                        "mission {mission_id} is {from}, only active missions can end"
                    )))
                }
                Some(TransitionResult::Success(_)) => {}
            }

            let mut changes = Changes::default();
            let mission = state
                .missions
                .get(mission_id)
                .cloned()
                .ok_or_else(|| CoordinatorError::NotFound(format!("mission {mission_id}")))?;
            changes.updated.push(mission.clone());
            state.drain_assignments(self.config.min_assignment_battery_percent, &mut changes);
            (mission, changes, self.commit_lane.lock().await)
        };

        info!(mission_id, status = %mission.status, "Mission ended");
        self.commit(changes, lane).await;
        Ok(mission)
    }

    /// Send an ack-tracked command and wait for the vehicle's answer
    pub async fn send_command(&self, request: CommandRequest) -> Result<DispatchOutcome> {
        if request.callsign.trim().is_empty() {
            return Err(CoordinatorError::InvalidInput("callsign is required".into()));
        }
        if request.cmd.trim().is_empty() {
            return Err(CoordinatorError::InvalidInput("cmd is required".into()));
        }

        let command = CommandMessage::new(request.cmd).with_meta(request.meta);
        self.tracker
            .dispatch(&request.callsign, command, true, self.config.ack_timeout())
            .await
    }

    /// Reload missions from the store and resume assignment.
    ///
    /// Active missions keep their vehicle unless it already owns another
    /// active mission, in which case the later one goes back to the queue.
    pub async fn restore(&self) -> Result<usize> {
        let mut missions = self.store.load_missions().await?;
        missions.sort_by_key(|m| m.created_at);
        let count = missions.len();

        let (changes, lane) = {
            let mut state = self.state.lock().await;
            let mut changes = Changes::default();

            for mission in missions {
                let conflict = mission.status == MissionStatus::Active
                    && mission
                        .assigned_to
                        .as_deref()
                        .map_or(true, |cs| state.missions.active_for(cs).is_some());

                if conflict {
                    warn!(mission_id = %mission.id, assigned_to = ?mission.assigned_to, "Restored mission conflicts, re-queued");
                    let queued = state.missions.enqueue(mission).clone();
                    changes.updated.push(queued);
                } else {
                    state.missions.insert(mission);
                }
            }

            state.drain_assignments(self.config.min_assignment_battery_percent, &mut changes);
            (changes, self.commit_lane.lock().await)
        };

        info!(missions = count, "Restored missions from store");
        self.commit(changes, lane).await;
        Ok(count)
    }

    /// Run `try_assign_next` on a fixed interval as a backstop for missed triggers
    pub fn spawn_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(this.config.sweep_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let assigned = this.try_assign_next().await;
                if assigned > 0 {
                    info!(assigned, "Sweep assigned queued missions");
                }
            }
        })
    }

    fn build_mission(&self, request: MissionRequest) -> Result<Mission> {
        let waypoints = request.waypoints.unwrap_or_default();
        if waypoints.is_empty() {
            return Err(CoordinatorError::InvalidInput(
                "waypoints must contain at least one [lat, lng] pair".into(),
            ));
        }
        if let Some(bad) = waypoints.iter().find(|w| !is_valid_coordinate(w)) {
            return Err(CoordinatorError::InvalidInput(format!(
                "waypoint [{}, {}] is out of range",
                bad.lat(),
                bad.lng()
            )));
        }

        Ok(Mission {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            waypoints,
            supplies: request.supplies.unwrap_or_default(),
            priority: request.priority.unwrap_or(self.config.default_priority),
            metadata: request.metadata.unwrap_or_default(),
            status: MissionStatus::Queued,
            assigned_to: None,
            created_at: resqterra_shared::now(),
            seq: 0,
        })
    }

    /// Persist every touched mission, then publish and emit notifications.
    /// Store failures are logged; in-memory state stays authoritative.
    ///
    /// `_lane` must be taken while the state lock that produced `changes` is
    /// still held. Never lock `state` in here.
    async fn commit(&self, changes: Changes, _lane: MutexGuard<'_, ()>) {
        if changes.is_empty() {
            return;
        }

        // Latest snapshot per mission, so concurrent saves never race on one id
        let mut latest: HashMap<&str, &Mission> = HashMap::new();
        for mission in changes.created.iter().chain(changes.updated.iter()) {
            latest.insert(mission.id.as_str(), mission);
        }
        let results = join_all(latest.values().map(|m| self.store.save_mission(m))).await;
        for (mission, result) in latest.values().zip(results) {
            if let Err(e) = result {
                error!(mission_id = %mission.id, error = %e, "Failed to persist mission");
            }
        }

        for mission in &changes.created {
            self.publish_mission(mission).await;
            self.emit(FleetEvent::MissionCreated(mission.clone()));
        }
        for mission in &changes.updated {
            self.publish_mission(mission).await;
            self.emit(FleetEvent::MissionUpdated(mission.clone()));
        }

        if self.config.confirm_assignments {
            if let Some(this) = self.me.upgrade() {
                for assignment in changes.assignments {
                    tokio::spawn(Arc::clone(&this).confirm_assignment(assignment));
                }
            }
        }
    }

    /// Fire-and-forget mission record on the mission's channel.
    /// Consumers must treat duplicates as idempotent.
    async fn publish_mission(&self, mission: &Mission) {
        let result = match codec::encode(mission) {
            Ok(payload) => self
                .publisher
                .publish(&topics::mission(&mission.id), payload)
                .await
                .map_err(CoordinatorError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(mission_id = %mission.id, transport = self.publisher.name(), error = %e, "Mission notification not published");
        }
    }

    fn emit(&self, event: FleetEvent) {
        // No observers is fine
        let _ = self.events.send(event);
    }

    /// Ask the assignee to confirm; re-queue the mission if it never answers
    fn confirm_assignment(self: Arc<Self>, assignment: Assignment) -> BoxFuture<'static, ()> {
        async move {
            let command = CommandMessage::new(START_MISSION_COMMAND)
                .with_meta(Some(json!({ "missionId": assignment.mission_id })));
            let result = self
                .tracker
                .dispatch(&assignment.callsign, command, true, self.config.ack_timeout())
                .await;

            match result {
                Ok(outcome) => {
                    debug!(mission_id = %assignment.mission_id, callsign = %assignment.callsign, ?outcome, "Assignment confirmed");
                }
                Err(CoordinatorError::AckTimeout { .. }) => {
                    let (changes, lane) = {
                        let mut state = self.state.lock().await;
                        let mut changes = Changes::default();
                        let still_owned = state
                            .missions
                            .get(&assignment.mission_id)
                            .is_some_and(|m| m.is_active_for(&assignment.callsign));
                        if still_owned && state.release(&assignment.mission_id, &mut changes) {
                            warn!(
                                mission_id = %assignment.mission_id,
                                callsign = %assignment.callsign,
                                "Assignment unconfirmed, mission returned to queue"
                            );
                            state.drain_assignments(
                                self.config.min_assignment_battery_percent,
                                &mut changes,
                            );
                        }
                        (changes, self.commit_lane.lock().await)
                    };
                    self.commit(changes, lane).await;
                }
                Err(e) => {
                    warn!(mission_id = %assignment.mission_id, callsign = %assignment.callsign, error = %e, "Assignment confirmation not sent");
                }
            }
        }
        .boxed()
    }
}

fn is_valid_coordinate(waypoint: &Waypoint) -> bool {
    (-90.0..=90.0).contains(&waypoint.lat()) && (-180.0..=180.0).contains(&waypoint.lng())
}
