//! End-to-end coordinator scenarios driven through the public API

use futures::future::join_all;
use resqterra_coordinator::command::DispatchOutcome;
use resqterra_coordinator::sim::{SimConfig, SimulatedVehicle};
use resqterra_coordinator::store::{MemoryStore, MissionStore};
use resqterra_coordinator::transport::LocalBus;
use resqterra_coordinator::{Coordinator, CoordinatorConfig, CoordinatorError, Ingested, Ingestor};
use resqterra_shared::{
    CommandRequest, ForceAssignRequest, Mission, MissionRequest, MissionStatus, TelemetryMessage,
    VehicleMode, Waypoint,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    coordinator: Arc<Coordinator>,
    ingestor: Ingestor,
    store: Arc<MemoryStore>,
    bus: LocalBus,
}

fn fixture(config: CoordinatorConfig) -> Fixture {
    let bus = LocalBus::new(1024);
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(config, Arc::new(bus.clone()), store.clone());
    Fixture {
        ingestor: Ingestor::new(coordinator.clone()),
        coordinator,
        store,
        bus,
    }
}

fn telemetry(battery: f64, mode: VehicleMode) -> TelemetryMessage {
    TelemetryMessage {
        battery: Some(battery),
        mode: Some(mode),
        ..Default::default()
    }
}

fn mission_request(priority: i64) -> MissionRequest {
    MissionRequest {
        name: Some(format!("p{priority}")),
        waypoints: Some(vec![Waypoint(47.0, 8.0)]),
        priority: Some(priority),
        ..Default::default()
    }
}

fn assert_one_active_per_vehicle(missions: &[Mission]) {
    let mut owners: HashMap<&str, usize> = HashMap::new();
    for m in missions.iter().filter(|m| m.status == MissionStatus::Active) {
        let owner = m.assigned_to.as_deref().expect("active mission without assignee");
        *owners.entry(owner).or_default() += 1;
    }
    assert!(owners.values().all(|&n| n == 1), "double assignment: {:?}", owners);
}

#[tokio::test]
async fn test_battery_failsafe_reassigns_mission() {
    let f = fixture(CoordinatorConfig::default());

    f.ingestor
        .handle("drone/D1/telemetry", br#"{"battery":90,"mode":"IDLE"}"#)
        .await;
    let m1 = f.coordinator.create_mission(mission_request(5)).await.unwrap();
    assert!(m1.is_active_for("D1"));

    f.ingestor
        .handle("drone/D2/telemetry", br#"{"battery":80,"mode":"IDLE"}"#)
        .await;
    let outcome = f
        .ingestor
        .handle("drone/D1/telemetry", br#"{"battery":18,"mode":"ACTIVE"}"#)
        .await;

    match outcome {
        Ingested::Telemetry(vehicle) => assert_eq!(vehicle.mode, VehicleMode::Rtl),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(f.coordinator.vehicle("D1").await.unwrap().mode, VehicleMode::Rtl);

    let m1 = f.coordinator.mission(&m1.id).await.unwrap();
    assert_eq!(m1.status, MissionStatus::Active);
    assert_eq!(m1.assigned_to.as_deref(), Some("D2"));
    assert_eq!(f.store.mission(&m1.id).await.unwrap().assigned_to.as_deref(), Some("D2"));
}

#[tokio::test]
async fn test_battery_failsafe_without_spare_vehicle() {
    let f = fixture(CoordinatorConfig::default());

    f.coordinator.ingest_telemetry("D1", &telemetry(90.0, VehicleMode::Idle)).await;
    let m1 = f.coordinator.create_mission(mission_request(5)).await.unwrap();
    f.coordinator.ingest_telemetry("D1", &telemetry(18.0, VehicleMode::Active)).await;

    let m1 = f.coordinator.mission(&m1.id).await.unwrap();
    assert_eq!(m1.status, MissionStatus::Queued);
    assert_eq!(m1.assigned_to, None);
}

#[tokio::test]
async fn test_human_detection_creates_one_mission() {
    let f = fixture(CoordinatorConfig::default());

    let outcome = f
        .ingestor
        .handle(
            "drone/D7/event",
            br#"{"event":"human_detected","location":{"lat":1,"lng":2},"confidence":0.9}"#,
        )
        .await;
    assert!(matches!(outcome, Ingested::Event { rescue: Some(_) }));

    let missions = f.coordinator.missions().await;
    assert_eq!(missions.len(), 1);
    assert_eq!(missions[0].waypoints, vec![Waypoint(1.0, 2.0)]);
    assert!(matches!(missions[0].status, MissionStatus::Queued | MissionStatus::Active));
}

#[tokio::test]
async fn test_empty_waypoints_rejected_without_record() {
    let f = fixture(CoordinatorConfig::default());

    let request = MissionRequest {
        waypoints: Some(vec![]),
        ..Default::default()
    };
    let result = f.coordinator.create_mission(request).await;

    assert!(matches!(result, Err(CoordinatorError::InvalidInput(_))));
    assert!(f.coordinator.missions().await.is_empty());
    assert!(f.store.load_missions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_priority_then_creation_order() {
    let f = fixture(CoordinatorConfig::default());

    let mut ids = HashMap::new();
    for (label, priority) in [("a", 5), ("b", 1), ("c", 5), ("d", 3)] {
        let m = f.coordinator.create_mission(mission_request(priority)).await.unwrap();
        assert_eq!(m.status, MissionStatus::Queued);
        ids.insert(label, m.id);
    }

    // Vehicles come online one at a time; each takes the most urgent mission left
    for (callsign, expected) in [("D1", "b"), ("D2", "d"), ("D3", "a"), ("D4", "c")] {
        f.coordinator.ingest_telemetry(callsign, &telemetry(90.0, VehicleMode::Idle)).await;
        let mission = f.coordinator.mission(&ids[expected]).await.unwrap();
        assert!(mission.is_active_for(callsign), "{callsign} should fly {expected}");
    }
}

#[tokio::test]
async fn test_concurrent_triggers_never_double_assign() {
    let f = fixture(CoordinatorConfig::default());
    let coordinator = f.coordinator.clone();

    let creates = (0..20).map(|i| coordinator.create_mission(mission_request(i % 4)));
    let reports = (0..8).map(|i| {
        let c = coordinator.clone();
        async move {
            c.ingest_telemetry(&format!("D{i}"), &telemetry(40.0 + f64::from(i) * 5.0, VehicleMode::Idle))
                .await;
        }
    });
    let sweeps = (0..10).map(|_| coordinator.try_assign_next());

    let (created, _, _) = tokio::join!(join_all(creates), join_all(reports), join_all(sweeps));
    assert!(created.iter().all(Result::is_ok));

    let missions = coordinator.missions().await;
    assert_one_active_per_vehicle(&missions);
    let active = missions.iter().filter(|m| m.status == MissionStatus::Active).count();
    assert_eq!(active, 8);

    // Nothing left to assign
    assert_eq!(coordinator.try_assign_next().await, 0);
}

#[tokio::test]
async fn test_force_assign_unknown_mission() {
    let f = fixture(CoordinatorConfig::default());
    f.coordinator.ingest_telemetry("D1", &telemetry(90.0, VehicleMode::Idle)).await;

    let result = f
        .coordinator
        .force_assign(ForceAssignRequest {
            mission_id: "does-not-exist".into(),
            callsign: "D1".into(),
        })
        .await;
    assert!(matches!(result, Err(CoordinatorError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_commands_time_out_without_leaking() {
    let f = fixture(CoordinatorConfig::default());

    for _ in 0..5 {
        let result = f
            .coordinator
            .send_command(CommandRequest {
                callsign: "D1".into(),
                cmd: "LOITER".into(),
                meta: None,
            })
            .await;
        assert!(matches!(result, Err(CoordinatorError::AckTimeout { .. })));
    }
    assert_eq!(f.coordinator.tracker().pending_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_command_within_interval_is_rejected() {
    let f = fixture(CoordinatorConfig::default());
    let mut rx = f.bus.subscribe();

    let c = f.coordinator.clone();
    let first = tokio::spawn(async move {
        c.send_command(CommandRequest {
            callsign: "D1".into(),
            cmd: "LOITER".into(),
            meta: None,
        })
        .await
    });
    let sent = rx.recv().await.unwrap();
    assert_eq!(sent.topic, "drone/D1/cmd");

    let second = f
        .coordinator
        .send_command(CommandRequest {
            callsign: "D1".into(),
            cmd: "RTL".into(),
            meta: None,
        })
        .await;
    assert!(matches!(second, Err(CoordinatorError::RateLimited { .. })));

    assert!(matches!(first.await.unwrap(), Err(CoordinatorError::AckTimeout { .. })));
    // Only the first command ever reached the transport
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_assignment_returns_to_queue() {
    let config = CoordinatorConfig {
        confirm_assignments: true,
        ..Default::default()
    };
    let f = fixture(config);

    f.coordinator.ingest_telemetry("D1", &telemetry(90.0, VehicleMode::Idle)).await;
    let mission = f.coordinator.create_mission(mission_request(5)).await.unwrap();
    assert!(mission.is_active_for("D1"));

    // D1 stays silent and drops below the assignment threshold
    f.coordinator.ingest_telemetry("D1", &telemetry(30.0, VehicleMode::Active)).await;
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let mission = f.coordinator.mission(&mission.id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Queued);
    assert_eq!(mission.assigned_to, None);
}

#[tokio::test]
async fn test_simulated_vehicle_acknowledges_commands() {
    let f = fixture(CoordinatorConfig::default());
    let inbound = f.bus.subscribe();
    let ingestor = Ingestor::new(f.coordinator.clone());
    let ingest = tokio::spawn(async move { ingestor.run(inbound).await });

    let config = SimConfig {
        telemetry_interval: Duration::from_millis(20),
        ..Default::default()
    };
    let sim = SimulatedVehicle::new("SIM-1", config, f.bus.clone()).spawn();

    // Wait for the vehicle to show up
    let mut seen = false;
    for _ in 0..100 {
        if f.coordinator.vehicle("SIM-1").await.is_some() {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(seen, "simulated vehicle never reported");

    let outcome = f
        .coordinator
        .send_command(CommandRequest {
            callsign: "SIM-1".into(),
            cmd: "LOITER".into(),
            meta: None,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Acked { status: Some(ref s), .. } if s == "ok"));

    sim.abort();
    ingest.abort();
}
