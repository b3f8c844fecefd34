//! Simulated vehicles for local runs
//!
//! Each vehicle streams telemetry on a fixed interval, drains its battery while
//! flying, obeys `RTL`, and acknowledges every command tagged with an id. It
//! also watches `mission/{id}` and flies any mission assigned to it.

use crate::transport::{BusMessage, LocalBus, Publisher};
use resqterra_shared::{
    codec, topics, AckMessage, CommandMessage, Mission, TelemetryMessage, VehicleMode,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Battery at which a returned vehicle is ready to fly again
const RECHARGED_PERCENT: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub telemetry_interval: Duration,
    /// Battery lost per tick while not idle
    pub drain_per_tick: f64,
    /// Battery regained per tick while returning or idle
    pub charge_per_tick: f64,
    pub start_battery: f64,
    pub origin: (f64, f64),
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            telemetry_interval: Duration::from_millis(1000),
            drain_per_tick: 2.5,
            charge_per_tick: 5.0,
            start_battery: 100.0,
            origin: (0.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SimState {
    battery: f64,
    mode: VehicleMode,
    lat: f64,
    lng: f64,
    /// Mission this vehicle is flying, as last announced
    mission: Option<String>,
}

impl SimState {
    fn tick(&mut self, config: &SimConfig) {
        match self.mode {
            VehicleMode::Idle => {
                self.battery = (self.battery + config.charge_per_tick).min(RECHARGED_PERCENT);
            }
            VehicleMode::Rtl => {
                self.battery = (self.battery + config.charge_per_tick).min(RECHARGED_PERCENT);
                if self.battery >= RECHARGED_PERCENT {
                    self.mode = VehicleMode::Idle;
                }
            }
            _ => {
                self.battery = (self.battery - config.drain_per_tick).max(0.0);
                self.lat += 0.0001;
                self.lng += 0.0001;
            }
        }
    }

    fn apply(&mut self, command: &CommandMessage) -> &'static str {
        match command.cmd.to_ascii_uppercase().as_str() {
            "RTL" => {
                self.mode = VehicleMode::Rtl;
                "ok"
            }
            "START_MISSION" if self.mode != VehicleMode::Rtl => {
                self.mode = VehicleMode::Active;
                "ok"
            }
            "LOITER" => {
                self.mode = VehicleMode::Loiter;
                "ok"
            }
            _ => "rejected",
        }
    }

    fn on_mission(&mut self, callsign: &str, mission: &Mission) {
        if mission.is_active_for(callsign) {
            if self.mode != VehicleMode::Rtl {
                self.mode = VehicleMode::Active;
                self.mission = Some(mission.id.clone());
            }
        } else if self.mission.as_deref() == Some(mission.id.as_str()) {
            self.mission = None;
            if self.mode != VehicleMode::Rtl {
                self.mode = VehicleMode::Idle;
            }
        }
    }

    fn telemetry(&self, callsign: &str) -> TelemetryMessage {
        TelemetryMessage {
            callsign: Some(callsign.to_string()),
            battery: Some(self.battery),
            mode: Some(self.mode),
            lat: Some(self.lat),
            lng: Some(self.lng),
            alt: Some(if self.mode == VehicleMode::Idle { 0.0 } else { 40.0 }),
        }
    }
}

pub struct SimulatedVehicle {
    callsign: String,
    config: SimConfig,
    state: SimState,
    bus: LocalBus,
}

impl SimulatedVehicle {
    pub fn new(callsign: impl Into<String>, config: SimConfig, bus: LocalBus) -> Self {
        let state = SimState {
            battery: config.start_battery,
            mode: VehicleMode::Idle,
            lat: config.origin.0,
            lng: config.origin.1,
            mission: None,
        };
        Self {
            callsign: callsign.into(),
            config,
            state,
            bus,
        }
    }

    /// Spawn `count` vehicles named `SIM-1`..`SIM-n`
    pub fn spawn_fleet(count: usize, config: SimConfig, bus: &LocalBus) -> Vec<JoinHandle<()>> {
        (1..=count)
            .map(|i| SimulatedVehicle::new(format!("SIM-{i}"), config.clone(), bus.clone()).spawn())
            .collect()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut rx = self.bus.subscribe();
        let command_topic = topics::command(&self.callsign);
        let mission_prefix = format!("{}/", topics::MISSION_PREFIX);
        let mut ticker = interval(self.config.telemetry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(callsign = %self.callsign, "Simulated vehicle started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.state.tick(&self.config);
                    let telemetry = self.state.telemetry(&self.callsign);
                    self.publish(&topics::telemetry(&self.callsign), &telemetry).await;
                }
                received = rx.recv() => {
                    match received {
                        Ok(BusMessage { topic, payload }) if topic == command_topic => {
                            self.on_command(&payload).await;
                        }
                        Ok(BusMessage { topic, payload }) if topic.starts_with(&mission_prefix) => {
                            self.on_mission(&payload);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(callsign = %self.callsign, missed, "Simulated vehicle missed messages");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    async fn on_command(&mut self, payload: &[u8]) {
        let command: CommandMessage = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(callsign = %self.callsign, error = %e, "Simulated vehicle got a bad command");
                return;
            }
        };

        let status = self.state.apply(&command);
        debug!(callsign = %self.callsign, cmd = %command.cmd, status, mode = %self.state.mode, "Simulated vehicle handled command");

        if let Some(cmd_id) = command.cmd_id {
            let ack = AckMessage::new(cmd_id, status);
            self.publish(&topics::ack(&self.callsign), &ack).await;
        }
    }

    fn on_mission(&mut self, payload: &[u8]) {
        let mission: Mission = match serde_json::from_slice(payload) {
            Ok(mission) => mission,
            Err(e) => {
                warn!(callsign = %self.callsign, error = %e, "Simulated vehicle got a bad mission update");
                return;
            }
        };

        let before = self.state.mode;
        self.state.on_mission(&self.callsign, &mission);
        if self.state.mode != before {
            info!(callsign = %self.callsign, mission_id = %mission.id, status = %mission.status, mode = %self.state.mode, "Simulated vehicle follows mission update");
        }
    }

    async fn publish<T: serde::Serialize>(&self, topic: &str, message: &T) {
        let result = match codec::encode(message) {
            Ok(payload) => self.bus.publish(topic, payload).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = result {
            error!(callsign = %self.callsign, topic, error = %e, "Simulated vehicle failed to publish");
        }
    }
}
