//! Message shapes exchanged with vehicles and request callers
//!
//! Everything on the wire is JSON. Inbound messages arrive on per-vehicle
//! topics, outbound commands go to a per-vehicle command topic and mission
//! updates to a per-mission topic.

use crate::model::{VehicleMode, Waypoint};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Topic naming for the pub/sub transport
pub mod topics {
    pub const VEHICLE_PREFIX: &str = "drone";
    pub const MISSION_PREFIX: &str = "mission";

    pub const TELEMETRY: &str = "telemetry";
    pub const EVENT: &str = "event";
    pub const ACK: &str = "ack";
    pub const COMMAND: &str = "cmd";

    /// `drone/{callsign}/telemetry`
    pub fn telemetry(callsign: &str) -> String {
        format!("{VEHICLE_PREFIX}/{callsign}/{TELEMETRY}")
    }

    /// `drone/{callsign}/event`
    pub fn event(callsign: &str) -> String {
        format!("{VEHICLE_PREFIX}/{callsign}/{EVENT}")
    }

    /// `drone/{callsign}/ack`
    pub fn ack(callsign: &str) -> String {
        format!("{VEHICLE_PREFIX}/{callsign}/{ACK}")
    }

    /// `drone/{callsign}/cmd`
    pub fn command(callsign: &str) -> String {
        format!("{VEHICLE_PREFIX}/{callsign}/{COMMAND}")
    }

    /// `mission/{id}`
    pub fn mission(id: &str) -> String {
        format!("{MISSION_PREFIX}/{id}")
    }
}

/// Telemetry sample published by a vehicle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    /// Falls back to the callsign in the topic when absent
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub mode: Option<VehicleMode>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub alt: Option<f64>,
}

/// A `{lat, lng}` object attached to events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Detection or status event published by a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
    /// Any other fields the vehicle attached
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Acknowledgment of a previously dispatched command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckMessage {
    #[serde(rename = "cmdId")]
    pub cmd_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl AckMessage {
    pub fn new(cmd_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            cmd_id: cmd_id.into(),
            status: Some(status.into()),
        }
    }
}

/// Command published to a vehicle's command channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    #[serde(rename = "cmdId", default, skip_serializing_if = "Option::is_none")]
    pub cmd_id: Option<String>,
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl CommandMessage {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd_id: None,
            cmd: cmd.into(),
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Option<Value>) -> Self {
        self.meta = meta;
        self
    }

    /// Tag the command with the id its acknowledgment must carry
    pub fn tagged(mut self, cmd_id: impl Into<String>) -> Self {
        self.cmd_id = Some(cmd_id.into());
        self
    }
}

/// Request to create a mission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub waypoints: Option<Vec<Waypoint>>,
    #[serde(default)]
    pub supplies: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Request to put a mission on a specific vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceAssignRequest {
    pub mission_id: String,
    pub callsign: String,
}

/// Request to send an ack-tracked command to a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub callsign: String,
    pub cmd: String,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// A decoded inbound message together with the vehicle it came from
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Telemetry { callsign: String, msg: TelemetryMessage },
    Event { callsign: String, msg: EventMessage },
    Ack { callsign: String, msg: AckMessage },
}

impl InboundMessage {
    pub fn callsign(&self) -> &str {
        match self {
            InboundMessage::Telemetry { callsign, .. }
            | InboundMessage::Event { callsign, .. }
            | InboundMessage::Ack { callsign, .. } => callsign,
        }
    }
}
