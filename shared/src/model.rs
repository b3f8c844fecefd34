//! Vehicle and mission records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Flight mode reported by a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleMode {
    #[default]
    Idle,
    Active,
    /// Return-to-launch
    Rtl,
    Loiter,
    Auto,
    /// Any mode string the coordinator does not know about
    Unknown,
}

impl VehicleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleMode::Idle => "IDLE",
            VehicleMode::Active => "ACTIVE",
            VehicleMode::Rtl => "RTL",
            VehicleMode::Loiter => "LOITER",
            VehicleMode::Auto => "AUTO",
            VehicleMode::Unknown => "UNKNOWN",
        }
    }

    pub fn is_rtl(&self) -> bool {
        matches!(self, VehicleMode::Rtl)
    }
}

impl From<&str> for VehicleMode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "IDLE" => VehicleMode::Idle,
            "ACTIVE" => VehicleMode::Active,
            "RTL" => VehicleMode::Rtl,
            "LOITER" => VehicleMode::Loiter,
            "AUTO" => VehicleMode::Auto,
            _ => VehicleMode::Unknown,
        }
    }
}

impl From<String> for VehicleMode {
    fn from(value: String) -> Self {
        VehicleMode::from(value.as_str())
    }
}

impl From<VehicleMode> for String {
    fn from(mode: VehicleMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for VehicleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    pub alt: f64,
    pub at: DateTime<Utc>,
}

/// Everything the coordinator knows about one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub callsign: String,
    /// Battery charge, 0-100
    pub battery: f64,
    pub mode: VehicleMode,
    pub position: Option<Position>,
    pub last_seen: DateTime<Utc>,
    /// Trailing positions, oldest first
    pub history: VecDeque<Position>,
}

impl Vehicle {
    /// Create a record for a vehicle seen for the first time
    pub fn new(callsign: impl Into<String>, seen_at: DateTime<Utc>) -> Self {
        Self {
            callsign: callsign.into(),
            battery: 100.0,
            mode: VehicleMode::Idle,
            position: None,
            last_seen: seen_at,
            history: VecDeque::new(),
        }
    }

    /// Record a new position, evicting the oldest entries beyond `capacity`
    pub fn push_position(&mut self, position: Position, capacity: usize) {
        self.position = Some(position);
        self.history.push_back(position);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

/// A `[lat, lng]` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint(pub f64, pub f64);

impl Waypoint {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lng(&self) -> f64 {
        self.1
    }
}

/// Lifecycle status of a mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionStatus::Completed | MissionStatus::Failed)
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MissionStatus::Queued => "queued",
            MissionStatus::Active => "active",
            MissionStatus::Completed => "completed",
            MissionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A unit of work to be flown by one vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub supplies: Vec<String>,
    /// Lower value = more urgent
    pub priority: i64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub status: MissionStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Insertion order, breaks ties between equal creation timestamps
    #[serde(skip)]
    pub seq: u64,
}

impl Mission {
    /// Whether `callsign` currently owns this mission
    pub fn is_active_for(&self, callsign: &str) -> bool {
        self.status == MissionStatus::Active && self.assigned_to.as_deref() == Some(callsign)
    }

    /// Queue ordering key: priority, then creation time, then insertion order
    pub fn queue_key(&self) -> (i64, DateTime<Utc>, u64) {
        (self.priority, self.created_at, self.seq)
    }
}
