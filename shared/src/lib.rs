//! ResQTerra Shared Fleet Types
//!
//! This crate provides the vehicle and mission records, the message shapes
//! exchanged over the pub/sub transport, and the codec that turns raw topic
//! payloads into typed messages. It is shared between the coordinator and any
//! vehicle-side or tooling code that speaks the same protocol.

pub mod codec;
pub mod model;
pub mod protocol;
pub mod state_machine;

use chrono::{DateTime, Utc};

// Re-export commonly used types at crate root
pub use model::*;
pub use protocol::*;

/// Current wall-clock time in UTC
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Default operating parameters for the coordinator
pub mod defaults {
    /// Critical battery percentage - triggers forced RTL
    pub const BATTERY_CRITICAL_PERCENT: f64 = 20.0;

    /// Minimum battery percentage for a vehicle to receive a mission
    pub const BATTERY_MIN_ASSIGNMENT_PERCENT: f64 = 35.0;

    /// Command ACK timeout in milliseconds
    pub const COMMAND_ACK_TIMEOUT_MS: u64 = 3000;

    /// Minimum interval between two commands to the same vehicle
    pub const COMMAND_MIN_INTERVAL_MS: u64 = 200;

    /// Interval of the periodic assignment sweep
    pub const ASSIGNMENT_SWEEP_INTERVAL_MS: u64 = 5000;

    /// Number of trailing positions kept per vehicle
    pub const POSITION_HISTORY_CAPACITY: usize = 200;

    /// Priority given to missions created without one
    pub const MISSION_DEFAULT_PRIORITY: i64 = 5;

    /// Priority of automatically created rescue missions (most urgent band)
    pub const RESCUE_MISSION_PRIORITY: i64 = 1;

    /// Detection events that spawn a rescue mission
    pub const RESCUE_EVENTS: &[&str] = &["human_detected"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_ordering() {
        assert!(defaults::BATTERY_CRITICAL_PERCENT < defaults::BATTERY_MIN_ASSIGNMENT_PERCENT);
        assert!(defaults::RESCUE_MISSION_PRIORITY < defaults::MISSION_DEFAULT_PRIORITY);
    }
}
