//! Per-vehicle command throttle

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between two commands to the same vehicle.
/// Vehicles are throttled independently.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_sent: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: HashMap::new(),
        }
    }

    /// Check whether a command may go to `callsign` now.
    ///
    /// Returns the remaining wait when the previous command was too recent.
    pub fn check(&self, callsign: &str, now: Instant) -> Result<(), Duration> {
        match self.last_sent.get(callsign) {
            None => Ok(()),
            Some(last) => {
                let elapsed = now.saturating_duration_since(*last);
                if elapsed >= self.min_interval {
                    Ok(())
                } else {
                    Err(self.min_interval - elapsed)
                }
            }
        }
    }

    /// Record that a command went to `callsign`
    pub fn record(&mut self, callsign: &str, now: Instant) {
        self.last_sent.insert(callsign.to_string(), now);
    }

    /// Check and record in one step. A rejected attempt does not reset the window.
    pub fn try_acquire(&mut self, callsign: &str, now: Instant) -> Result<(), Duration> {
        self.check(callsign, now)?;
        self.record(callsign, now);
        Ok(())
    }
}
