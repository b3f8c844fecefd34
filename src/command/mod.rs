//! Command/Ack Tracker
//!
//! This module handles:
//! - Per-vehicle command throttling
//! - Tagging ack-tracked commands with a unique id
//! - Correlating acknowledgments to pending commands
//! - Deadline expiry of unacknowledged commands

mod rate_limit;
mod tracker;

pub use rate_limit::RateLimiter;
pub use tracker::{CommandTracker, DispatchOutcome};
