//! Fleet State Store
//!
//! Authoritative in-memory record of every vehicle the coordinator has heard
//! from. Records are created on first telemetry and never removed.

mod store;

pub use store::{FleetStore, Upserted};
