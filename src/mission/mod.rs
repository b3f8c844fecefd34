//! Mission Queue & Assignment selection
//!
//! The queue owns every mission record. Selection is pure: it reads the fleet
//! and the queue and proposes one mission/vehicle pair; applying it is the
//! coordinator's job.

mod assign;
mod queue;

pub use assign::{is_eligible, plan_next, select_vehicle, Assignment};
pub use queue::MissionQueue;
