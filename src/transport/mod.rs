//! Pub/sub transport boundary

mod local;
mod traits;

pub use local::{BusMessage, LocalBus};
pub use traits::{Publisher, TransportError};
