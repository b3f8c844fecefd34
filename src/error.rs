//! Error taxonomy for coordinator operations

use crate::store::StoreError;
use crate::transport::TransportError;
use resqterra_shared::codec::CodecError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to request callers
///
/// Ingestion never returns these to anyone: a bad inbound message is logged
/// and dropped.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Malformed request, rejected before any mutation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Per-vehicle command throttle tripped; nothing was sent
    #[error("Rate limited: command to {callsign} rejected, retry in {retry_after:?}")]
    RateLimited {
        callsign: String,
        retry_after: Duration,
    },

    /// The command went out but its fate is unknown
    #[error("No acknowledgment from {callsign} for command {cmd_id} within {timeout:?}")]
    AckTimeout {
        callsign: String,
        cmd_id: String,
        timeout: Duration,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
