//! Topic routing and JSON payload codec
//!
//! Inbound traffic arrives as `(topic, payload)` pairs:
//! ```text
//! drone/{callsign}/telemetry   -> TelemetryMessage
//! drone/{callsign}/event       -> EventMessage
//! drone/{callsign}/ack         -> AckMessage
//! ```
//! Outbound messages are serialized to JSON bytes.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{topics, InboundMessage};

/// Maximum payload size (1 MB) to prevent memory exhaustion
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Unroutable topic: {0}")]
    UnknownTopic(String),

    #[error("Topic {0} does not name a vehicle")]
    MissingCallsign(String),

    #[error("JSON decode error on {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Message category derived from the last topic segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Telemetry,
    Event,
    Ack,
}

/// Split a vehicle topic into its callsign and message category
pub fn route(topic: &str) -> Result<(&str, Category), CodecError> {
    let mut parts = topic.split('/');
    let (Some(prefix), Some(callsign), Some(kind), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CodecError::UnknownTopic(topic.to_string()));
    };

    if prefix != topics::VEHICLE_PREFIX {
        return Err(CodecError::UnknownTopic(topic.to_string()));
    }
    if callsign.is_empty() {
        return Err(CodecError::MissingCallsign(topic.to_string()));
    }

    let category = match kind {
        topics::TELEMETRY => Category::Telemetry,
        topics::EVENT => Category::Event,
        topics::ACK => Category::Ack,
        _ => return Err(CodecError::UnknownTopic(topic.to_string())),
    };

    Ok((callsign, category))
}

/// Topics the coordinator itself publishes to: vehicle commands and mission updates
pub fn is_outbound(topic: &str) -> bool {
    if topic.starts_with(&format!("{}/", topics::MISSION_PREFIX)) {
        return true;
    }
    let mut parts = topic.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(topics::VEHICLE_PREFIX), Some(_), Some(topics::COMMAND), None)
    )
}

/// Decode an inbound payload according to its topic
pub fn decode(topic: &str, payload: &[u8]) -> Result<InboundMessage, CodecError> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(payload.len()));
    }

    let (topic_callsign, category) = route(topic)?;
    let decode_err = |source| CodecError::Decode {
        topic: topic.to_string(),
        source,
    };

    let message = match category {
        Category::Telemetry => {
            let msg: crate::TelemetryMessage =
                serde_json::from_slice(payload).map_err(decode_err)?;
            let callsign = msg
                .callsign
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| topic_callsign.to_string());
            InboundMessage::Telemetry { callsign, msg }
        }
        Category::Event => InboundMessage::Event {
            callsign: topic_callsign.to_string(),
            msg: serde_json::from_slice(payload).map_err(decode_err)?,
        },
        Category::Ack => InboundMessage::Ack {
            callsign: topic_callsign.to_string(),
            msg: serde_json::from_slice(payload).map_err(decode_err)?,
        },
    };

    Ok(message)
}

/// Encode an outbound message as JSON bytes
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, CodecError> {
    let buf = serde_json::to_vec(message)?;
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(buf.len()));
    }
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandMessage, VehicleMode};

    #[test]
    fn test_decode_telemetry_uses_body_callsign() {
        let msg = decode(
            "drone/D9/telemetry",
            br#"{"callsign":"D1","battery":18,"mode":"ACTIVE","lat":1.0,"lng":2.0}"#,
        )
        .expect("decode failed");

        match msg {
            InboundMessage::Telemetry { callsign, msg } => {
                assert_eq!(callsign, "D1");
                assert_eq!(msg.battery, Some(18.0));
                assert_eq!(msg.mode, Some(VehicleMode::Active));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_telemetry_falls_back_to_topic_callsign() {
        let msg = decode("drone/D2/telemetry", br#"{"battery":50}"#).expect("decode failed");
        assert_eq!(msg.callsign(), "D2");
    }

    #[test]
    fn test_decode_ack() {
        let msg = decode("drone/D1/ack", br#"{"cmdId":"abc","status":"ok"}"#).expect("decode failed");
        match msg {
            InboundMessage::Ack { msg, .. } => {
                assert_eq!(msg.cmd_id, "abc");
                assert_eq!(msg.status.as_deref(), Some("ok"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload() {
        let result = decode("drone/D1/telemetry", b"{not json");
        assert!(matches!(result, Err(CodecError::Decode { .. })));

        let result = decode("drone/D1/ack", br#"{"status":"ok"}"#);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_unknown_topics() {
        assert!(matches!(route("drone/D1"), Err(CodecError::UnknownTopic(_))));
        assert!(matches!(route("drone/D1/video"), Err(CodecError::UnknownTopic(_))));
        assert!(matches!(route("plane/D1/ack"), Err(CodecError::UnknownTopic(_))));
        assert!(matches!(route("drone//ack"), Err(CodecError::MissingCallsign(_))));
    }

    #[test]
    fn test_outbound_topics() {
        assert!(is_outbound("drone/D1/cmd"));
        assert!(is_outbound("mission/m-1"));
        assert!(!is_outbound("drone/D1/ack"));
        assert!(!is_outbound("missions"));
    }

    #[test]
    fn test_message_too_large() {
        let payload = vec![b' '; MAX_MESSAGE_SIZE + 1];
        let result = decode("drone/D1/telemetry", &payload);
        assert!(matches!(result, Err(CodecError::MessageTooLarge(_))));
    }

    #[test]
    fn test_encode_command() {
        let bytes = encode(&CommandMessage::new("RTL")).expect("encode failed");
        assert_eq!(&bytes[..], br#"{"cmd":"RTL"}"#);
    }
}
