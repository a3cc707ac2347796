//! Frame types for the Pulse event protocol.
//!
//! A connection exchanges named events. An event may carry a request ID, in
//! which case the peer answers with exactly one `Ack` frame for that ID.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 2;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Event = 0x01,
    Ack = 0x02,
    Ping = 0x03,
    Pong = 0x04,
    Connected = 0x05,
}

/// Error payload carried by acks and `error` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub message: String,
    /// Structured detail, when the failing stage reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorBody {
    /// Create an error body with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Convert into a JSON value suitable for an event payload.
    #[must_use]
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// A named event with a JSON payload.
    #[serde(rename = "event")]
    Event {
        /// Request ID; present when the sender expects an `Ack`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        payload: Value,
    },

    /// Response to an event that carried a request ID.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged event.
        id: u64,
        /// Error, if the event failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
        /// Result, if the event succeeded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Connection established response.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Event { .. } => FrameType::Event,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Create a fire-and-forget event frame.
    #[must_use]
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            id: None,
            event: event.into(),
            payload,
        }
    }

    /// Create an event frame that expects an `Ack`.
    #[must_use]
    pub fn event_with_ack(id: u64, event: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            id: Some(id),
            event: event.into(),
            payload,
        }
    }

    /// Create a successful ack.
    #[must_use]
    pub fn ack_ok(id: u64, result: Value) -> Self {
        Frame::Ack {
            id,
            error: None,
            result: Some(result),
        }
    }

    /// Create a failed ack.
    #[must_use]
    pub fn ack_err(id: u64, error: ErrorBody) -> Self {
        Frame::Ack {
            id,
            error: Some(error),
            result: None,
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type() {
        let event = Frame::event("msg", json!("hello"));
        assert_eq!(event.frame_type(), FrameType::Event);

        let ack = Frame::ack_ok(1, json!("success"));
        assert_eq!(ack.frame_type(), FrameType::Ack);
    }

    #[test]
    fn test_event_json_shape() {
        let frame = Frame::event_with_ack(7, "msg", json!({"text": "hi"}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "event", "id": 7, "event": "msg", "payload": {"text": "hi"}})
        );

        let fire_and_forget = serde_json::to_value(Frame::event("msg", Value::Null)).unwrap();
        assert!(fire_and_forget.get("id").is_none());
    }

    #[test]
    fn test_error_body_value() {
        let body = ErrorBody::new("Invalid data").with_data(json!({"field": "email"}));
        assert_eq!(
            body.into_value(),
            json!({"message": "Invalid data", "data": {"field": "email"}})
        );

        assert_eq!(
            ErrorBody::new("Not authorized").into_value(),
            json!({"message": "Not authorized"})
        );
    }
}
