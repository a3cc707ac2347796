//! # pulse-protocol
//!
//! Wire protocol definitions for Pulse event routing.
//!
//! This crate defines the binary protocol spoken between a Pulse server and
//! its clients: named events with JSON payloads, acknowledgements, and
//! keepalives.
//!
//! ## Frame Types
//!
//! - `Event` - A named event, optionally carrying a request ID
//! - `Ack` - The single response to an event that carried an ID
//! - `Ping` / `Pong` - Keepalive
//! - `Connected` - Handshake completion
//!
//! ## Example
//!
//! ```rust
//! use pulse_protocol::{codec, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::event_with_ack(1, "msg", json!({"text": "Hello, world!"}));
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{ErrorBody, Frame, FrameType, PROTOCOL_VERSION};
