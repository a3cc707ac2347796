//! Codec for encoding and decoding Pulse frames.
//!
//! Frames are MessagePack-encoded and length-prefixed so that several of them
//! can share one transport message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a frame to bytes.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded frame (named fields)
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec_named(frame)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);
    Ok(())
}

/// Read the length prefix and return the total encoded size of the frame
/// at the start of `data`, or `None` if the prefix itself is incomplete.
fn frame_len(data: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let Some(prefix) = data.get(..LENGTH_PREFIX_SIZE) else {
        return Ok(None);
    };
    let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }
    Ok(Some(LENGTH_PREFIX_SIZE + length))
}

/// Decode a single frame from bytes.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    let total = frame_len(data)?
        .ok_or(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE.saturating_sub(data.len())))?;
    if data.len() < total {
        return Err(ProtocolError::Incomplete(total - data.len()));
    }

    Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total])?)
}

/// Try to decode a frame from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(frame))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    let Some(total) = frame_len(buf)? else {
        return Ok(None);
    };
    if buf.len() < total {
        return Ok(None);
    }

    let mut frame_bytes = buf.split_to(total);
    frame_bytes.advance(LENGTH_PREFIX_SIZE);
    Ok(Some(rmp_serde::from_slice(&frame_bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ErrorBody;
    use serde_json::json;

    #[test]
    fn test_encode_decode_event_frames() {
        let frames = vec![
            Frame::event("msg", json!("message")),
            Frame::event_with_ack(3, "user:update", json!({"email": "a@b.com", "tags": [1, 2]})),
            Frame::ack_ok(3, json!("success")),
            Frame::ack_err(4, ErrorBody::new("Not authorized")),
            Frame::pong(Some(42)),
            Frame::connected("conn-123", 30000),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            assert_eq!(decode(&encoded).unwrap(), frame);
        }
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&Frame::event("msg", json!(null))).unwrap();

        match decode(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        buf.extend_from_slice(&[0u8; 8]);

        match decode(&buf) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_streaming_decode_waits_for_full_frame() {
        let first = Frame::event("a", json!(1));
        let second = Frame::event_with_ack(2, "b", json!(2));

        let mut wire = BytesMut::new();
        encode_into(&first, &mut wire).unwrap();
        encode_into(&second, &mut wire).unwrap();

        let split = wire.len() - 3;
        let mut buf = BytesMut::from(&wire[..split]);

        assert_eq!(decode_from(&mut buf).unwrap(), Some(first));
        assert_eq!(decode_from(&mut buf).unwrap(), None);

        buf.extend_from_slice(&wire[split..]);
        assert_eq!(decode_from(&mut buf).unwrap(), Some(second));
        assert!(buf.is_empty());
    }
}
