//! Wire format encoding and decoding.
//!
//! Implements the 5-byte header format:
//! ```text
//! ┌───────┬──────────┬─────────────────┐
//! │ Tag   │ Length   │ Payload         │
//! │ 1 byte│ 4 bytes  │ `Length` bytes  │
//! │       │ uint32 BE│ (UTF-8 / JSON)  │
//! └───────┴──────────┴─────────────────┘
//! ```

use std::fmt;

use crate::error::{BridgeError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Default maximum payload size accepted from the peer (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Absolute maximum payload size the length field can express.
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = u32::MAX;

/// Message tags.
///
/// The set is closed; anything else decodes to [`MessageType::Unknown`] so
/// the dispatcher can answer it with an ERROR instead of dropping the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Success with no result, or an echo request.
    Ok,
    /// Process id announcement / request.
    Pid,
    /// Break the connection.
    Stop,
    /// Evaluate an expression, answer with its printable form.
    Repr,
    /// Execute statements.
    Exec,
    /// Answer to [`MessageType::Repr`].
    ReprRet,
    /// Evaluate code with an argument array.
    Eval,
    /// Answer to [`MessageType::Eval`].
    EvalRet,
    /// Decode and re-encode a value (serializer debugging).
    DebugRoundTrip,
    /// Failure report.
    Error,
    /// Tag outside the protocol.
    Unknown(u8),
}

impl MessageType {
    /// Tag byte on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::Ok => 0,
            MessageType::Pid => 1,
            MessageType::Stop => 2,
            MessageType::Repr => 3,
            MessageType::Exec => 4,
            MessageType::ReprRet => 5,
            MessageType::Eval => 10,
            MessageType::EvalRet => 11,
            MessageType::DebugRoundTrip => 253,
            MessageType::Error => 255,
            MessageType::Unknown(tag) => tag,
        }
    }

    /// Decode a tag byte.
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0 => MessageType::Ok,
            1 => MessageType::Pid,
            2 => MessageType::Stop,
            3 => MessageType::Repr,
            4 => MessageType::Exec,
            5 => MessageType::ReprRet,
            10 => MessageType::Eval,
            11 => MessageType::EvalRet,
            253 => MessageType::DebugRoundTrip,
            255 => MessageType::Error,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<u8> for MessageType {
    fn from(tag: u8) -> Self {
        MessageType::from_u8(tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Ok => f.write_str("OK"),
            MessageType::Pid => f.write_str("PID"),
            MessageType::Stop => f.write_str("STOP"),
            MessageType::Repr => f.write_str("REPR"),
            MessageType::Exec => f.write_str("EXEC"),
            MessageType::ReprRet => f.write_str("REPRRET"),
            MessageType::Eval => f.write_str("EVAL"),
            MessageType::EvalRet => f.write_str("EVALRET"),
            MessageType::DebugRoundTrip => f.write_str("DEBUG_ROUNDTRIP"),
            MessageType::Error => f.write_str("ERROR"),
            MessageType::Unknown(tag) => write!(f, "#{}", tag),
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw tag byte.
    pub tag: u8,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(tag: u8, payload_length: u32) -> Self {
        Self {
            tag,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian length).
    ///
    /// # Example
    ///
    /// ```
    /// use arraybridge::protocol::Header;
    ///
    /// let bytes = Header::new(10, 0x0102).encode();
    /// assert_eq!(bytes, [10, 0, 0, 1, 2]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.tag;
        buf[1..5].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            tag: buf[0],
            payload_length: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// Typed view of the tag.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        MessageType::from_u8(self.tag)
    }

    /// Reject payloads above `max_payload_size`.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(BridgeError::MalformedMessage(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_byte_order() {
        let bytes = Header::new(0xFF, 0x0102_0304).encode();
        assert_eq!(bytes, [0xFF, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_header_decode() {
        let header = Header::decode(&[11, 0, 0, 0, 42]).unwrap();
        assert_eq!(header.tag, 11);
        assert_eq!(header.payload_length, 42);
        assert_eq!(header.message_type(), MessageType::EvalRet);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[0u8; 4]).is_none());
    }

    #[test]
    fn test_reserved_tag_values() {
        let expected = [
            (MessageType::Ok, 0),
            (MessageType::Pid, 1),
            (MessageType::Stop, 2),
            (MessageType::Repr, 3),
            (MessageType::Exec, 4),
            (MessageType::ReprRet, 5),
            (MessageType::Eval, 10),
            (MessageType::EvalRet, 11),
            (MessageType::DebugRoundTrip, 253),
            (MessageType::Error, 255),
        ];
        for (ty, tag) in expected {
            assert_eq!(ty.as_u8(), tag);
            assert_eq!(MessageType::from_u8(tag), ty);
        }
    }

    #[test]
    fn test_unknown_tags_are_preserved() {
        for tag in [6u8, 9, 12, 100, 252, 254] {
            let ty = MessageType::from(tag);
            assert_eq!(ty, MessageType::Unknown(tag));
            assert_eq!(ty.as_u8(), tag);
        }
        assert_eq!(MessageType::Unknown(42).to_string(), "#42");
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = Header::new(0, 1_000_000);
        let err = header.validate(100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
        assert!(header.validate(ABSOLUTE_MAX_PAYLOAD_SIZE).is_ok());
    }
}
