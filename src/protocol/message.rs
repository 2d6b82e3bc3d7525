//! Messages: frames with a typed tag.

use bytes::Bytes;

use super::frame::Frame;
use super::wire_format::MessageType;

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type.
    pub kind: MessageType,
    /// Payload (UTF-8 text or JSON, depending on the type).
    pub payload: Bytes,
}

impl Message {
    /// Create a message.
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Message with an empty payload.
    pub fn empty(kind: MessageType) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Payload decoded as UTF-8 (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Check if this is an ERROR message.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.kind == MessageType::Error
    }

    /// Convert to a frame for the wire.
    pub fn into_frame(self) -> Frame {
        Frame::new(self.kind.as_u8(), self.payload)
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Self {
            kind: frame.message_type(),
            payload: frame.payload,
        }
    }
}
