//! Protocol module - wire format, framing, and message types.
//!
//! This module implements the binary framing used on the byte stream:
//! - 5-byte header encoding/decoding
//! - frame read/write over a [`Transport`](crate::transport::Transport)
//! - the closed set of message tags

mod frame;
mod message;
mod wire_format;

pub use frame::{build_frame, encode_frame, read_frame, write_frame, Frame};
pub use message::Message;
pub use wire_format::{
    Header, MessageType, ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
