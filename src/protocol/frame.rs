//! Frame struct and the frame codec.
//!
//! A frame is a tag byte, a big-endian `u32` length and exactly that many
//! payload bytes. Payloads use `bytes::Bytes` so messages can be handed
//! around without copying.
//!
//! # Example
//!
//! ```
//! use arraybridge::protocol::{build_frame, Header, HEADER_SIZE};
//!
//! let bytes = build_frame(4, b"x = 1");
//! assert_eq!(bytes.len(), HEADER_SIZE + 5);
//! assert_eq!(Header::decode(&bytes).unwrap().payload_length, 5);
//! ```

use bytes::Bytes;

use super::wire_format::{Header, MessageType, HEADER_SIZE};
use crate::error::{BridgeError, Result};
use crate::transport::Transport;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw tag byte.
    pub tag: u8,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(tag: u8, payload: Bytes) -> Self {
        Self { tag, payload }
    }

    /// Typed view of the tag.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        MessageType::from_u8(self.tag)
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Encode into a contiguous buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_frame(self.tag, &self.payload)
    }
}

/// Build a frame as a single byte vector.
///
/// # Panics
///
/// Panics if `payload` is longer than `u32::MAX` bytes. Use [`encode_frame`]
/// when the size is not known to fit.
pub fn build_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(tag, payload).expect("payload exceeds u32::MAX bytes")
}

/// Encode a frame, rejecting payloads the length field cannot express.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        BridgeError::MalformedMessage(format!(
            "message body of {} bytes exceeds maximum length",
            payload.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&Header::new(tag, length).encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Write one frame to the transport.
pub async fn write_frame<T: Transport + ?Sized>(
    transport: &mut T,
    tag: u8,
    payload: &[u8],
) -> Result<()> {
    let bytes = encode_frame(tag, payload)?;
    transport.write_all(&bytes).await
}

/// Read one frame from the transport.
///
/// The caller is expected to have polled for readability; this function
/// has no cancellation point between the first header byte and the last
/// payload byte that it would want to honour.
///
/// # Errors
///
/// - [`BridgeError::ConnectionClosed`] if the stream ends before any byte
/// - [`BridgeError::MalformedMessage`] if it ends inside the header or body,
///   or the announced length is above `max_payload_size`
pub async fn read_frame<T: Transport + ?Sized>(
    transport: &mut T,
    max_payload_size: u32,
) -> Result<Frame> {
    let mut tag = [0u8; 1];
    match transport.read_exact(&mut tag).await {
        Ok(()) => {}
        Err(e) if is_eof(&e) => return Err(BridgeError::ConnectionClosed),
        Err(e) => return Err(e),
    }

    let mut length = [0u8; 4];
    transport.read_exact(&mut length).await.map_err(|e| {
        if is_eof(&e) {
            BridgeError::MalformedMessage("out of data while reading message header".into())
        } else {
            e
        }
    })?;

    let header = Header::new(tag[0], u32::from_be_bytes(length));
    header.validate(max_payload_size)?;

    let mut payload = vec![0u8; header.payload_length as usize];
    transport.read_exact(&mut payload).await.map_err(|e| {
        if is_eof(&e) {
            BridgeError::MalformedMessage("out of data while reading message body".into())
        } else {
            e
        }
    })?;

    Ok(Frame::new(header.tag, Bytes::from(payload)))
}

fn is_eof(err: &BridgeError) -> bool {
    matches!(err, BridgeError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
    use crate::transport::in_memory_pair;

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(10, b"hello");
        assert_eq!(&bytes[..HEADER_SIZE], &[10, 0, 0, 0, 5]);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        assert_eq!(build_frame(0, b""), vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(2, Bytes::from_static(b"STOP"));
        assert_eq!(frame.message_type(), MessageType::Stop);
        assert_eq!(frame.payload_len(), 4);
        assert_eq!(frame.encode().unwrap(), build_frame(2, b"STOP"));
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let (mut left, mut right) = in_memory_pair(4096);
        write_frame(&mut left, 11, br#"{"r":[],"d":[5],"t":0}"#)
            .await
            .unwrap();

        let frame = read_frame(&mut right, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
        assert_eq!(frame.message_type(), MessageType::EvalRet);
        assert_eq!(&frame.payload[..], br#"{"r":[],"d":[5],"t":0}"#);
    }

    #[tokio::test]
    async fn test_consecutive_frames_stay_aligned() {
        let (mut left, mut right) = in_memory_pair(4096);
        for i in 0u8..5 {
            write_frame(&mut left, i, &vec![i; i as usize]).await.unwrap();
        }
        for i in 0u8..5 {
            let frame = read_frame(&mut right, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
            assert_eq!(frame.tag, i);
            assert_eq!(frame.payload.len(), i as usize);
        }
    }

    #[tokio::test]
    async fn test_clean_eof_is_connection_closed() {
        let (mut left, mut right) = in_memory_pair(64);
        left.close().await.unwrap();
        assert!(matches!(
            read_frame(&mut right, DEFAULT_MAX_PAYLOAD_SIZE).await,
            Err(BridgeError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_truncated_header_is_malformed() {
        let (mut left, mut right) = in_memory_pair(64);
        left.write_all(&[10, 0, 0]).await.unwrap();
        left.close().await.unwrap();
        assert!(matches!(
            read_frame(&mut right, DEFAULT_MAX_PAYLOAD_SIZE).await,
            Err(BridgeError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_malformed() {
        let (mut left, mut right) = in_memory_pair(64);
        left.write_all(&[4, 0, 0, 0, 10, b'a', b'b']).await.unwrap();
        left.close().await.unwrap();
        match read_frame(&mut right, DEFAULT_MAX_PAYLOAD_SIZE).await {
            Err(BridgeError::MalformedMessage(msg)) => assert!(msg.contains("body")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let (mut left, mut right) = in_memory_pair(64);
        left.write_all(&[4, 0, 0, 1, 0]).await.unwrap();
        assert!(matches!(
            read_frame(&mut right, 16).await,
            Err(BridgeError::MalformedMessage(_))
        ));
    }
}
