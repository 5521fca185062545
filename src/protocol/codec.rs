//! Protocol codec
//!
//! Frame encoding and decoding for the X Protocol.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────┐
//! │ Len (4, LE)  │ Type (1) │    Protobuf payload         │
//! └──────────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! `Len` counts the type byte plus the payload.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, XError};

use super::{ClientMessage, ServerMessage};

/// Header size: 4 bytes length + 1 byte message type
pub const HEADER_SIZE: usize = 5;

/// Default maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One undecoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }

    /// Total bytes on the wire
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Append a frame to `buf`
pub fn encode_frame(buf: &mut BytesMut, frame: &Frame) {
    buf.reserve(frame.wire_len());
    buf.put_u32_le(frame.payload.len() as u32 + 1);
    buf.put_u8(frame.message_type);
    buf.put_slice(&frame.payload);
}

/// Decode one frame from the front of `buf`
///
/// Returns `Ok(None)` while the frame is incomplete. Consumed bytes are
/// removed from `buf`.
pub fn decode_frame(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len == 0 {
        return Err(XError::decode("Frame length 0 has no message type"));
    }
    if len > max_frame_size {
        return Err(XError::decode(format!(
            "Frame too large: {} bytes (max {})",
            len, max_frame_size
        )));
    }

    let total_len = 4 + len;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let message_type = buf.get_u8();
    let payload = buf.split_to(len - 1).freeze();
    Ok(Some(Frame {
        message_type,
        payload,
    }))
}

/// Accumulates stream bytes and yields complete frames
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            max_frame_size,
        }
    }

    /// Feed received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete frame, if buffered
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        decode_frame(&mut self.buffer, self.max_frame_size)
    }

    /// Bytes buffered but not yet framed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

// =============================================================================
// Message Encoding/Decoding
// =============================================================================

/// Encode a client message into a full frame
pub fn encode_client_message(message: &ClientMessage) -> Bytes {
    let mut payload = BytesMut::new();
    message.encode_payload(&mut payload);
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(
        &mut buf,
        &Frame::new(message.message_type() as u8, payload.freeze()),
    );
    buf.freeze()
}

/// Encode a server message into a full frame
pub fn encode_server_message(message: &ServerMessage) -> Bytes {
    let mut payload = BytesMut::new();
    message.encode_payload(&mut payload);
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(
        &mut buf,
        &Frame::new(message.message_type() as u8, payload.freeze()),
    );
    buf.freeze()
}

pub fn decode_client_message(frame: Frame) -> Result<ClientMessage> {
    ClientMessage::decode(frame.message_type, frame.payload)
}

pub fn decode_server_message(frame: Frame) -> Result<ServerMessage> {
    ServerMessage::decode(frame.message_type, frame.payload)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a blocking stream
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len == 0 {
        return Err(XError::decode("Frame length 0 has no message type"));
    }
    if len > max_frame_size {
        return Err(XError::decode(format!(
            "Frame too large: {} bytes (max {})",
            len, max_frame_size
        )));
    }

    let mut payload = vec![0u8; len - 1];
    if !payload.is_empty() {
        reader.read_exact(&mut payload)?;
    }

    Ok(Frame::new(header[4], payload))
}

/// Write a client message to a blocking stream
pub fn write_client_message<W: Write>(writer: &mut W, message: &ClientMessage) -> Result<()> {
    writer.write_all(&encode_client_message(message))?;
    writer.flush()?;
    Ok(())
}

/// Write a server message to a blocking stream
pub fn write_server_message<W: Write>(writer: &mut W, message: &ServerMessage) -> Result<()> {
    writer.write_all(&encode_server_message(message))?;
    writer.flush()?;
    Ok(())
}
