//! Packet framing.
//!
//! Packet layout (8 bytes header + text + payload):
//!
//! ```text
//! +-------------+-------------+------------------+---------------------+
//! | total_size  | text_size   | text             | payload             |
//! | u32 LE      | u32 LE      | text_size bytes  | total - text bytes  |
//! +-------------+-------------+------------------+---------------------+
//! ```
//!
//! `total_size` counts every byte after the header. The text segment holds
//! JSON and is sanitized on decode; the payload is opaque and never touched.

use crate::error::ProtocolError;
use crate::sanitize::sanitize;
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Bytes following the header.
    pub total_size: u32,
    /// Bytes of text within `total_size`.
    pub text_size: u32,
}

impl Header {
    /// Parses a header from its 8 raw bytes.
    pub fn parse(raw: [u8; HEADER_SIZE]) -> Self {
        Self {
            total_size: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            text_size: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    /// Serializes the header.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.total_size.to_le_bytes());
        out[4..].copy_from_slice(&self.text_size.to_le_bytes());
        out
    }

    /// Checks `0 < text_size <= total_size <= max`.
    pub fn validate(self, max: u32) -> Result<Self, ProtocolError> {
        let max = max.min(MAX_FRAME_SIZE);
        if self.text_size == 0 || self.text_size > self.total_size || self.total_size > max {
            return Err(ProtocolError::InvalidSize {
                total_size: self.total_size,
                text_size: self.text_size,
                max,
            });
        }
        Ok(self)
    }

    /// Number of payload bytes.
    pub fn payload_size(self) -> u32 {
        self.total_size - self.text_size
    }
}

/// One framed unit exchanged over a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// JSON text, sanitized.
    pub text: Bytes,
    /// Opaque binary payload (may be empty).
    pub payload: Bytes,
}

impl Packet {
    /// Creates a packet with text only.
    pub fn new(text: impl Into<Bytes>) -> Self {
        Self {
            text: text.into(),
            payload: Bytes::new(),
        }
    }

    /// Attaches a binary payload.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Creates a text-only packet from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        let text = serde_json::to_vec(value)?;
        Ok(Self::new(text))
    }

    /// Builds a packet from raw decoded segments, sanitizing the text.
    pub fn from_segments(text: Bytes, payload: Bytes) -> Self {
        let text = match sanitize(&text) {
            Cow::Borrowed(_) => text,
            Cow::Owned(cleaned) => Bytes::from(cleaned),
        };
        Self { text, payload }
    }

    /// Returns the header describing this packet.
    pub fn header(&self) -> Result<Header, ProtocolError> {
        let text_size = u32::try_from(self.text.len()).unwrap_or(u32::MAX);
        let total_size = u32::try_from(self.text.len() + self.payload.len()).unwrap_or(u32::MAX);
        Header {
            total_size,
            text_size,
        }
        .validate(MAX_FRAME_SIZE)
    }

    /// Encodes the packet into bytes. The text is not re-sanitized.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let header = self.header()?;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + header.total_size as usize);
        buf.put_slice(&header.to_bytes());
        buf.put_slice(&self.text);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a packet from a buffer.
    ///
    /// Returns `Ok(Some(packet))` when a complete packet was consumed,
    /// `Ok(None)` if more data is needed, or `Err` as soon as the header
    /// declares an invalid size (before any body bytes are awaited).
    pub fn decode(buf: &mut BytesMut, max: u32) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&buf[..HEADER_SIZE]);
        let header = Header::parse(raw).validate(max)?;

        let frame_len = HEADER_SIZE + header.total_size as usize;
        if buf.len() < frame_len {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let text = buf.split_to(header.text_size as usize).freeze();
        let payload = buf.split_to(header.payload_size() as usize).freeze();

        Ok(Some(Self::from_segments(text, payload)))
    }

    /// Parses the text segment as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.text)?)
    }
}
