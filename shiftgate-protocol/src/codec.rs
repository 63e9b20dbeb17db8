//! Stream codecs for packets.
//!
//! Two ways to pull packets off a byte stream:
//! - [`Decoder`] buffers whatever the socket hands over and yields packets as
//!   they complete. Used by the accept side, which multiplexes reads with
//!   idle and shutdown timers.
//! - [`read_packet`] reads exactly one packet with `read_exact` semantics.
//!   Used by one-shot outbound exchanges.

use crate::error::ProtocolError;
use crate::frame::{Header, Packet, HEADER_SIZE};
use crate::MAX_FRAME_SIZE;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Incremental packet decoder.
pub struct Decoder {
    buffer: BytesMut,
    max_frame_size: u32,
}

impl Decoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Creates a decoder that rejects frames larger than `max` bytes.
    pub fn with_max_frame_size(max: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_frame_size: max.min(MAX_FRAME_SIZE),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next packet from the buffer.
    pub fn decode_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        Packet::decode(&mut self.buffer, self.max_frame_size)
    }

    /// Called when the peer closed the stream.
    ///
    /// Leftover bytes mean a packet was cut short: reports which part of it
    /// was missing.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        let buffered = self.buffer.len();
        if buffered == 0 {
            return Ok(());
        }
        if buffered < HEADER_SIZE {
            return Err(ProtocolError::IncompleteHeader { received: buffered });
        }
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.buffer[..HEADER_SIZE]);
        let header = Header::parse(raw);
        Err(ProtocolError::IncompleteBody {
            expected: header.total_size as usize,
            received: buffered - HEADER_SIZE,
        })
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads until `buf` is full or the stream ends. Returns the count read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads exactly one packet from `reader`.
///
/// The header is validated before the body is read, so an oversized frame
/// never causes an allocation of its declared size.
pub async fn read_packet<R>(reader: &mut R, max: u32) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_SIZE];
    let received = read_full(reader, &mut raw).await?;
    if received < HEADER_SIZE {
        return Err(ProtocolError::IncompleteHeader { received });
    }

    let header = Header::parse(raw).validate(max)?;

    let expected = header.total_size as usize;
    let mut body = vec![0u8; expected];
    let received = read_full(reader, &mut body).await?;
    if received < expected {
        return Err(ProtocolError::IncompleteBody { expected, received });
    }

    let mut body = Bytes::from(body);
    let text = body.split_to(header.text_size as usize);
    Ok(Packet::from_segments(text, body))
}

/// Encodes and writes one packet, then flushes.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
