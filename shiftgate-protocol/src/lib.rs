//! # shiftgate-protocol
//!
//! Wire protocol shared by the shiftgate gateway, its clients and the
//! compute engine it proxies to.
//!
//! This crate provides:
//! - Length-prefixed framing (8-byte little-endian header, text + payload)
//! - Byte-level UTF-8 sanitization of the text segment
//! - Async read/write of whole packets over any `AsyncRead`/`AsyncWrite`
//! - Request/Response envelope types

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod sanitize;

pub use codec::{read_packet, write_packet, Decoder};
pub use error::ProtocolError;
pub use frame::{Header, Packet, HEADER_SIZE};
pub use message::{RequestEnvelope, ResponseEnvelope, RespStatus};
pub use sanitize::sanitize;

/// Default port the gateway listens on.
pub const DEFAULT_PORT: u16 = 5556;

/// Upper bound on `totalSize` (10 MiB).
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;
