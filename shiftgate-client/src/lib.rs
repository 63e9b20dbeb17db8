//! # shiftgate-client
//!
//! Client library for the shiftgate wire protocol.
//!
//! This crate provides:
//! - Outbound TCP connections with connect and request timeouts
//! - One-request/one-response exchanges using the shared packet codec
//! - A high-level API returning parsed response envelopes

pub mod connection;
pub mod error;

pub use connection::{Client, Connection, ConnectionConfig};
pub use error::ClientError;
