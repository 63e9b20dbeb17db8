//! # shiftgate-server
//!
//! TCP gateway in front of the shift scheduling backend.
//!
//! This crate provides:
//! - TCP connection handling, one task per connection
//! - Protocol routing to registered handlers
//! - The data store capability handlers run against
//! - A proxy to the external compute engine
//! - Layered configuration (defaults, YAML, environment)

pub mod config;
pub mod downstream;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

pub use config::{Config, DownstreamConfig, FrameConfig, NetworkConfig, StorageConfig};
pub use downstream::{DownstreamError, DownstreamProxy};
pub use error::{HandlerError, ServerError};
pub use handlers::register_defaults;
pub use router::{Handler, HandlerContext, HandlerOutput, ProtocolRouter};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
pub use store::{DataStore, MemoryStore, StoreConnector, StoreError};
