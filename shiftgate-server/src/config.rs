//! Gateway configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SHIFTGATE_CONFIG)
//! 3. Environment variables
//!
//! The result is built once at startup and treated as immutable afterwards.

use serde::{Deserialize, Serialize};
use shiftgate_protocol::MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub network: NetworkConfig,
    /// Framing limits.
    pub frame: FrameConfig,
    /// Compute engine endpoint.
    pub downstream: DownstreamConfig,
    /// Data store configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SHIFTGATE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.frame.apply_env_overrides();
        self.downstream.apply_env_overrides();
        self.storage.apply_env_overrides();
    }

    /// Rejects values the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "frame.max_frame_bytes must be positive".to_string(),
            ));
        }
        if self.downstream.connect_timeout_secs == 0 || self.downstream.read_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "downstream timeouts must be positive".to_string(),
            ));
        }
        if self.network.idle_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "network.idle_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], shiftgate_protocol::DEFAULT_PORT)),
            idle_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("SHIFTGATE_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("SHIFTGATE_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("SHIFTGATE_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Framing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Largest accepted `total_size`. Can only lower the protocol bound.
    pub max_frame_bytes: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: MAX_FRAME_SIZE,
        }
    }
}

impl FrameConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("SHIFTGATE_MAX_FRAME_BYTES") {
            if let Ok(n) = max.parse() {
                self.max_frame_bytes = n;
            }
        }
    }

    /// Effective limit, clamped to the protocol bound.
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_bytes.min(MAX_FRAME_SIZE)
    }
}

/// Compute engine endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Compute engine address.
    #[serde(with = "socket_addr_serde")]
    pub addr: SocketAddr,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Response timeout in seconds.
    pub read_timeout_secs: u64,
    /// Where the last raw response is written. Empty disables it.
    pub diagnostics_path: PathBuf,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 5555)),
            connect_timeout_secs: 7,
            read_timeout_secs: 7,
            diagnostics_path: PathBuf::from("./last_downstream_response.json"),
        }
    }
}

impl DownstreamConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("SHIFTGATE_DOWNSTREAM_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("SHIFTGATE_DOWNSTREAM_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("SHIFTGATE_DOWNSTREAM_READ_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.read_timeout_secs = secs;
            }
        }

        if let Ok(path) = std::env::var("SHIFTGATE_DIAGNOSTICS_PATH") {
            self.diagnostics_path = PathBuf::from(path);
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Returns the diagnostics path, or `None` when persistence is off.
    pub fn diagnostics_path(&self) -> Option<&Path> {
        if self.diagnostics_path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.diagnostics_path)
        }
    }
}

/// Data store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON fixture loaded into the in-memory store at startup.
    pub seed_file: Option<PathBuf>,
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SHIFTGATE_SEED_FILE") {
            self.seed_file = Some(PathBuf::from(path));
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {1}", path = .0.display())]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{path}': {1}", path = .0.display())]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
