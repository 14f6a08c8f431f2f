//! # Configuration Management
//!
//! Centralized configuration for the messaging library.
//!
//! This module provides structured configuration for servers and clients:
//! endpoints, timeouts, frame limits, compression and encryption settings,
//! and logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variable overrides via `from_env()`
//!
//! ## Security Considerations
//! - Frame length caps are validated before any allocation on the receive path
//! - Decompression output is bounded by `max_payload_bytes` (bomb protection)
//! - Idle timeouts close half-open connections

use crate::error::{Result, WireError};
use crate::utils::compression::CompressionKind;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Delimiter sentinel closing every frame. Fixed at build time and shared
/// between peers; used only for resynchronisation, never for length.
pub const FRAME_DELIMITER: [u8; 4] = [0xAE, 0x42, 0x91, 0x5C];

/// Fixed frame overhead: kind (1) + header-length (2) + flags (1) + payload-length (4).
pub const FRAME_OVERHEAD: usize = 8;

/// Max allowed header block size (the wire field is u16, so the effective
/// cap is never above 65,535 regardless of configuration).
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Max allowed payload size (256 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Transport read buffer size (16 KiB).
pub const READ_BUFFER_BYTES: usize = 16 * 1024;

/// Whether to enable payload compression by default
pub const ENABLE_COMPRESSION: bool = false;

/// Minimum payload size before compression is attempted
pub const COMPRESSION_THRESHOLD_BYTES: usize = 512;

/// Caps and delimiter handed to the encoder and decoder.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum encoded header block size in bytes
    pub max_header_bytes: usize,
    /// Maximum payload size in bytes
    pub max_payload_bytes: usize,
    /// Delimiter sentinel terminating each frame
    pub delimiter: [u8; 4],
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: MAX_HEADER_BYTES,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            delimiter: FRAME_DELIMITER,
        }
    }
}

impl FrameLimits {
    /// The header cap actually enforceable on the wire.
    pub fn effective_header_cap(&self) -> usize {
        self.max_header_bytes.min(u16::MAX as usize)
    }

    /// Largest possible encoded frame under these limits.
    pub fn max_frame_bytes(&self) -> usize {
        FRAME_OVERHEAD + self.effective_header_cap() + self.max_payload_bytes + self.delimiter.len()
    }
}

/// Main configuration structure containing all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LinkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport and pipeline configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LinkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WireError::ConfigError(format!("Failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| WireError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("FRAMELINK_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("FRAMELINK_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(passphrase) = std::env::var("FRAMELINK_ENCRYPTION_PASSPHRASE") {
            config.transport.encryption_passphrase = Some(passphrase);
        }

        if let Ok(key) = std::env::var("FRAMELINK_PRESHARED_KEY") {
            config.transport.preshared_key = Some(key);
        }

        if let Ok(idle) = std::env::var("FRAMELINK_IDLE_TIMEOUT_MS") {
            if let Ok(val) = idle.parse::<u64>() {
                config.transport.idle_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(max) = std::env::var("FRAMELINK_MAX_PAYLOAD_BYTES") {
            if let Ok(val) = max.parse::<usize>() {
                config.transport.limits.max_payload_bytes = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WireError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "127.0.0.1:9000")
    pub address: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Capacity of each session's inbound event channel; reads pause when full
    pub backpressure_limit: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            max_connections: 1000,
            backpressure_limit: 32,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:9000')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        }

        if self.backpressure_limit == 0 {
            errors.push("Backpressure limit must be greater than 0".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Identity string sent in the Auth packet's client-id header
    pub client_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            client_id: None,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if let Some(id) = &self.client_id {
            if id.contains('=') || id.contains('\n') {
                errors.push("client_id must not contain '=' or newlines".to_string());
            }
        }

        errors
    }
}

/// Transport and pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Frame length caps and delimiter
    #[serde(default)]
    pub limits: FrameLimits,

    /// Transport read buffer size in bytes
    pub read_buffer_bytes: usize,

    /// Close the session after this long without inbound bytes
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Per-operation deadline on transport writes
    #[serde(with = "duration_serde")]
    pub write_deadline: Duration,

    /// Whether to compress payloads on the outbound pipeline
    pub compression_enabled: bool,

    /// Compression algorithm for payload bytes
    pub compression_kind: CompressionKind,

    /// Minimum payload size (bytes) before compression is applied
    pub compression_threshold_bytes: usize,

    /// Passphrase deriving the AES-256-GCM key; packets are encrypted when set
    pub encryption_passphrase: Option<String>,

    /// Shared secret whose digest identifies the expected key to peers
    pub preshared_key: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            limits: FrameLimits::default(),
            read_buffer_bytes: READ_BUFFER_BYTES,
            idle_timeout: timeout::IDLE_TIMEOUT,
            write_deadline: timeout::DEFAULT_TIMEOUT,
            compression_enabled: ENABLE_COMPRESSION,
            compression_kind: CompressionKind::Lz4,
            compression_threshold_bytes: COMPRESSION_THRESHOLD_BYTES,
            encryption_passphrase: None,
            preshared_key: None,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.limits.max_payload_bytes == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        }

        if self.limits.max_header_bytes == 0 {
            errors.push("Max header size cannot be 0".to_string());
        }

        if self.read_buffer_bytes < 512 {
            errors.push("Read buffer too small (minimum: 512 bytes)".to_string());
        }

        if self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms)".to_string());
        }

        if self.write_deadline.as_millis() < 10 {
            errors.push("Write deadline too short (minimum: 10ms)".to_string());
        }

        if self.compression_enabled
            && self.compression_threshold_bytes > self.limits.max_payload_bytes
        {
            errors.push("Compression threshold cannot exceed max payload size".to_string());
        }

        if let Some(pass) = &self.encryption_passphrase {
            if pass.is_empty() {
                errors.push("Encryption passphrase cannot be empty when set".to_string());
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("framelink"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LinkConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn toml_roundtrip() {
        let config = LinkConfig::default_with_overrides(|c| {
            c.transport.compression_enabled = true;
            c.transport.encryption_passphrase = Some("s3cret".into());
            c.server.address = "0.0.0.0:7000".into();
        });
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed = LinkConfig::from_toml(&toml).unwrap();
        assert!(parsed.transport.compression_enabled);
        assert_eq!(
            parsed.transport.encryption_passphrase.as_deref(),
            Some("s3cret")
        );
        assert_eq!(parsed.server.address, "0.0.0.0:7000");
    }

    #[test]
    fn invalid_address_rejected() {
        let config = LinkConfig::default_with_overrides(|c| {
            c.server.address = "not-an-address".into();
        });
        assert!(config.validate_strict().is_err());
    }

    #[test]
    fn effective_header_cap_is_wire_bounded() {
        let limits = FrameLimits {
            max_header_bytes: 1 << 20,
            ..FrameLimits::default()
        };
        assert_eq!(limits.effective_header_cap(), u16::MAX as usize);
    }
}
