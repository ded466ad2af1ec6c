//! # Configuration Management
//!
//! Centralized configuration for the socket runtime.
//!
//! The hosting process supplies ports, timeouts, queue sizes and key material
//! here at construction time; nothing in the runtime reads ambient settings.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Heartbeat timeouts
//! Fast-cycle servers run with a 30 second liveness timeout; looser deployments
//! stretch it to 10 minutes. Both are values of `ServerConfig::heartbeat_timeout`.

use crate::error::{FrameworkError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default event queue capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Max allowed packet size (16 MB)
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Default liveness timeout for fast-cycle servers
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest liveness timeout accepted by validation
pub const MAX_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(600);

/// Default period of the heartbeat sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum signing key length in bytes
pub const MIN_SIGNING_KEY_LEN: usize = 16;

/// Encryption key length in bytes (64 hex characters)
pub const ENCRYPTION_KEY_LEN: usize = crate::core::crypto::KEY_LEN;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FrameworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Event bus configuration
    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// Object pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Packet codec configuration
    #[serde(default)]
    pub packet: PacketConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FrameworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| FrameworkError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| FrameworkError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| FrameworkError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SOCKET_RUNTIME_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(timeout) = std::env::var("SOCKET_RUNTIME_HEARTBEAT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.server.heartbeat_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(interval) = std::env::var("SOCKET_RUNTIME_SWEEP_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.server.sweep_interval = Duration::from_millis(val);
            }
        }

        if let Ok(capacity) = std::env::var("SOCKET_RUNTIME_EVENT_CAPACITY") {
            if let Ok(val) = capacity.parse::<usize>() {
                config.event_bus.capacity = val;
            }
        }

        if let Ok(policy) = std::env::var("SOCKET_RUNTIME_SHUTDOWN_POLICY") {
            config.event_bus.shutdown_policy = match policy.to_ascii_lowercase().as_str() {
                "discard" => ShutdownPolicy::Discard,
                "flush" => ShutdownPolicy::Flush,
                other => {
                    return Err(FrameworkError::ConfigError(format!(
                        "Unknown shutdown policy: {other}"
                    )))
                }
            };
        }

        if let Ok(key) = std::env::var("SOCKET_RUNTIME_SIGNING_KEY") {
            config.packet.signing_key = Some(key);
        }

        if let Ok(key) = std::env::var("SOCKET_RUNTIME_ENCRYPTION_KEY") {
            config.packet.encryption_key = Some(key);
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

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FrameworkError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| FrameworkError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.event_bus.validate());
        errors.extend(self.pool.validate());
        errors.extend(self.packet.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FrameworkError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:9000")
    pub address: String,

    /// Maximum number of concurrent sessions
    pub max_connections: usize,

    /// A session silent for longer than this is evicted
    #[serde(with = "duration_serde")]
    pub heartbeat_timeout: Duration,

    /// Period of the heartbeat sweep
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            max_connections: 1000,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            shutdown_timeout: Duration::from_secs(10),
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
                "Invalid server address format: '{}' (expected format: '0.0.0.0:8080')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.heartbeat_timeout.as_millis() < 100 {
            errors.push("Heartbeat timeout too short (minimum: 100ms)".to_string());
        } else if self.heartbeat_timeout > MAX_HEARTBEAT_TIMEOUT {
            errors.push("Heartbeat timeout too long (maximum: 10 minutes)".to_string());
        }

        if self.sweep_interval.as_millis() < 10 {
            errors.push("Sweep interval too short (minimum: 10ms)".to_string());
        } else if self.sweep_interval > self.heartbeat_timeout {
            errors.push("Sweep interval cannot exceed the heartbeat timeout".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// What the event bus does with queued events when it shuts down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Dispatch everything still queued before the consumer exits
    #[default]
    Flush,
    /// Drop queued events and log how many were lost
    Discard,
}

/// Event bus configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventBusConfig {
    /// Bounded queue capacity; publishers wait when it is full
    pub capacity: usize,

    /// Handling of queued events at shutdown
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
            shutdown_policy: ShutdownPolicy::Flush,
        }
    }
}

impl EventBusConfig {
    /// Validate event bus configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.capacity == 0 {
            errors.push("Event queue capacity must be greater than 0".to_string());
        } else if self.capacity > 1_000_000 {
            errors.push(format!(
                "Event queue capacity too large: {} (max recommended: 1,000,000)",
                self.capacity
            ));
        }

        errors
    }
}

/// Object pool configuration for scratch buffers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Upper bound on live-or-idle instances
    pub max_size: usize,

    /// Instances constructed eagerly at startup
    pub preload: usize,

    /// Idle instances kept when the pool is trimmed
    pub keep_alive: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 1024,
            preload: 32,
            keep_alive: 64,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_size == 0 {
            errors.push("Pool max size must be greater than 0".to_string());
        }

        if self.preload > self.max_size {
            errors.push("Pool preload cannot exceed max size".to_string());
        }

        if self.keep_alive > self.max_size {
            errors.push("Pool keep-alive cannot exceed max size".to_string());
        }

        errors
    }
}

/// Packet codec configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PacketConfig {
    /// Maximum allowed frame size in bytes
    pub max_packet_size: usize,

    /// Shared key for packet signatures; unsigned packets when absent
    #[serde(default)]
    pub signing_key: Option<String>,

    /// Hex-encoded 32-byte key for frame encryption; plaintext frames when absent.
    /// Encryption already authenticates frames, so it excludes `signing_key`.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            signing_key: None,
            encryption_key: None,
        }
    }
}

impl PacketConfig {
    /// Validate packet configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_size < 64 {
            errors.push("Max packet size too small (minimum: 64 bytes)".to_string());
        } else if self.max_packet_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max packet size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_packet_size
            ));
        }

        if let Some(ref key) = self.signing_key {
            if key.len() < MIN_SIGNING_KEY_LEN {
                errors.push(format!(
                    "Signing key too short: {} bytes (minimum: {MIN_SIGNING_KEY_LEN})",
                    key.len()
                ));
            }
        }

        if let Some(ref key) = self.encryption_key {
            match hex::decode(key.trim()) {
                Ok(bytes) if bytes.len() == ENCRYPTION_KEY_LEN => {}
                Ok(bytes) => errors.push(format!(
                    "Encryption key must be {ENCRYPTION_KEY_LEN} bytes, got {}",
                    bytes.len()
                )),
                Err(e) => errors.push(format!("Encryption key is not valid hex: {e}")),
            }
            if self.signing_key.is_some() {
                errors.push("Signing key and encryption key cannot both be set".to_string());
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

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("socket-runtime"),
            log_level: Level::INFO,
            log_to_console: true,
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
