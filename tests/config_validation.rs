//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use socket_runtime::config::{
    EventBusConfig, FrameworkConfig, LoggingConfig, PacketConfig, PoolConfig, ServerConfig,
    ShutdownPolicy,
};
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = FrameworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_server_address() {
    let mut config = FrameworkConfig::default();
    config.server.address = "invalid_address".to_string();

    let errors = config.validate();
    assert!(!errors.is_empty(), "Should have validation errors");
    assert!(errors.iter().any(|e| e.contains("Invalid server address")));
}

#[test]
fn test_empty_server_address() {
    let mut config = FrameworkConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_zero_max_connections() {
    let server = ServerConfig {
        max_connections: 0,
        ..ServerConfig::default()
    };
    assert!(server
        .validate()
        .iter()
        .any(|e| e.contains("Max connections must be greater than 0")));
}

#[test]
fn test_heartbeat_timeout_bounds() {
    let fast = ServerConfig {
        heartbeat_timeout: Duration::from_secs(30),
        ..ServerConfig::default()
    };
    assert!(fast.validate().is_empty());

    let loose = ServerConfig {
        heartbeat_timeout: Duration::from_secs(600),
        ..ServerConfig::default()
    };
    assert!(loose.validate().is_empty(), "10 minute timeout is a valid deployment");

    let too_short = ServerConfig {
        heartbeat_timeout: Duration::from_millis(50),
        sweep_interval: Duration::from_millis(20),
        ..ServerConfig::default()
    };
    assert!(too_short
        .validate()
        .iter()
        .any(|e| e.contains("Heartbeat timeout too short")));

    let too_long = ServerConfig {
        heartbeat_timeout: Duration::from_secs(601),
        ..ServerConfig::default()
    };
    assert!(too_long
        .validate()
        .iter()
        .any(|e| e.contains("Heartbeat timeout too long")));
}

#[test]
fn test_sweep_interval_cannot_exceed_timeout() {
    let server = ServerConfig {
        heartbeat_timeout: Duration::from_secs(1),
        sweep_interval: Duration::from_secs(2),
        ..ServerConfig::default()
    };
    assert!(server
        .validate()
        .iter()
        .any(|e| e.contains("Sweep interval cannot exceed")));
}

#[test]
fn test_zero_event_capacity() {
    let bus = EventBusConfig {
        capacity: 0,
        shutdown_policy: ShutdownPolicy::Flush,
    };
    assert!(bus
        .validate()
        .iter()
        .any(|e| e.contains("capacity must be greater than 0")));
}

#[test]
fn test_pool_bounds() {
    let pool = PoolConfig {
        max_size: 4,
        preload: 8,
        keep_alive: 8,
    };
    let errors = pool.validate();
    assert!(errors.iter().any(|e| e.contains("preload cannot exceed")));
    assert!(errors.iter().any(|e| e.contains("keep-alive cannot exceed")));
}

#[test]
fn test_short_signing_key() {
    let packet = PacketConfig {
        signing_key: Some("short".into()),
        ..PacketConfig::default()
    };
    assert!(packet
        .validate()
        .iter()
        .any(|e| e.contains("Signing key too short")));
}

#[test]
fn test_encryption_key_must_be_32_hex_bytes() {
    let valid = PacketConfig {
        encryption_key: Some("ab".repeat(32)),
        ..PacketConfig::default()
    };
    assert!(valid.validate().is_empty());

    let short = PacketConfig {
        encryption_key: Some("ab".repeat(16)),
        ..PacketConfig::default()
    };
    assert!(short
        .validate()
        .iter()
        .any(|e| e.contains("must be 32 bytes, got 16")));

    let garbage = PacketConfig {
        encryption_key: Some("not hex at all".into()),
        ..PacketConfig::default()
    };
    assert!(garbage
        .validate()
        .iter()
        .any(|e| e.contains("not valid hex")));
}

#[test]
fn test_encryption_excludes_signing() {
    let both = PacketConfig {
        signing_key: Some("0123456789abcdef".into()),
        encryption_key: Some("ab".repeat(32)),
        ..PacketConfig::default()
    };
    assert!(both
        .validate()
        .iter()
        .any(|e| e.contains("cannot both be set")));
}

#[test]
fn test_tiny_packet_size() {
    let packet = PacketConfig {
        max_packet_size: 16,
        ..PacketConfig::default()
    };
    assert!(packet
        .validate()
        .iter()
        .any(|e| e.contains("Max packet size too small")));
}

#[test]
fn test_empty_app_name() {
    let logging = LoggingConfig {
        app_name: String::new(),
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("Application name cannot be empty")));
}

#[test]
fn test_validate_strict_collects_all_errors() {
    let config = FrameworkConfig::default_with_overrides(|c| {
        c.server.max_connections = 0;
        c.event_bus.capacity = 0;
    });
    let err = config.validate_strict().expect_err("should fail");
    let message = err.to_string();
    assert!(message.contains("Max connections"));
    assert!(message.contains("Event queue capacity"));
}

#[test]
fn test_toml_roundtrip_and_partial_sections() {
    let config = FrameworkConfig::default_with_overrides(|c| {
        c.server.heartbeat_timeout = Duration::from_secs(600);
        c.event_bus.shutdown_policy = ShutdownPolicy::Discard;
        c.logging.log_level = Level::DEBUG;
    });
    let text = toml::to_string_pretty(&config).expect("serialize");
    assert!(text.contains("heartbeat_timeout = 600000"));
    assert!(text.contains("shutdown_policy = \"discard\""));

    let parsed = FrameworkConfig::from_toml(&text).expect("parse");
    assert_eq!(parsed.server.heartbeat_timeout, Duration::from_secs(600));
    assert_eq!(parsed.event_bus.shutdown_policy, ShutdownPolicy::Discard);
    assert_eq!(parsed.logging.log_level, Level::DEBUG);
}

#[test]
fn test_example_config_parses() {
    let example = FrameworkConfig::example_config();
    let parsed = FrameworkConfig::from_toml(&example).expect("example config should parse");
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_bad_toml_is_config_error() {
    assert!(FrameworkConfig::from_toml("server = 3").is_err());
}
