//! # Error Types
//!
//! Error handling for the socket runtime.
//!
//! This module defines every failure the runtime can report, from malformed
//! packets on the wire to pool exhaustion and event handler faults.
//!
//! ## Error Categories
//! - **Protocol Errors**: malformed or oversized packets, bad signatures
//! - **Cryptographic Errors**: encryption/decryption failures
//! - **Component Errors**: duplicate or missing capabilities on a session
//! - **Command Errors**: unknown commands, parameter and permission failures
//! - **Pool Errors**: exhaustion, construction failure, use after dispose
//! - **Event Errors**: duplicate or unknown numeric ids, closed bus
//! - **I/O Errors**: socket and file system failures
//!
//! Command failures are normally folded into a
//! [`CommandResult`](crate::command::CommandResult) before they reach a caller;
//! the variants here exist so the same taxonomy can be logged and matched on.
//!
//! ## Example Usage
//! ```rust
//! use socket_runtime::core::packet::Packet;
//! use socket_runtime::error::{FrameworkError, Result};
//! use tracing::{error, info};
//!
//! fn parse(bytes: &[u8]) -> Result<Packet> {
//!     Packet::decode(bytes)
//! }
//!
//! match parse(b"not json") {
//!     Ok(packet) => info!(header = %packet.header, "Decoded packet"),
//!     Err(FrameworkError::ProtocolFormat(reason)) => error!(%reason, "Malformed packet"),
//!     Err(e) => error!(error = %e, "Unexpected failure"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Synchronization errors
    pub const ERR_HANDLERS_LOCK: &str = "Failed to acquire event handler lock";
    pub const ERR_SESSIONS_LOCK: &str = "Failed to acquire session registry lock";

    /// Packet errors
    pub const ERR_EMPTY_PACKET: &str = "Packet data cannot be empty";
    pub const ERR_NOT_AN_OBJECT: &str = "Packet must be a JSON object";
    pub const ERR_MISSING_HEADER: &str = "Packet is missing the \"h\" field";
    pub const ERR_BAD_TYPE_CODE: &str = "Packet type code must be an integer";
    pub const ERR_BAD_KEY: &str = "Packet key must be a string";
    pub const ERR_BAD_SIGNATURE_FIELD: &str = "Packet signature must be a string";
}

/// Primary error type for every runtime operation.
#[derive(Error, Debug)]
pub enum FrameworkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed packet: {0}")]
    ProtocolFormat(String),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Packet signature mismatch")]
    SignatureMismatch,

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Component {0} already attached")]
    DuplicateComponent(&'static str),

    #[error("Component {0} not attached")]
    ComponentNotFound(&'static str),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command already registered: {0}")]
    DuplicateCommand(String),

    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),

    #[error("Permission denied: requires level {required}, caller has {actual}")]
    PermissionDenied { required: u32, actual: u32 },

    #[error("Object pool exhausted (max size {0})")]
    PoolExhausted(usize),

    #[error("Object construction failed: {0}")]
    PoolConstruction(String),

    #[error("Object pool disposed")]
    PoolDisposed,

    #[error("Event id {0} already registered")]
    DuplicateEventId(u32),

    #[error("Event id {0} not registered")]
    EventNotFound(u32),

    #[error("Event bus is shut down")]
    BusShutdown,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using FrameworkError
pub type Result<T> = std::result::Result<T, FrameworkError>;
