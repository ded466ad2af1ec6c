//! # Socket Runtime
//!
//! Application-level socket framework: a JSON packet codec, a per-session
//! component runtime, a backpressured event bus, a permission-gated command
//! registry, an object pool and a heartbeat liveness monitor.
//!
//! ## Layers
//! ```text
//! transport::tcp  -> core::codec -> protocol::router
//!                                      |-> heartbeat reply
//!                                      |-> command::CommandRegistry -> component::PermissionGroup
//!                                      '-> protocol::EventBus -> handlers
//! service::HeartbeatMonitor sweeps session::SessionRegistry on a timer
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use socket_runtime::command::{CommandRegistry, CommandResult, ParamType};
//! use socket_runtime::component::PermissionLevel;
//! use socket_runtime::config::FrameworkConfig;
//! use socket_runtime::context::AppContext;
//! use socket_runtime::transport::tcp;
//!
//! #[tokio::main]
//! async fn main() -> socket_runtime::Result<()> {
//!     let commands = CommandRegistry::builder()
//!         .command("echo", PermissionLevel::GUEST, vec![ParamType::String], |args, _| {
//!             CommandResult::ok(args[0].clone())
//!         })?
//!         .build();
//!
//!     let ctx = AppContext::new(FrameworkConfig::from_env()?, commands)?;
//!     tcp::start_server(ctx).await
//! }
//! ```

#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used))]

pub mod command;
pub mod component;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;

pub use crate::config::FrameworkConfig;
pub use crate::context::AppContext;
pub use crate::core::packet::{Packet, PacketType};
pub use crate::error::{FrameworkError, Result};
pub use crate::utils::logging::init_logging;
