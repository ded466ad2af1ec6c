//! # Background Services
//!
//! Long-running tasks owned by the application context.
//!
//! ## Components
//! - **Heartbeat**: periodic sweep that evicts sessions whose liveness expired

pub mod heartbeat;

pub use heartbeat::HeartbeatMonitor;
