//! # Protocol Layer
//!
//! Everything between a decoded packet and application code.
//!
//! ## Components
//! - **Event Bus**: bounded queue with one FIFO consumer and concurrent fan-out
//! - **Router**: heartbeat, command and event routing for inbound packets
//! - **Pending**: client-side correlation of responses to requests by key
//!
//! ## Flow
//! ```text
//! codec -> router -> { heartbeat reply | command registry | event bus }
//! ```

pub mod event_bus;
pub mod pending;
pub mod router;

pub use event_bus::{handler_fn, EventArgs, EventBus, EventHandler, HandlerId};
pub use pending::PendingRequests;
pub use router::PacketRouter;
