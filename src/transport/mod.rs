//! # Transport Layer
//!
//! Byte-stream transports carrying length-prefixed packets. The runtime's
//! contracts sit above the stream, so any transport only has to open a
//! session per connection, feed decoded packets to the router and drain the
//! session's outbound channel.
//!
//! ## Components
//! - **TCP**: accept loop with per-connection reader and writer tasks, plus a
//!   client with request/response correlation

pub mod tcp;

pub use tcp::{bind, connect, serve, start_server, Client};
