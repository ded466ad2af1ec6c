//! # Utility Modules
//!
//! Supporting utilities shared by the codec, sessions and services.
//!
//! ## Components
//! - **Pool**: bounded object pool with a fast-path slot and hit/miss statistics
//! - **Metrics**: atomic counters owned by the application context
//! - **Logging**: `tracing-subscriber` initialization from `LoggingConfig`

pub mod logging;
pub mod metrics;
pub mod pool;

pub use pool::{buffer_pool, BufferPool, ObjectPool, Pooled};
