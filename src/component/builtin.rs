//! Capabilities the runtime itself attaches to sessions.

use super::Component;
use crate::config::DEFAULT_HEARTBEAT_TIMEOUT;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Well-known permission levels. Higher means more privileged.
pub struct PermissionLevel;

impl PermissionLevel {
    pub const GUEST: u32 = 0;
    pub const CLIENT: u32 = 1;
    pub const MODERATOR: u32 = 2;
    pub const ADMIN: u32 = 3;
    /// The in-process console outranks every remote caller
    pub const CONSOLE: u32 = u32::MAX;
}

/// Permission level of the owning executer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionGroup {
    level: u32,
}

impl PermissionGroup {
    pub fn new(level: u32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    pub fn allows(&self, required: u32) -> bool {
        self.level >= required
    }
}

impl Component for PermissionGroup {}

/// Liveness timestamp checked by the heartbeat sweep.
///
/// Uses `tokio::time::Instant` so paused-clock tests can advance it.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    last_seen: Instant,
    timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_TIMEOUT)
    }
}

impl Heartbeat {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            timeout,
        }
    }

    /// Record liveness now
    pub fn update_heartbeat(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn elapsed(&self) -> Duration {
        self.last_seen.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once strictly more than `timeout` has passed since the last update
    pub fn is_timeout(&self) -> bool {
        self.elapsed() > self.timeout
    }
}

impl Component for Heartbeat {
    fn awake(&mut self, _owner: Uuid) {
        self.last_seen = Instant::now();
    }
}

/// Per-session traffic counters
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    connected_at: Instant,
    last_activity: Instant,
    packets_in: u64,
    packets_out: u64,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            connected_at: now,
            last_activity: now,
            packets_in: 0,
            packets_out: 0,
        }
    }
}

impl ActivityTracker {
    pub fn record_inbound(&mut self) {
        self.packets_in += 1;
        self.last_activity = Instant::now();
    }

    pub fn record_outbound(&mut self) {
        self.packets_out += 1;
    }

    pub fn packets_in(&self) -> u64 {
        self.packets_in
    }

    pub fn packets_out(&self) -> u64 {
        self.packets_out
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Component for ActivityTracker {}
