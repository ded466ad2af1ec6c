//! Observability and Metrics
//!
//! Atomic counters for sessions, packets, events and commands. One `Metrics`
//! instance lives in each [`AppContext`](crate::context::AppContext) so tests
//! can observe isolated counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for runtime operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions accepted
    pub sessions_opened: AtomicU64,
    /// Sessions closed explicitly or by disconnect
    pub sessions_closed: AtomicU64,
    /// Sessions evicted by the heartbeat sweep
    pub sessions_timed_out: AtomicU64,
    /// Packets decoded successfully
    pub packets_decoded: AtomicU64,
    /// Packets rejected as malformed
    pub packets_rejected: AtomicU64,
    /// Packets written to peers
    pub packets_sent: AtomicU64,
    /// Events accepted by the bus
    pub events_published: AtomicU64,
    /// Events fanned out by the consumer
    pub events_dispatched: AtomicU64,
    /// Handler invocations that faulted
    pub handler_faults: AtomicU64,
    /// Events dropped at shutdown
    pub events_discarded: AtomicU64,
    /// Commands whose body ran
    pub commands_executed: AtomicU64,
    /// Commands rejected by the permission gate
    pub commands_denied: AtomicU64,
    /// Commands rejected by parameter validation
    pub commands_mismatched: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_timed_out: AtomicU64::new(0),
            packets_decoded: AtomicU64::new(0),
            packets_rejected: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            handler_faults: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            commands_executed: AtomicU64::new(0),
            commands_denied: AtomicU64::new(0),
            commands_mismatched: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_timed_out(&self) {
        self.sessions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_decoded(&self) {
        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_rejected(&self) {
        self.packets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_fault(&self) {
        self.handler_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Record events dropped by a discarding shutdown
    pub fn events_discarded(&self, count: u64) {
        self.events_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn command_executed(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_denied(&self) {
        self.commands_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_mismatched(&self) {
        self.commands_mismatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_timed_out: self.sessions_timed_out.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            packets_rejected: self.packets_rejected.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            handler_faults: self.handler_faults.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            commands_denied: self.commands_denied.load(Ordering::Relaxed),
            commands_mismatched: self.commands_mismatched.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            sessions_opened = snapshot.sessions_opened,
            sessions_closed = snapshot.sessions_closed,
            sessions_timed_out = snapshot.sessions_timed_out,
            packets_decoded = snapshot.packets_decoded,
            packets_rejected = snapshot.packets_rejected,
            packets_sent = snapshot.packets_sent,
            events_published = snapshot.events_published,
            events_dispatched = snapshot.events_dispatched,
            handler_faults = snapshot.handler_faults,
            events_discarded = snapshot.events_discarded,
            commands_executed = snapshot.commands_executed,
            commands_denied = snapshot.commands_denied,
            commands_mismatched = snapshot.commands_mismatched,
            uptime_seconds = snapshot.uptime_seconds,
            "Runtime metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_timed_out: u64,
    pub packets_decoded: u64,
    pub packets_rejected: u64,
    pub packets_sent: u64,
    pub events_published: u64,
    pub events_dispatched: u64,
    pub handler_faults: u64,
    pub events_discarded: u64,
    pub commands_executed: u64,
    pub commands_denied: u64,
    pub commands_mismatched: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let metrics = Metrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_timed_out();
        metrics.events_discarded(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_opened, 2);
        assert_eq!(snap.sessions_timed_out, 1);
        assert_eq!(snap.events_discarded, 3);
        assert_eq!(snap.commands_executed, 0);
    }
}
