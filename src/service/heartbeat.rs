//! Periodic liveness sweep.
//!
//! Each tick scans every registered session and force-closes those whose
//! `Heartbeat` component has expired. Closing goes through the registry, so a
//! session that disconnects on its own during the sweep is simply skipped.

use crate::session::{CloseReason, SessionRegistry};
use crate::utils::pool::BufferPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct HeartbeatMonitor {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    trim: Option<(BufferPool, usize)>,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            trim: None,
        }
    }

    /// Also trim `pool` down to `keep_alive` idle buffers after each tick
    pub fn with_pool_trim(mut self, pool: BufferPool, keep_alive: usize) -> Self {
        self.trim = Some((pool, keep_alive));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evict every expired session now. Returns the evicted ids.
    pub async fn sweep(&self) -> Vec<Uuid> {
        let expired: Vec<Uuid> = self
            .registry
            .list()
            .into_iter()
            .filter(|session| session.is_heartbeat_expired())
            .map(|session| session.id())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for id in expired {
            if self.registry.close(id, CloseReason::HeartbeatTimeout).await {
                warn!(session = %id, "Session evicted after heartbeat timeout");
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            debug!(count = evicted.len(), remaining = self.registry.len(), "Heartbeat sweep finished");
        }
        evicted
    }

    /// Sweep on every interval tick until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                    if let Some((pool, keep_alive)) = &self.trim {
                        if let Ok(evicted) = pool.trim(*keep_alive) {
                            if evicted > 0 {
                                debug!(evicted, "Idle buffers trimmed");
                            }
                        }
                    }
                }
                () = cancel.cancelled() => {
                    info!("Heartbeat monitor stopped");
                    return;
                }
            }
        }
    }

    /// Spawn a monitor on the current runtime
    pub fn spawn(
        registry: Arc<SessionRegistry>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        Self::new(registry, interval).start(cancel)
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
