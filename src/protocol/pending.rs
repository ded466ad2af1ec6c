//! Request/response correlation by packet key.

use crate::core::packet::Packet;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

/// Outstanding requests waiting for a keyed reply
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiting: Mutex<HashMap<String, oneshot::Sender<Packet>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the reply carrying `key`. Replaces any earlier waiter on the same key.
    pub fn register(&self, key: impl Into<String>) -> oneshot::Receiver<Packet> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut waiting) = self.waiting.lock() {
            waiting.insert(key.into(), tx);
        }
        rx
    }

    /// Hand `packet` to its waiter. Returns the packet back when nobody waits for it.
    pub fn resolve(&self, packet: Packet) -> Option<Packet> {
        let Some(key) = packet.key.as_deref() else {
            return Some(packet);
        };
        let waiter = self.waiting.lock().ok().and_then(|mut w| w.remove(key));
        match waiter {
            Some(tx) => {
                trace!(key, "Reply correlated");
                // A dropped receiver means the caller gave up
                tx.send(packet).err()
            }
            None => Some(packet),
        }
    }

    /// Forget a waiter, e.g. after a timeout
    pub fn cancel(&self, key: &str) -> bool {
        self.waiting
            .lock()
            .map(|mut w| w.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Drop every waiter; their receivers observe a closed channel
    pub fn fail_all(&self) -> usize {
        self.waiting
            .lock()
            .map(|mut w| w.drain().count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
