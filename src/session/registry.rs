//! Live session table.

use super::{CloseReason, Session};
use crate::error::{constants, FrameworkError, Result};
use crate::protocol::event_bus::{events, EventArgs, EventBus};
use crate::utils::metrics::Metrics;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sessions by id. The lock is never held across an await.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    bus: EventBus,
    metrics: Arc<Metrics>,
    max_sessions: usize,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(bus: EventBus, metrics: Arc<Metrics>, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            bus,
            metrics,
            max_sessions,
        }
    }

    /// Track a new session. Fails when the registry is full.
    pub fn insert(&self, session: Arc<Session>) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| FrameworkError::Custom(constants::ERR_SESSIONS_LOCK.to_string()))?;
        if sessions.len() >= self.max_sessions {
            warn!(max = self.max_sessions, "Session limit reached");
            return Err(FrameworkError::Custom(format!(
                "Session limit of {} reached",
                self.max_sessions
            )));
        }
        sessions.insert(session.id(), session);
        self.metrics.session_opened();
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(&id).cloned())
    }

    /// Snapshot of every tracked session
    pub fn list(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and close a session, then publish `OnClientDisconnected`.
    ///
    /// Unknown or already-closed sessions are a no-op returning false, so the
    /// heartbeat sweep and a peer disconnect can race safely.
    pub async fn close(&self, id: Uuid, reason: CloseReason) -> bool {
        let removed = self
            .sessions
            .write()
            .ok()
            .and_then(|mut sessions| sessions.remove(&id));
        let Some(session) = removed else {
            debug!(session = %id, %reason, "Close ignored for unknown session");
            return false;
        };

        if !session.close(reason) {
            return false;
        }

        if reason == CloseReason::HeartbeatTimeout {
            self.metrics.session_timed_out();
        } else {
            self.metrics.session_closed();
        }
        info!(session = %id, peer = ?session.peer(), %reason, "Client disconnected");

        let event = EventArgs::new(events::ON_CLIENT_DISCONNECTED)
            .with_session(id)
            .with_payload(json!({ "reason": reason.as_str() }));
        if let Err(e) = self.bus.publish_event(event).await {
            debug!(session = %id, error = %e, "Disconnect event not published");
        }
        true
    }

    /// Close every session. Returns how many were closed.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let ids: Vec<Uuid> = self
            .sessions
            .read()
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default();
        let mut closed = 0;
        for id in ids {
            if self.close(id, reason).await {
                closed += 1;
            }
        }
        closed
    }
}
