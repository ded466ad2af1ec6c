//! # Sessions
//!
//! One [`Session`] per live connection: identity, component set, pooled
//! scratch buffer and the outbound packet channel.
//!
//! ## State Machine
//! ```text
//! Connecting -> Active -> { TimedOut | Closed }
//! ```
//! Both end states are terminal. Entering one tears the component set down,
//! returns the scratch buffer to its pool, and drops the outbound sender.
//! Only the first terminal transition does any of this.

pub mod registry;

pub use registry::SessionRegistry;

use crate::command::Executer;
use crate::component::{Components, Heartbeat};
use crate::core::packet::Packet;
use crate::error::{FrameworkError, Result};
use crate::utils::pool::Pooled;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    TimedOut,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TimedOut | Self::Closed)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer went away or the stream ended
    Disconnected,
    /// Heartbeat sweep eviction
    HeartbeatTimeout,
    /// Unrecoverable protocol failure on the stream
    ProtocolError,
    /// Closed by the host, e.g. a kick command
    Kicked,
    /// Application shutdown
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ProtocolError => "protocol_error",
            Self::Kicked => "kicked",
            Self::Shutdown => "shutdown",
        }
    }

    fn terminal_state(self) -> SessionState {
        match self {
            Self::HeartbeatTimeout => SessionState::TimedOut,
            _ => SessionState::Closed,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Session {
    id: Uuid,
    peer: Option<SocketAddr>,
    created_at: Instant,
    state: Mutex<SessionState>,
    components: Components,
    scratch: Mutex<Option<Pooled<Vec<u8>>>>,
    outbound: Mutex<Option<mpsc::Sender<Packet>>>,
    closed: CancellationToken,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .field("components", &self.components.names())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    pub fn new(peer: Option<SocketAddr>, outbound: Option<mpsc::Sender<Packet>>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            peer,
            created_at: Instant::now(),
            state: Mutex::new(SessionState::Connecting),
            components: Components::new(id),
            scratch: Mutex::new(None),
            outbound: Mutex::new(outbound),
            closed: CancellationToken::new(),
        }
    }

    /// Session with no transport attached
    pub fn detached() -> Self {
        Self::new(None, None)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    /// `Connecting -> Active`. Returns false from any other state.
    pub fn activate(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == SessionState::Connecting {
            *state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Keep a pooled buffer for the lifetime of the session
    pub fn attach_scratch(&self, buffer: Pooled<Vec<u8>>) {
        *lock(&self.scratch) = Some(buffer);
    }

    pub fn has_scratch(&self) -> bool {
        lock(&self.scratch).is_some()
    }

    /// Cancelled once the session is terminal
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Record a liveness signal. Returns false without a `Heartbeat` component.
    pub fn update_heartbeat(&self) -> bool {
        self.components
            .with_mut::<Heartbeat, _>(Heartbeat::update_heartbeat)
            .is_some()
    }

    /// Sessions without a `Heartbeat` component never time out
    pub fn is_heartbeat_expired(&self) -> bool {
        self.components
            .with::<Heartbeat, _>(Heartbeat::is_timeout)
            .unwrap_or(false)
    }

    /// Queue a packet for the writer task
    pub async fn send(&self, packet: Packet) -> Result<()> {
        let sender = lock(&self.outbound)
            .clone()
            .ok_or(FrameworkError::ConnectionClosed)?;
        sender
            .send(packet)
            .await
            .map_err(|_| FrameworkError::ConnectionClosed)
    }

    /// Move to the terminal state for `reason` and release everything held.
    ///
    /// Returns true only for the call that performed the transition.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return false;
            }
            *state = reason.terminal_state();
        }

        let removed = self.components.teardown();
        // Dropping the lease returns the buffer to its pool
        lock(&self.scratch).take();
        lock(&self.outbound).take();
        self.closed.cancel();

        debug!(session = %self.id, %reason, components = removed, "Session closed");
        true
    }
}

impl Executer for Session {
    fn id(&self) -> Uuid {
        self.id
    }

    fn components(&self) -> &Components {
        &self.components
    }
}
