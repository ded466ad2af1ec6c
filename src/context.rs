//! # Application Context
//!
//! Owns every shared runtime object for one application instance: metrics,
//! buffer pool, event bus, session registry, command registry and router.
//! Nothing lives in process-wide statics, so tests can build as many isolated
//! contexts as they need.
//!
//! ## Lifecycle
//! ```text
//! new() -> start() -> ... -> shutdown()
//! ```
//! `shutdown` stops the heartbeat monitor, closes every session, shuts the
//! event bus down per its policy and disposes the buffer pool.

use crate::command::CommandRegistry;
use crate::component::{ActivityTracker, Heartbeat, PermissionGroup, PermissionLevel};
use crate::config::FrameworkConfig;
use crate::core::codec::PacketCodec;
use crate::core::crypto::PacketCipher;
use crate::core::packet::Packet;
use crate::core::signing::PacketSigner;
use crate::error::Result;
use crate::protocol::event_bus::{events, EventArgs, EventBus};
use crate::protocol::router::PacketRouter;
use crate::service::heartbeat::HeartbeatMonitor;
use crate::session::{CloseReason, Session, SessionRegistry};
use crate::utils::metrics::Metrics;
use crate::utils::pool::{buffer_pool, BufferPool};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct AppContext {
    config: FrameworkConfig,
    metrics: Arc<Metrics>,
    buffers: BufferPool,
    bus: EventBus,
    sessions: Arc<SessionRegistry>,
    router: PacketRouter,
    signer: Option<PacketSigner>,
    cipher: Option<PacketCipher>,
    cancel: CancellationToken,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("address", &self.config.server.address)
            .field("sessions", &self.sessions.len())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Validate `config` and build every runtime object.
    ///
    /// Must be called from within a Tokio runtime; the event bus consumer is
    /// spawned here.
    pub fn new(config: FrameworkConfig, commands: CommandRegistry) -> Result<Arc<Self>> {
        config.validate_strict()?;

        let metrics = Arc::new(Metrics::new());
        let buffers = buffer_pool(config.pool.max_size);
        let preloaded = buffers.preload(config.pool.preload)?;

        let signer = config
            .packet
            .signing_key
            .as_deref()
            .map(PacketSigner::new)
            .transpose()?;
        let cipher = config
            .packet
            .encryption_key
            .as_deref()
            .map(PacketCipher::from_hex)
            .transpose()?;

        let bus = EventBus::new(&config.event_bus, metrics.clone());
        let sessions = Arc::new(SessionRegistry::new(
            bus.clone(),
            metrics.clone(),
            config.server.max_connections,
        ));
        let commands = Arc::new(commands.with_metrics(metrics.clone()));
        let router = PacketRouter::new(commands, bus.clone());

        info!(
            app = %config.logging.app_name,
            commands = router.commands().len(),
            preloaded,
            signed = signer.is_some(),
            encrypted = cipher.is_some(),
            "Application context created"
        );

        Ok(Arc::new(Self {
            config,
            metrics,
            buffers,
            bus,
            sessions,
            router,
            signer,
            cipher,
            cancel: CancellationToken::new(),
            monitor: Mutex::new(None),
        }))
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn router(&self) -> &PacketRouter {
        &self.router
    }

    pub fn commands(&self) -> &CommandRegistry {
        self.router.commands()
    }

    /// Cancelled when `shutdown` begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Codec configured with this context's size limit, scratch pool, signer and cipher
    pub fn codec(&self) -> PacketCodec {
        let mut codec = PacketCodec::new(self.config.packet.max_packet_size)
            .with_scratch(self.buffers.clone());
        if let Some(signer) = &self.signer {
            codec = codec.with_signer(signer.clone());
        }
        if let Some(cipher) = &self.cipher {
            codec = codec.with_cipher(cipher.clone());
        }
        codec
    }

    /// Spawn the heartbeat monitor. Later calls do nothing.
    pub async fn start(&self) {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let handle = HeartbeatMonitor::new(self.sessions.clone(), self.config.server.sweep_interval)
            .with_pool_trim(self.buffers.clone(), self.config.pool.keep_alive)
            .start(self.cancel.child_token());
        *monitor = Some(handle);
        info!(
            timeout_ms = self.config.server.heartbeat_timeout.as_millis() as u64,
            "Application context started"
        );
    }

    /// Accept a connection: attach the built-in components, register the
    /// session, mark it active and publish `OnClientConnected`.
    pub async fn open_session(
        &self,
        peer: Option<SocketAddr>,
        outbound: Option<mpsc::Sender<Packet>>,
    ) -> Result<Arc<Session>> {
        let session = Arc::new(Session::new(peer, outbound));
        let components = session.components();
        components.add(Heartbeat::new(self.config.server.heartbeat_timeout))?;
        components.add_default::<ActivityTracker>()?;
        components.add(PermissionGroup::new(PermissionLevel::GUEST))?;

        match self.buffers.lease() {
            Ok(buffer) => session.attach_scratch(buffer),
            Err(e) => debug!(error = %e, "Session opened without scratch buffer"),
        }

        if let Err(e) = self.sessions.insert(session.clone()) {
            session.close(CloseReason::Shutdown);
            return Err(e);
        }
        session.activate();
        info!(session = %session.id(), ?peer, "Client connected");

        let event = EventArgs::new(events::ON_CLIENT_CONNECTED).with_session(session.id());
        if let Err(e) = self.bus.publish_event(event).await {
            warn!(session = %session.id(), error = %e, "Connect event not published");
        }
        Ok(session)
    }

    /// Stop background work and release everything. Safe to call twice.
    ///
    /// Draining is bounded by `server.shutdown_timeout`; the pool is disposed
    /// either way.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let limit = self.config.server.shutdown_timeout;

        let drain = async {
            if let Some(handle) = self.monitor.lock().await.take() {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Heartbeat monitor terminated abnormally");
                }
            }
            let closed = self.sessions.close_all(CloseReason::Shutdown).await;
            self.bus.shutdown().await;
            closed
        };

        match tokio::time::timeout(limit, drain).await {
            Ok(closed) => info!(sessions_closed = closed, "Application context shut down"),
            Err(_) => warn!(
                timeout_ms = limit.as_millis() as u64,
                "Shutdown timed out before the event bus drained"
            ),
        }
        self.buffers.dispose();
        self.metrics.log_metrics();
    }
}
