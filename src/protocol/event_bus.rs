//! # Event Bus
//!
//! Bounded multi-producer queue drained by one background consumer.
//!
//! ## Delivery
//! - Events are dispatched in arrival order
//! - All handlers of one event run concurrently and are joined before the
//!   next event is taken; no order is defined among them
//! - A handler error or panic is logged and counted, then ignored
//!
//! ## Backpressure
//! `publish` waits while the queue is full. Once shutdown begins it fails with
//! [`FrameworkError::BusShutdown`] instead.
//!
//! ## Shutdown
//! The consumer finishes the dispatch in progress, closes the queue, then
//! flushes or discards what is left according to [`ShutdownPolicy`].

use crate::config::{EventBusConfig, ShutdownPolicy};
use crate::core::packet::Packet;
use crate::error::{constants, FrameworkError, Result};
use crate::utils::metrics::Metrics;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Event names the runtime itself publishes
pub mod events {
    pub const ON_CLIENT_CONNECTED: &str = "OnClientConnected";
    pub const ON_CLIENT_DISCONNECTED: &str = "OnClientDisconnected";
    pub const ON_DATA_RECEIVED: &str = "OnDataReceived";
}

/// Payload delivered to handlers
#[derive(Debug, Clone, PartialEq)]
pub struct EventArgs {
    pub name: String,
    /// Session the event concerns, if any
    pub session: Option<Uuid>,
    /// Packet that triggered the event, if any
    pub packet: Option<Packet>,
    pub payload: Value,
}

impl EventArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session: None,
            packet: None,
            payload: Value::Null,
        }
    }

    pub fn with_session(mut self, session: Uuid) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_packet(mut self, packet: Packet) -> Self {
        self.packet = Some(packet);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// Something that reacts to events
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Arc<EventArgs>) -> Result<()>;
}

/// [`EventHandler`] backed by an async closure
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arc<EventArgs>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<EventArgs>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, event: Arc<EventArgs>) -> Result<()> {
        (self.f)(event).await
    }
}

/// Registration handle returned by the `add_listener*` family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Registered {
    id: HandlerId,
    tag: Option<String>,
    handler: Arc<dyn EventHandler>,
}

/// Handlers are keyed by name or by numeric id; the two never overlap
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EventKey {
    Name(String),
    Id(u32),
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Id(id) => write!(f, "#{id}"),
        }
    }
}

type HandlerTable = RwLock<HashMap<EventKey, Vec<Registered>>>;
type Queued = (EventKey, Arc<EventArgs>);

struct BusInner {
    tx: mpsc::Sender<Queued>,
    handlers: Arc<HandlerTable>,
    ids: RwLock<HashMap<u32, HandlerId>>,
    cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
    metrics: Arc<Metrics>,
}

/// Cloneable handle to one running bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create the queue and spawn its consumer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &EventBusConfig, metrics: Arc<Metrics>) -> Self {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let handlers: Arc<HandlerTable> = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let consumer = tokio::spawn(consume(
            rx,
            handlers.clone(),
            cancel.clone(),
            config.shutdown_policy,
            metrics.clone(),
        ));

        info!(capacity, policy = ?config.shutdown_policy, "Event bus started");

        Self {
            inner: Arc::new(BusInner {
                tx,
                handlers,
                ids: RwLock::new(HashMap::new()),
                cancel,
                consumer: Mutex::new(Some(consumer)),
                capacity,
                metrics,
            }),
        }
    }

    /// Add a handler under `name`. Registering the same name again adds another handler.
    pub fn add_listener<H: EventHandler>(&self, name: &str, handler: H) -> Result<HandlerId> {
        self.insert(EventKey::Name(name.to_string()), None, Arc::new(handler))
    }

    /// Add a handler under `name` unless `tag` is already registered there.
    ///
    /// A repeated tag is a no-op that returns the existing handler's id.
    pub fn add_listener_tagged<H: EventHandler>(
        &self,
        name: &str,
        tag: &str,
        handler: H,
    ) -> Result<HandlerId> {
        self.insert(EventKey::Name(name.to_string()), Some(tag), Arc::new(handler))
    }

    /// Bind a handler to a numeric id. Each id has exactly one handler and
    /// is separate from every named event, including the name `"7"` for id 7.
    ///
    /// Fails with `DuplicateEventId` if the id is taken.
    pub fn add_listener_id<H: EventHandler>(&self, id: u32, handler: H) -> Result<HandlerId> {
        let mut ids = self
            .inner
            .ids
            .write()
            .map_err(|_| FrameworkError::Custom(constants::ERR_HANDLERS_LOCK.to_string()))?;
        if ids.contains_key(&id) {
            return Err(FrameworkError::DuplicateEventId(id));
        }
        let handler_id = self.insert(EventKey::Id(id), None, Arc::new(handler))?;
        ids.insert(id, handler_id);
        Ok(handler_id)
    }

    fn insert(
        &self,
        key: EventKey,
        tag: Option<&str>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<HandlerId> {
        let mut table = self
            .inner
            .handlers
            .write()
            .map_err(|_| FrameworkError::Custom(constants::ERR_HANDLERS_LOCK.to_string()))?;
        let event = key.to_string();
        let entries = table.entry(key).or_default();

        if let Some(tag) = tag {
            if let Some(existing) = entries.iter().find(|r| r.tag.as_deref() == Some(tag)) {
                debug!(%event, tag, "Tagged handler already registered");
                return Ok(existing.id);
            }
        }

        let id = HandlerId(Uuid::new_v4());
        entries.push(Registered {
            id,
            tag: tag.map(str::to_string),
            handler,
        });
        debug!(%event, handler = %id, "Handler registered");
        Ok(id)
    }

    /// Remove one handler. Returns whether it was registered.
    pub fn remove_listener(&self, id: HandlerId) -> Result<bool> {
        let key = {
            let mut table = self
                .inner
                .handlers
                .write()
                .map_err(|_| FrameworkError::Custom(constants::ERR_HANDLERS_LOCK.to_string()))?;
            let Some((key, entries)) = table
                .iter_mut()
                .find(|(_, entries)| entries.iter().any(|r| r.id == id))
            else {
                return Ok(false);
            };
            entries.retain(|r| r.id != id);
            let key = key.clone();
            if entries.is_empty() {
                table.remove(&key);
            }
            key
        };

        // Removing an id's handler frees the id
        if let EventKey::Id(numeric) = key {
            self.inner
                .ids
                .write()
                .map_err(|_| FrameworkError::Custom(constants::ERR_HANDLERS_LOCK.to_string()))?
                .remove(&numeric);
        }
        Ok(true)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .handlers
            .read()
            .map(|table| {
                table
                    .get(&EventKey::Name(name.to_string()))
                    .map_or(0, Vec::len)
            })
            .unwrap_or(0)
    }

    /// Queue an event with no session or packet
    pub async fn publish(&self, name: &str, payload: impl Into<Value>) -> Result<()> {
        self.publish_event(EventArgs::new(name).with_payload(payload))
            .await
    }

    /// Queue an event for the handler bound to a numeric id.
    ///
    /// The handler sees the id as the event name.
    pub async fn publish_id(&self, id: u32, payload: impl Into<Value>) -> Result<()> {
        let registered = self
            .inner
            .ids
            .read()
            .map_err(|_| FrameworkError::Custom(constants::ERR_HANDLERS_LOCK.to_string()))?
            .contains_key(&id);
        if !registered {
            return Err(FrameworkError::EventNotFound(id));
        }
        let event = EventArgs::new(id.to_string()).with_payload(payload);
        self.enqueue(EventKey::Id(id), event).await
    }

    /// Queue `event`, waiting while the queue is full
    pub async fn publish_event(&self, event: EventArgs) -> Result<()> {
        self.enqueue(EventKey::Name(event.name.clone()), event).await
    }

    async fn enqueue(&self, key: EventKey, event: EventArgs) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(FrameworkError::BusShutdown);
        }

        let queued = (key, Arc::new(event));
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => Err(FrameworkError::BusShutdown),
            sent = self.inner.tx.send(queued) => {
                sent.map_err(|_| FrameworkError::BusShutdown)?;
                self.inner.metrics.event_published();
                Ok(())
            }
        }
    }

    /// Events waiting in the queue
    pub fn queued(&self) -> usize {
        self.inner.capacity - self.inner.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Stop accepting events and wait for the consumer to exit.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.consumer.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Event bus consumer terminated abnormally");
            }
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<Queued>,
    handlers: Arc<HandlerTable>,
    cancel: CancellationToken,
    policy: ShutdownPolicy,
    metrics: Arc<Metrics>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some((key, event)) => dispatch(&handlers, &metrics, &key, event).await,
                None => break,
            },
        }
    }

    rx.close();
    match policy {
        ShutdownPolicy::Flush => {
            let mut flushed = 0usize;
            while let Ok((key, event)) = rx.try_recv() {
                dispatch(&handlers, &metrics, &key, event).await;
                flushed += 1;
            }
            info!(flushed, "Event bus stopped");
        }
        ShutdownPolicy::Discard => {
            let mut discarded = 0u64;
            while rx.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                warn!(discarded, "Event bus stopped with undelivered events");
                metrics.events_discarded(discarded);
            } else {
                info!("Event bus stopped");
            }
        }
    }
}

async fn dispatch(
    handlers: &HandlerTable,
    metrics: &Metrics,
    key: &EventKey,
    event: Arc<EventArgs>,
) {
    let targets: Vec<(HandlerId, Arc<dyn EventHandler>)> = match handlers.read() {
        Ok(table) => table
            .get(key)
            .map(|entries| entries.iter().map(|r| (r.id, r.handler.clone())).collect())
            .unwrap_or_default(),
        Err(_) => {
            error!(event = %key, "{}", constants::ERR_HANDLERS_LOCK);
            return;
        }
    };

    let (ids, tasks): (Vec<_>, Vec<_>) = targets
        .into_iter()
        .map(|(id, handler)| {
            let event = event.clone();
            (id, tokio::spawn(async move { handler.handle(event).await }))
        })
        .unzip();

    for (id, outcome) in ids.into_iter().zip(join_all(tasks).await) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics.handler_fault();
                warn!(event = %key, handler = %id, error = %e, "Event handler failed");
            }
            Err(e) => {
                metrics.handler_fault();
                error!(event = %key, handler = %id, error = %e, "Event handler panicked");
            }
        }
    }

    metrics.event_dispatched();
}
