//! TCP transport: accept loop, per-connection tasks and a client.
//!
//! Each accepted stream becomes a session. A reader loop decodes frames and
//! hands them to the router; a writer task drains the session's outbound
//! channel. The reader stops when the peer disconnects, a frame fails to decode,
//! or the session is closed elsewhere (heartbeat eviction, kick, shutdown).

use crate::component::ActivityTracker;
use crate::context::AppContext;
use crate::core::codec::PacketCodec;
use crate::core::packet::{Packet, PacketType};
use crate::error::{FrameworkError, Result};
use crate::protocol::pending::PendingRequests;
use crate::session::CloseReason;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Per-session outbound queue depth
pub const OUTBOUND_QUEUE: usize = 256;

/// Default wait for a correlated reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bind the listen address from the context's configuration
pub async fn bind(ctx: &AppContext) -> Result<TcpListener> {
    let listener = TcpListener::bind(&ctx.config().server.address).await?;
    info!(address = %listener.local_addr()?, "Listening");
    Ok(listener)
}

/// Start the context, serve until CTRL+C, then shut everything down
#[instrument(skip(ctx), fields(address = %ctx.config().server.address))]
pub async fn start_server(ctx: Arc<AppContext>) -> Result<()> {
    ctx.start().await;
    let listener = bind(&ctx).await?;

    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            signal_ctx.shutdown().await;
        }
    });

    serve(listener, ctx.clone()).await?;
    ctx.shutdown().await;
    Ok(())
}

/// Accept connections until the context shuts down
#[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>) -> Result<()> {
    let shutdown = ctx.shutdown_token();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Server stopped accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, ctx).await {
                            debug!(%peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "Error accepting connection"),
            }
        }
    }
}

#[instrument(skip(stream, ctx), fields(%peer))]
async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<AppContext>) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut sink, mut frames) = Framed::new(stream, ctx.codec()).split();
    let (tx, mut rx) = mpsc::channel::<Packet>(OUTBOUND_QUEUE);

    let session = match ctx.open_session(Some(peer), Some(tx)).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Connection refused");
            let _ = sink.send(Packet::error("connect", e.to_string())).await;
            return Err(e);
        }
    };

    let metrics = ctx.metrics().clone();
    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            if let Err(e) = sink.send(packet).await {
                warn!(error = %e, "Write failed");
                break;
            }
            metrics.packet_sent();
            writer_session
                .components()
                .with_mut::<ActivityTracker, _>(ActivityTracker::record_outbound);
        }
        let _ = sink.close().await;
    });

    let closed = session.closed_token();
    let reason = loop {
        tokio::select! {
            () = closed.cancelled() => break None,
            frame = frames.next() => match frame {
                Some(Ok(packet)) => {
                    ctx.metrics().packet_decoded();
                    match ctx.router().route(&session, packet).await {
                        Ok(Some(reply)) => {
                            if session.send(reply).await.is_err() {
                                break Some(CloseReason::Disconnected);
                            }
                        }
                        Ok(None) => {}
                        Err(FrameworkError::BusShutdown) => break Some(CloseReason::Shutdown),
                        Err(e) => warn!(error = %e, "Routing failed"),
                    }
                }
                Some(Err(e)) => {
                    ctx.metrics().packet_rejected();
                    warn!(error = %e, "Malformed frame, closing connection");
                    let _ = session.send(Packet::error("protocol", e.to_string())).await;
                    break Some(CloseReason::ProtocolError);
                }
                None => break Some(CloseReason::Disconnected),
            }
        }
    };

    if let Some(reason) = reason {
        ctx.sessions().close(session.id(), reason).await;
    }
    if let Err(e) = writer.await {
        error!(error = %e, "Writer task failed");
    }
    Ok(())
}

/// Client half of the TCP transport
pub struct Client {
    outbound: mpsc::Sender<Packet>,
    inbound: mpsc::Receiver<Packet>,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pending", &self.pending.len())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Connect to a server using `codec` for framing
#[instrument(skip(addr, codec))]
pub async fn connect<A: ToSocketAddrs>(addr: A, codec: PacketCodec) -> Result<Client> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    let (mut sink, mut frames) = Framed::new(stream, codec).split();

    let (out_tx, mut out_rx) = mpsc::channel::<Packet>(OUTBOUND_QUEUE);
    let (in_tx, in_rx) = mpsc::channel::<Packet>(OUTBOUND_QUEUE);
    let pending = Arc::new(PendingRequests::new());
    let cancel = CancellationToken::new();

    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => break,
                next = out_rx.recv() => match next {
                    Some(packet) => {
                        if let Err(e) = sink.send(packet).await {
                            warn!(error = %e, "Client write failed");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = sink.close().await;
    });

    let reader_pending = pending.clone();
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = reader_cancel.cancelled() => break,
                frame = frames.next() => match frame {
                    Some(Ok(packet)) => {
                        if let Some(unsolicited) = reader_pending.resolve(packet) {
                            if in_tx.send(unsolicited).await.is_err() {
                                debug!("Inbound receiver dropped");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Client read failed");
                        break;
                    }
                    None => break,
                },
            }
        }
        reader_pending.fail_all();
        reader_cancel.cancel();
    });

    info!(%peer, "Connected");
    Ok(Client {
        outbound: out_tx,
        inbound: in_rx,
        pending,
        cancel,
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
    })
}

impl Client {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Send without waiting for a reply
    pub async fn send(&self, packet: Packet) -> Result<()> {
        self.outbound
            .send(packet)
            .await
            .map_err(|_| FrameworkError::ConnectionClosed)
    }

    /// Send `packet` and wait for the reply with the same key.
    ///
    /// A key is generated when the packet has none.
    pub async fn request(&self, mut packet: Packet) -> Result<Packet> {
        let key = packet
            .key
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let reply = self.pending.register(key.clone());
        self.send(packet).await?;

        match tokio::time::timeout(self.request_timeout, reply).await {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_)) => Err(FrameworkError::ConnectionClosed),
            Err(_) => {
                self.pending.cancel(&key);
                Err(FrameworkError::Timeout)
            }
        }
    }

    /// Run a command on the server; the reply is a Response or Error packet
    pub async fn command(&self, name: &str, args: Vec<Value>) -> Result<Packet> {
        self.request(Packet::command(name, args)).await
    }

    /// Send a heartbeat and wait for the echo
    pub async fn heartbeat(&self) -> Result<Packet> {
        let reply = self.request(Packet::heartbeat()).await?;
        if reply.packet_type != PacketType::Heartbeat {
            return Err(FrameworkError::ProtocolFormat(format!(
                "Expected heartbeat reply, got {}",
                reply.packet_type
            )));
        }
        Ok(reply)
    }

    /// Next packet that did not answer a request; `None` once disconnected
    pub async fn recv(&mut self) -> Option<Packet> {
        self.inbound.recv().await
    }

    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop both I/O tasks and fail outstanding requests
    pub fn close(&self) {
        self.cancel.cancel();
        self.pending.fail_all();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
