//! `ServerBuilder` and the accept loop.
//!
//! This is the entry point for running a bfnet server. It ties together
//! all the layers: transport → session → handler.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bfnet_protocol::{Packet, PacketId, PacketRegistry, PacketType};
use bfnet_session::{Session, SessionConfig};
use bfnet_transport::{Connection, TcpTransport, Transport, TransportError};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::{BfnetError, ConnectionInfo, Context, Handler, ServerConfig};

/// Builder for configuring and starting a bfnet server.
///
/// Packet types are registered here, before the server starts, and the
/// registry is read-only afterwards.
///
/// # Example
///
/// ```rust,ignore
/// use bfnet::prelude::*;
///
/// let server = ServerBuilder::new()
///     .bind("0.0.0.0:7070")
///     .register_raw(PacketId(7))
///     .build(handler_fn(echo))
///     .await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    registry: PacketRegistry,
}

impl ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: PacketRegistry::new(),
        }
    }

    /// Replaces the whole configuration. Registered packet types are kept.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    pub fn read_buffer(mut self, size: usize) -> Self {
        self.config.read_buffer = size;
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.config.drain_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Registers `T` under its static id after validating its schema.
    pub fn register_type<T: PacketType>(mut self) -> Result<Self, BfnetError> {
        self.registry.register_type::<T>()?;
        Ok(self)
    }

    /// Registers a raw-payload packet type under `id`.
    pub fn register_raw(mut self, id: PacketId) -> Self {
        self.registry.register_raw(id);
        self
    }

    /// Registers a custom factory under `id`.
    pub fn register<F>(mut self, id: PacketId, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Packet> + Send + Sync + 'static,
    {
        self.registry.register(id, factory);
        self
    }

    /// Binds a TCP listener at the configured address.
    pub async fn build<H: Handler>(self, handler: H) -> Result<Server<TcpTransport, H>, BfnetError> {
        let transport = TcpTransport::bind(&self.config.bind_addr)
            .await?
            .with_read_buffer(self.config.read_buffer);
        Ok(self.build_with(transport, handler))
    }

    /// Serves connections from an already-bound transport.
    pub fn build_with<T: Transport, H: Handler>(self, transport: T, handler: H) -> Server<T, H> {
        tracing::debug!(registered = ?self.registry.ids(), "packet registry sealed");
        let ctx = Context::new(self.registry, self.config.session);
        Server {
            transport,
            handler: Arc::new(handler),
            ctx,
            drain_grace: self.config.drain_grace(),
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound bfnet server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct Server<T: Transport, H: Handler> {
    transport: T,
    handler: Arc<H>,
    ctx: Context,
    drain_grace: Duration,
}

impl<T: Transport, H: Handler> Server<T, H> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BfnetError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), BfnetError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// On shutdown the listener stops, every open session starts closing,
    /// and the call returns once all connection tasks have finished.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), BfnetError>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "bfnet server running");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                Some(done) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = done {
                        tracing::error!(error = %e, "connection task failed");
                    }
                }

                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        connections.spawn(serve_connection(
                            conn,
                            Arc::clone(&self.handler),
                            self.ctx.clone(),
                            self.drain_grace,
                            stop_rx.clone(),
                        ));
                    }
                    Err(TransportError::Shutdown) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!(open = connections.len(), "bfnet server shutting down");
        let _ = stop_tx.send(true);
        if let Err(e) = self.transport.shutdown().await {
            tracing::warn!(error = %e, "transport shutdown failed");
        }
        while let Some(done) = connections.join_next().await {
            if let Err(e) = done {
                tracing::error!(error = %e, "connection task failed");
            }
        }
        Ok(())
    }
}

/// Drives one connection from accept to `on_disconnect`.
async fn serve_connection<C, H>(
    conn: C,
    handler: Arc<H>,
    ctx: Context,
    grace: Duration,
    mut stop: watch::Receiver<bool>,
) where
    C: Connection,
    H: Handler,
{
    let _active = ctx.track();
    let info = ConnectionInfo {
        id: conn.id(),
        peer_addr: conn.peer_addr(),
    };
    let conn_id = info.id;
    tracing::info!(%conn_id, peer = ?info.peer_addr, "connection accepted");

    handler.on_connection(&ctx, &info).await;

    let (session, driver) = H::Session::open(conn, ctx.session_context());
    let handle = session.handle().clone();
    let driver = driver.spawn();
    let mut task: JoinHandle<()> = tokio::spawn({
        let handler = Arc::clone(&handler);
        let ctx = ctx.clone();
        async move { handler.handle(&ctx, session).await }
    });

    let finished = tokio::select! {
        res = &mut task => Some(res),
        _ = handle.closing() => None,
        _ = stopped(&mut stop) => {
            handle.close();
            None
        }
    };

    let outcome = match finished {
        Some(res) => Some(res),
        None => match tokio::time::timeout(grace, &mut task).await {
            Ok(res) => Some(res),
            Err(_) => {
                tracing::debug!(%conn_id, "drain grace elapsed, tearing session down");
                handle.teardown();
                match tokio::time::timeout(grace, &mut task).await {
                    Ok(res) => Some(res),
                    Err(_) => {
                        tracing::warn!(%conn_id, "handler ignored teardown, aborting it");
                        task.abort();
                        None
                    }
                }
            }
        },
    };
    if let Some(Err(e)) = outcome {
        tracing::error!(%conn_id, error = %e, "handler task failed");
    }

    handle.teardown();
    if let Err(e) = driver.await {
        tracing::error!(%conn_id, error = %e, "session driver failed");
    }

    handler.on_disconnect(&ctx, &info).await;
    tracing::info!(%conn_id, "connection closed");
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|s| *s).await;
}
