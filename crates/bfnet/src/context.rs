//! Shared server context.
//!
//! One `Context` is built per server and cloned into every connection
//! task. It is the only state shared between connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bfnet_protocol::PacketRegistry;
use bfnet_session::{SessionConfig, SessionContext};
use bfnet_transport::ConnectionId;

use crate::BfnetError;

/// Identity of one accepted connection, passed to the lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sessions: SessionContext,
    active: AtomicUsize,
    accepted: AtomicU64,
}

impl Context {
    pub fn new(registry: PacketRegistry, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: SessionContext::new(Arc::new(registry), config),
                active: AtomicUsize::new(0),
                accepted: AtomicU64::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &PacketRegistry {
        &self.inner.sessions.registry
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.inner.sessions.config
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.inner.sessions
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Connections accepted since the server started.
    pub fn accepted_connections(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Runs `f` on tokio's blocking pool so a handler can call
    /// synchronous code without stalling other connections.
    pub async fn run_blocking<F, R>(&self, f: F) -> Result<R, BfnetError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(tokio::task::spawn_blocking(f).await?)
    }

    /// Counts a connection as active until the guard drops.
    pub(crate) fn track(&self) -> ActiveGuard {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
        self.inner.active.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(self.clone())
    }
}

pub(crate) struct ActiveGuard(Context);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.inner.active.fetch_sub(1, Ordering::Relaxed);
    }
}
