//! Connection handlers.
//!
//! A [`Handler`] is the application code behind a server. The server
//! calls its hooks in this order for every accepted connection:
//!
//!   1. `on_connection` before the session opens
//!   2. `handle` on its own task with the open session
//!   3. `on_disconnect` after the session is torn down

use std::future::Future;
use std::marker::PhantomData;

use bfnet_session::Session;

use crate::{ConnectionInfo, Context};

pub trait Handler: Send + Sync + 'static {
    /// Which layer the handler reads from: `PacketSession` or `ByteSession`.
    type Session: Session;

    fn on_connection(
        &self,
        _ctx: &Context,
        _info: &ConnectionInfo,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Serves one connection. Returning closes it.
    fn handle(
        &self,
        ctx: &Context,
        session: Self::Session,
    ) -> impl Future<Output = ()> + Send;

    fn on_disconnect(
        &self,
        _ctx: &Context,
        _info: &ConnectionInfo,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// A [`Handler`] built from an async closure. See [`handler_fn`].
pub struct HandlerFn<S, F> {
    f: F,
    _session: PhantomData<fn() -> S>,
}

/// Wraps a closure as a handler with no lifecycle hooks.
///
/// ```rust,ignore
/// let handler = handler_fn(|_ctx, mut session: PacketSession| async move {
///     while let Some(packet) = session.read().await {
///         let _ = session.write(packet.as_ref());
///     }
/// });
/// ```
pub fn handler_fn<S, F, Fut>(f: F) -> HandlerFn<S, F>
where
    S: Session,
    F: Fn(Context, S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    HandlerFn {
        f,
        _session: PhantomData,
    }
}

impl<S, F, Fut> Handler for HandlerFn<S, F>
where
    S: Session,
    F: Fn(Context, S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    type Session = S;

    fn handle(&self, ctx: &Context, session: S) -> impl Future<Output = ()> + Send {
        (self.f)(ctx.clone(), session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfnet_protocol::{PacketId, PacketRegistry};
    use bfnet_session::{PacketSession, SessionConfig};
    use bfnet_transport::MemoryConnection;

    #[tokio::test]
    async fn test_handler_fn_serves_session() {
        let mut registry = PacketRegistry::new();
        registry.register_raw(PacketId(7));
        let ctx = Context::new(registry, SessionConfig::default());

        let handler = handler_fn(|_ctx, mut session: PacketSession| async move {
            while let Some(packet) = session.read().await {
                let _ = session.write(packet.as_ref());
            }
        });

        let (conn, mut peer) = MemoryConnection::pair();
        let (session, driver) = PacketSession::open(conn, ctx.session_context());
        driver.spawn();
        let served = tokio::spawn({
            let ctx = ctx.clone();
            async move { handler.handle(&ctx, session).await }
        });

        peer.send(bfnet_protocol::encode_frame(1, PacketId(7), b"hi").to_vec());
        let echoed = peer.recv().await.unwrap();
        assert_eq!(echoed, b"BF\x00\x01\x00\x07hi");

        peer.hang_up();
        served.await.unwrap();
    }
}
