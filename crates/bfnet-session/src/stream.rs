//! Byte-level session: read events in, read events out.
//!
//! For handlers that speak their own protocol over a bfnet server. No
//! frame decoding happens; each read returns one transport read event.

use std::net::SocketAddr;

use bfnet_transport::{Connection, ConnectionId};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::driver::{Outbox, SessionDriver, Step};
use crate::queue::{InboundQueue, inbound_queue};
use crate::state::{SessionHandle, SessionState, StateWatch};
use crate::{Session, SessionContext, SessionError};

#[derive(Debug)]
pub struct ByteSession {
    handle: SessionHandle,
    state: StateWatch,
    queue: InboundQueue<Vec<u8>>,
    outbox: Outbox,
    peer_addr: Option<SocketAddr>,
}

impl ByteSession {
    /// Wraps `conn`. Only the closed-write policy of `ctx` applies.
    pub fn open<C: Connection>(conn: C, ctx: &SessionContext) -> (Self, SessionDriver) {
        let peer_addr = conn.peer_addr();
        let handle = SessionHandle::new(conn.id());
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue) = inbound_queue();

        let driver = SessionDriver::new(conn, handle.clone(), out_rx, queue_tx, |buf: &[u8]| {
            Step::Deliver(buf.to_vec())
        });
        let session = Self {
            state: handle.subscribe(),
            outbox: Outbox::new(handle.clone(), out_tx, ctx.config.closed_write_policy),
            handle,
            queue,
            peer_addr,
        };
        (session, driver)
    }

    /// Waits for the next read event. `None` means end-of-stream.
    pub async fn read(&mut self) -> Option<Vec<u8>> {
        if self.state.current() == SessionState::Closed {
            self.queue.close();
            return None;
        }
        tokio::select! {
            biased;
            _ = self.state.wait_until(|s| s == SessionState::Closed) => {
                self.queue.close();
                None
            }
            buf = self.queue.pop() => buf,
        }
    }

    /// Queues `data` for the transport without waiting.
    pub fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        self.outbox.send(Bytes::copy_from_slice(data))
    }

    pub async fn drain(&self) {
        self.outbox.drain().await
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }
}

impl Drop for ByteSession {
    fn drop(&mut self) {
        self.handle.close();
    }
}

impl Session for ByteSession {
    type Item = Vec<u8>;

    fn open<C: Connection>(conn: C, ctx: &SessionContext) -> (Self, SessionDriver) {
        ByteSession::open(conn, ctx)
    }

    fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    fn read(&mut self) -> impl Future<Output = Option<Self::Item>> + Send {
        ByteSession::read(self)
    }
}
