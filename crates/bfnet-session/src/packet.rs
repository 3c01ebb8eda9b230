//! Packet-level session: frames in, typed packets out.

use std::net::SocketAddr;
use std::sync::Arc;

use bfnet_protocol::{Dispatch, Packet, PacketId, PacketRegistry, encode_frame};
use bfnet_transport::{Connection, ConnectionId};
use tokio::sync::mpsc;

use crate::driver::{Outbox, SessionDriver, Step};
use crate::queue::{InboundQueue, inbound_queue};
use crate::state::{SessionConfig, SessionHandle, SessionState, StateWatch};
use crate::{Session, SessionError};

/// What every session on a server shares.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub registry: Arc<PacketRegistry>,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn new(registry: Arc<PacketRegistry>, config: SessionConfig) -> Self {
        Self { registry, config }
    }
}

/// One connection speaking the framed packet protocol.
///
/// Incoming frames are decoded by the driver as they arrive and queued in
/// arrival order. Unknown type ids and payloads the packet type rejects
/// cost only that frame. A malformed header closes the connection.
#[derive(Debug)]
pub struct PacketSession {
    handle: SessionHandle,
    state: StateWatch,
    queue: InboundQueue<Box<dyn Packet>>,
    outbox: Outbox,
    version: i16,
    peer_addr: Option<SocketAddr>,
}

impl PacketSession {
    /// Wraps `conn`. The session makes no progress until the returned
    /// driver runs.
    pub fn open<C: Connection>(conn: C, ctx: &SessionContext) -> (Self, SessionDriver) {
        let conn_id = conn.id();
        let peer_addr = conn.peer_addr();
        let handle = SessionHandle::new(conn_id);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue) = inbound_queue();

        let registry = Arc::clone(&ctx.registry);
        let version = ctx.config.protocol_version;
        let decode = move |frame: &[u8]| match registry.dispatch(frame) {
            Ok(Dispatch::Packet { header, packet }) => {
                if header.version != version {
                    tracing::debug!(
                        %conn_id,
                        version = header.version,
                        expected = version,
                        "protocol version mismatch"
                    );
                }
                Step::Deliver(packet)
            }
            Ok(Dispatch::UnknownType(_)) | Ok(Dispatch::Rejected { .. }) => Step::Skip,
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "malformed frame header, dropping client");
                Step::Fatal
            }
        };

        let driver = SessionDriver::new(conn, handle.clone(), out_rx, queue_tx, decode);
        let session = Self {
            state: handle.subscribe(),
            outbox: Outbox::new(handle.clone(), out_tx, ctx.config.closed_write_policy),
            handle,
            queue,
            version,
            peer_addr,
        };
        (session, driver)
    }

    /// Waits for the next packet.
    ///
    /// Returns `None` once the session is torn down, or once the
    /// connection ended and every packet that arrived before it was read.
    pub async fn read(&mut self) -> Option<Box<dyn Packet>> {
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
            packet = self.queue.pop() => packet,
        }
    }

    /// Encodes `packet` and queues it for the transport without waiting.
    ///
    /// Encode errors are returned and nothing is sent. After close the
    /// write follows the configured [`ClosedWritePolicy`](crate::ClosedWritePolicy).
    pub fn write(&self, packet: &dyn Packet) -> Result<(), SessionError> {
        let payload = match packet.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(conn_id = %self.handle.id(), type_id = %packet.id(), error = %e, "packet encode failed");
                return Err(e.into());
            }
        };
        self.write_raw(packet.id(), &payload)
    }

    /// Sends `payload` under `id` without going through a packet type.
    pub fn write_raw(&self, id: PacketId, payload: &[u8]) -> Result<(), SessionError> {
        tracing::debug!(conn_id = %self.handle.id(), type_id = %id, len = payload.len(), "frame queued");
        self.outbox.send(encode_frame(self.version, id, payload))
    }

    /// Waits until every write issued so far reached the transport.
    pub async fn drain(&self) {
        self.outbox.drain().await
    }

    /// Starts closing the connection.
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

impl Drop for PacketSession {
    fn drop(&mut self) {
        self.handle.close();
    }
}

impl Session for PacketSession {
    type Item = Box<dyn Packet>;

    fn open<C: Connection>(conn: C, ctx: &SessionContext) -> (Self, SessionDriver) {
        PacketSession::open(conn, ctx)
    }

    fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    fn read(&mut self) -> impl Future<Output = Option<Self::Item>> + Send {
        PacketSession::read(self)
    }
}
