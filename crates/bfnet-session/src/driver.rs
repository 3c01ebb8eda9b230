//! Per-connection I/O driver.
//!
//! Each session owns exactly one driver task. The driver is the only code
//! that touches the transport: it reads events, decodes them inline,
//! pushes the results onto the inbound queue, forwards queued writes,
//! and closes the transport once when the loop ends.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bfnet_transport::{Connection, ConnectionId};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::queue::QueueSender;
use crate::state::{ClosedWritePolicy, SessionHandle, SessionState};
use crate::SessionError;

/// Work for the driver's write side.
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Bytes),
    /// Acknowledged once every earlier frame reached the transport.
    Flush(oneshot::Sender<()>),
}

/// What the decoder made of one read event.
pub(crate) enum Step<I> {
    Deliver(I),
    Skip,
    /// The connection cannot continue; close it.
    Fatal,
}

/// The connection's I/O loop, not yet running.
///
/// Sessions return this from `open` so the caller decides where it runs.
/// [`spawn`](SessionDriver::spawn) is the usual choice.
#[must_use = "the session makes no progress until its driver runs"]
pub struct SessionDriver {
    id: ConnectionId,
    fut: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDriver").field("id", &self.id).finish()
    }
}

impl SessionDriver {
    pub(crate) fn new<C, I, D>(
        conn: C,
        handle: SessionHandle,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        queue: QueueSender<I>,
        decode: D,
    ) -> Self
    where
        C: Connection,
        I: Send + 'static,
        D: FnMut(&[u8]) -> Step<I> + Send + 'static,
    {
        Self {
            id: handle.id(),
            fut: Box::pin(drive(conn, handle, outbound, queue, decode)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Runs the loop to completion on the current task.
    pub async fn run(self) {
        self.fut.await
    }

    /// Runs the loop on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.fut)
    }
}

async fn drive<C, I, D>(
    conn: C,
    handle: SessionHandle,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    queue: QueueSender<I>,
    mut decode: D,
) where
    C: Connection,
    D: FnMut(&[u8]) -> Step<I>,
{
    let conn_id = conn.id();
    let mut state = handle.subscribe();
    tracing::debug!(%conn_id, "session driver started");

    // `true` when the session asked to close; writes it already accepted
    // still go out before the transport closes.
    let closed_locally = loop {
        tokio::select! {
            biased;

            _ = state.wait_until(|s| s != SessionState::Open) => break true,

            msg = outbound.recv() => match msg {
                Some(Outbound::Frame(bytes)) => {
                    if let Err(e) = conn.send(&bytes).await {
                        tracing::debug!(%conn_id, error = %e, "send failed");
                        break false;
                    }
                }
                Some(Outbound::Flush(ack)) => {
                    let _ = ack.send(());
                }
                None => {
                    tracing::debug!(%conn_id, "session dropped");
                    break false;
                }
            },

            read = conn.recv() => match read {
                Ok(Some(buf)) => match decode(&buf) {
                    Step::Deliver(item) => {
                        queue.push(item);
                    }
                    Step::Skip => {}
                    Step::Fatal => break false,
                },
                Ok(None) => {
                    tracing::debug!(%conn_id, "peer closed the connection");
                    break false;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "receive failed");
                    break false;
                }
            },
        }
    };

    handle.close();
    // Readers see end-of-stream once the buffered items are drained.
    drop(queue);
    if closed_locally {
        flush_pending(&conn, &mut outbound).await;
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "transport close failed");
    }
    // Pending flush acknowledgements resolve as their senders drop.
    drop(outbound);
    tracing::debug!(%conn_id, "session driver finished");
}

/// Sends every frame still queued, acknowledging flushes on the way.
async fn flush_pending<C: Connection>(conn: &C, outbound: &mut mpsc::UnboundedReceiver<Outbound>) {
    let mut flushed = 0usize;
    while let Ok(msg) = outbound.try_recv() {
        match msg {
            Outbound::Frame(bytes) => {
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "send failed while closing");
                    return;
                }
                flushed += 1;
            }
            Outbound::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    if flushed > 0 {
        tracing::debug!(conn_id = %conn.id(), flushed, "queued frames sent before close");
    }
}

/// Write side shared by both session kinds.
#[derive(Debug)]
pub(crate) struct Outbox {
    handle: SessionHandle,
    tx: mpsc::UnboundedSender<Outbound>,
    policy: ClosedWritePolicy,
}

impl Outbox {
    pub(crate) fn new(
        handle: SessionHandle,
        tx: mpsc::UnboundedSender<Outbound>,
        policy: ClosedWritePolicy,
    ) -> Self {
        Self { handle, tx, policy }
    }

    /// Queues `frame` for the transport without waiting.
    pub(crate) fn send(&self, frame: Bytes) -> Result<(), SessionError> {
        if self.handle.state() == SessionState::Open
            && self.tx.send(Outbound::Frame(frame)).is_ok()
        {
            return Ok(());
        }
        self.refuse()
    }

    fn refuse(&self) -> Result<(), SessionError> {
        match self.policy {
            ClosedWritePolicy::Discard => {
                tracing::debug!(conn_id = %self.handle.id(), "write after close discarded");
                Ok(())
            }
            ClosedWritePolicy::Reject => Err(SessionError::Closed(self.handle.id())),
        }
    }

    /// Waits until everything queued so far was handed to the transport,
    /// or the driver stopped.
    pub(crate) async fn drain(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Outbound::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}
