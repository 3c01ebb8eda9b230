//! Per-connection sessions for bfnet.
//!
//! A session sits between one transport connection and the code that
//! handles it:
//!
//! 1. **Driver** ([`SessionDriver`]) owns the connection, decodes read
//!    events inline, and forwards writes.
//! 2. **Inbound queue** ([`InboundQueue`]) buffers decoded items in
//!    arrival order until the handler reads them.
//! 3. **Lifecycle** ([`SessionHandle`], [`SessionState`]) lets a manager
//!    observe the connection closing and tear the session down.
//!
//! Two session kinds share that machinery: [`PacketSession`] speaks the
//! framed packet protocol and [`ByteSession`] hands out raw read events.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)          ← opens sessions, runs handlers, tears down
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol + Transport (below)
//! ```

mod driver;
mod error;
mod packet;
mod queue;
mod state;
mod stream;

pub use driver::SessionDriver;
pub use error::SessionError;
pub use packet::{PacketSession, SessionContext};
pub use queue::{InboundQueue, QueueSender, inbound_queue};
pub use state::{ClosedWritePolicy, SessionConfig, SessionHandle, SessionState, StateWatch};
pub use stream::ByteSession;

use bfnet_transport::Connection;

/// A session kind the server can open for an accepted connection.
pub trait Session: Send + Sized + 'static {
    /// What one successful read yields.
    type Item: Send;

    /// Wraps `conn`. The session makes no progress until the driver runs.
    fn open<C: Connection>(conn: C, ctx: &SessionContext) -> (Self, SessionDriver);

    /// Lifecycle control shared with the session.
    fn handle(&self) -> &SessionHandle;

    /// Waits for the next item, `None` at end-of-stream.
    fn read(&mut self) -> impl Future<Output = Option<Self::Item>> + Send;
}
