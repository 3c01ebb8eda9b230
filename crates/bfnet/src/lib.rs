//! # bfnet
//!
//! Async server framework for the BF binary packet protocol.
//!
//! Every frame on the wire is a 6-byte header (`"BF"`, version, type id)
//! followed by the payload of one transport read. Applications register
//! packet types, implement a [`Handler`], and the framework runs one
//! session per connection: frames are decoded as they arrive, queued in
//! order, and read by the handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bfnet::prelude::*;
//!
//! # async fn run() -> Result<(), BfnetError> {
//! let echo = handler_fn(|_ctx, mut session: PacketSession| async move {
//!     while let Some(packet) = session.read().await {
//!         let _ = session.write(packet.as_ref());
//!     }
//! });
//!
//! let server = ServerBuilder::new()
//!     .bind("0.0.0.0:7070")
//!     .register_raw(PacketId(7))
//!     .build(echo)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod logging;
mod server;

pub use config::ServerConfig;
pub use context::{ConnectionInfo, Context};
pub use error::BfnetError;
pub use handler::{Handler, HandlerFn, handler_fn};
pub use logging::init_tracing;
pub use server::{Server, ServerBuilder};

pub use bfnet_protocol as protocol;
pub use bfnet_session as session;
pub use bfnet_transport as transport;

pub mod prelude {
    pub use crate::{
        BfnetError, ConnectionInfo, Context, Handler, Server, ServerBuilder, ServerConfig,
        handler_fn,
    };
    pub use bfnet_protocol::{
        DecodeError, Field, Packet, PacketId, PacketRegistry, PacketType, RawPacket, Schema,
        Unpacker, Value,
    };
    pub use bfnet_session::{
        ByteSession, ClosedWritePolicy, PacketSession, Session, SessionConfig, SessionError,
        SessionState,
    };
    pub use bfnet_transport::{
        Connection, ConnectionId, TcpTransport, Transport, WebSocketTransport,
    };
}
