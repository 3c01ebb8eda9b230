//! Wire protocol for bfnet.
//!
//! This crate is the synchronous, I/O-free heart of the packet layer:
//!
//! - **Frame codec** ([`decode_header`], [`encode_frame`]): the 6-byte
//!   `"BF" | version | type id` header.
//! - **Packets** ([`Packet`], [`PacketType`], [`RawPacket`]): typed
//!   payloads with a creation hook, `decode`, and `encode`.
//! - **Registry** ([`PacketRegistry`]): resolves header type ids to
//!   packet factories and dispatches whole frames.
//! - **Autopack** ([`Schema`], [`Value`], [`autopack`]): the default
//!   encoder that infers a layout from field values.
//!
//! # Architecture
//!
//! ```text
//! Transport (read event) → Frame codec → Registry → Packet::decode → Session queue
//! Handler write()        → Packet::encode (autopack) → Frame codec → Transport
//! ```

mod error;
mod packet;
mod registry;
mod unpack;

pub mod autopack;
pub mod frame;

pub use autopack::{Autopacked, Field, FieldKind, Format, Schema, Value, autopack};
pub use error::{AutopackError, DecodeError, FrameError, ProtocolError, SchemaError};
pub use frame::{
    FrameHeader, HEADER_LEN, MAGIC, PROTOCOL_VERSION, decode_header, encode_frame, encode_header,
    split_frame,
};
pub use packet::{Packet, PacketId, PacketType, RawPacket};
pub use registry::{Dispatch, PacketFactory, PacketRegistry};
pub use unpack::Unpacker;
