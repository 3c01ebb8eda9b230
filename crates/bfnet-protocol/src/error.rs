//! Error types for the protocol layer.
//!
//! The taxonomy follows where a failure is handled:
//!
//! - [`FrameError`] is connection-fatal. The session closes the transport
//!   because a length-implicit stream cannot be resynchronised.
//! - [`DecodeError`] is frame-local. The packet is dropped, the connection
//!   stays open.
//! - [`AutopackError`] is encode-local. It is returned to whoever tried to
//!   send the packet.
//! - [`SchemaError`] is raised at registration time, before serving.

use crate::PacketId;

/// Header-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a full header were received.
    #[error("frame too short: {len} bytes, header needs {needed}")]
    TooShort { len: usize, needed: usize },

    /// The header bytes could not be read as the fixed layout.
    #[error("malformed frame header")]
    MalformedHeader,

    /// The first two bytes were not the protocol magic.
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 2]),
}

/// Payload-level failures raised by a packet's `decode`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload ended before a field could be read.
    #[error("payload truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// Bytes were left over after every field was read.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// A text field was not valid UTF-8.
    #[error("text field is not valid UTF-8")]
    InvalidUtf8,

    /// A field was structurally readable but semantically wrong.
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// Failures of the autopack encoder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AutopackError {
    /// The integer does not fit any supported signed width.
    #[error("integer {0} does not fit in a 64-bit signed field")]
    Overflow(i128),

    /// The value's kind has no wire representation.
    #[error("type could not be packed: {0}")]
    UnsupportedType(&'static str),

    /// The packet produced a different number of values than its schema declares.
    #[error("schema declares {expected} fields, packet produced {found}")]
    FieldCount { expected: usize, found: usize },

    /// A value's kind disagrees with the kind declared for its field.
    #[error("field `{field}` declared as {expected}, got {found}")]
    KindMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Schema problems detected when a packet type is registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two fields share a name.
    #[error("packet {id}: duplicate field `{field}`")]
    DuplicateField { id: PacketId, field: &'static str },

    /// A field has an empty name.
    #[error("packet {id}: field {index} has an empty name")]
    EmptyName { id: PacketId, index: usize },
}

/// Any error produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Autopack(#[from] AutopackError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
