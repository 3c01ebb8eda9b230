//! Frame codec: the fixed 6-byte header and header + payload splicing.
//!
//! ```text
//! offset 0..2   magic "BF"
//! offset 2..4   version   (i16, big-endian)
//! offset 4..6   type id   (i16, big-endian)
//! offset 6..N   payload   (rest of the read event)
//! ```
//!
//! There is no length field. A frame is exactly one transport read event,
//! which is why a bad header cannot be skipped: there is no way to find
//! where the next frame starts.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{FrameError, PacketId};

/// Protocol magic, the first two bytes of every frame.
pub const MAGIC: [u8; 2] = *b"BF";

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 6;

/// Version written into outgoing headers unless configured otherwise.
pub const PROTOCOL_VERSION: i16 = 1;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 2],
    pub version: i16,
    pub type_id: PacketId,
}

/// Parses the header at the start of `buf`.
///
/// Returns the header and the number of bytes consumed, which is always
/// [`HEADER_LEN`]. Never reads past `buf`.
pub fn decode_header(buf: &[u8]) -> Result<(FrameHeader, usize), FrameError> {
    let Some(raw) = buf.get(..HEADER_LEN) else {
        return Err(FrameError::TooShort {
            len: buf.len(),
            needed: HEADER_LEN,
        });
    };

    let magic: [u8; 2] = raw[0..2]
        .try_into()
        .map_err(|_| FrameError::MalformedHeader)?;
    let version = raw[2..4]
        .try_into()
        .map(i16::from_be_bytes)
        .map_err(|_| FrameError::MalformedHeader)?;
    let type_id = raw[4..6]
        .try_into()
        .map(i16::from_be_bytes)
        .map_err(|_| FrameError::MalformedHeader)?;

    if magic != MAGIC {
        return Err(FrameError::BadMagic(magic));
    }

    Ok((
        FrameHeader {
            magic,
            version,
            type_id: PacketId(type_id),
        },
        HEADER_LEN,
    ))
}

/// Serialises a header. Always exactly [`HEADER_LEN`] bytes.
pub fn encode_header(version: i16, type_id: PacketId) -> [u8; HEADER_LEN] {
    let v = version.to_be_bytes();
    let t = type_id.0.to_be_bytes();
    [MAGIC[0], MAGIC[1], v[0], v[1], t[0], t[1]]
}

/// Builds a complete frame: header followed by `payload`.
pub fn encode_frame(version: i16, type_id: PacketId, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    out.put_slice(&MAGIC);
    out.put_i16(version);
    out.put_i16(type_id.0);
    out.put_slice(payload);
    out.freeze()
}

/// Splits one read event into its header and payload.
pub fn split_frame(frame: &[u8]) -> Result<(FrameHeader, &[u8]), FrameError> {
    let (header, consumed) = decode_header(frame)?;
    Ok((header, &frame[consumed..]))
}
