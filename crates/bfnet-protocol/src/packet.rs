//! Packet types: identity, lifecycle hooks, and payload encoding.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::autopack::{Field, Schema, Value};
use crate::{AutopackError, DecodeError};

/// Numeric packet type id, carried in every frame header.
///
/// Registered types use non-negative ids; [`PacketId::UNASSIGNED`] marks
/// a base type that is never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(pub i16);

impl PacketId {
    pub const UNASSIGNED: PacketId = PacketId(-1);

    pub fn is_assigned(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A decoded, in-memory packet.
///
/// Instances are produced empty by a registry factory, prepared by
/// [`on_creation`](Packet::on_creation), filled by
/// [`decode`](Packet::decode), and then handed to the connection's
/// handler. Once queued a packet is only read, never mutated.
pub trait Packet: Any + Send + Sync + fmt::Debug {
    /// The id written into the header when this packet is sent.
    fn id(&self) -> PacketId;

    /// Ordered field declaration used by the default encoder.
    fn schema(&self) -> Schema;

    /// Current field values, one per schema field, in schema order.
    fn values(&self) -> Vec<Value>;

    /// Runs right after the registry materialises the packet, before
    /// `decode`. For setup that does not depend on wire bytes.
    fn on_creation(&mut self) {}

    /// Populates the packet from a frame payload.
    fn decode(&mut self, payload: &[u8]) -> Result<(), DecodeError>;

    /// Produces the wire payload. Defaults to autopacking [`values`](Packet::values).
    fn encode(&self) -> Result<Vec<u8>, AutopackError> {
        self.schema().pack(&self.values())
    }
}

impl dyn Packet {
    /// Returns `true` if the packet is of concrete type `T`.
    pub fn is<T: Packet>(&self) -> bool {
        let any: &dyn Any = self;
        any.is::<T>()
    }

    /// Recovers the concrete packet type.
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref::<T>()
    }
}

/// A packet type that can be registered by type.
pub trait PacketType: Packet + Default {
    /// Static id used for registry lookup and outgoing headers.
    const ID: PacketId;
    /// Ordered field declaration.
    const SCHEMA: Schema;
}

/// An unstructured packet that stores its payload verbatim.
///
/// Decoding always succeeds and encoding returns the stored bytes, so a
/// `RawPacket` received and written back reproduces the payload exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    id: PacketId,
    data: Vec<u8>,
}

impl RawPacket {
    pub const SCHEMA: Schema = Schema::new(&[Field::bytes("data")]);

    /// An empty raw packet that will be sent with `id`.
    pub fn with_id(id: PacketId) -> Self {
        Self {
            id,
            data: Vec::new(),
        }
    }

    pub fn new(id: PacketId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Default for RawPacket {
    fn default() -> Self {
        Self::with_id(PacketId::UNASSIGNED)
    }
}

impl Packet for RawPacket {
    fn id(&self) -> PacketId {
        self.id
    }

    fn schema(&self) -> Schema {
        Self::SCHEMA
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Bytes(self.data.clone())]
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        self.data = payload.to_vec();
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, AutopackError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Unpacker;
    use crate::autopack::Field;

    #[derive(Debug, Default, PartialEq)]
    struct Position {
        x: i16,
        y: i16,
        created: bool,
    }

    impl Packet for Position {
        fn id(&self) -> PacketId {
            Self::ID
        }

        fn schema(&self) -> Schema {
            Self::SCHEMA
        }

        fn values(&self) -> Vec<Value> {
            vec![self.x.into(), self.y.into(), self.created.into()]
        }

        fn on_creation(&mut self) {
            self.created = true;
        }

        fn decode(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
            let mut u = Unpacker::new(payload);
            self.x = u.i16()?;
            self.y = u.i16()?;
            u.finish()
        }
    }

    impl PacketType for Position {
        const ID: PacketId = PacketId(3);
        const SCHEMA: Schema =
            Schema::new(&[Field::int("x"), Field::int("y"), Field::bool("_created")]);
    }

    #[test]
    fn test_packet_id_display_and_assignment() {
        assert_eq!(PacketId(7).to_string(), "#7");
        assert!(PacketId(0).is_assigned());
        assert!(!PacketId::UNASSIGNED.is_assigned());
    }

    #[test]
    fn test_packet_id_serde_is_transparent() {
        assert_eq!(serde_json::to_string(&PacketId(12)).unwrap(), "12");
        let id: PacketId = serde_json::from_str("-1").unwrap();
        assert_eq!(id, PacketId::UNASSIGNED);
    }

    #[test]
    fn test_raw_packet_is_verbatim() {
        let mut p = RawPacket::with_id(PacketId(7));
        p.decode(b"hello").unwrap();
        assert_eq!(p.data(), b"hello");
        assert_eq!(p.encode().unwrap(), b"hello");
        // The autopack view agrees with the verbatim encoding.
        assert_eq!(p.schema().pack(&p.values()).unwrap(), b"hello");
    }

    #[test]
    fn test_raw_packet_default_is_unassigned() {
        assert_eq!(RawPacket::default().id(), PacketId::UNASSIGNED);
    }

    #[test]
    fn test_default_encode_autopacks_schema() {
        let p = Position { x: 1, y: -2, created: true };
        assert_eq!(p.encode().unwrap(), vec![0x00, 0x01, 0xff, 0xfe]);
    }

    #[test]
    fn test_round_trip_through_explicit_decode() {
        let sent = Position { x: 300, y: -7, created: false };
        let mut received = Position::default();
        received.decode(&sent.encode().unwrap()).unwrap();
        assert_eq!((received.x, received.y), (300, -7));
    }

    #[test]
    fn test_downcast() {
        let boxed: Box<dyn Packet> = Box::new(Position::default());
        assert!(boxed.is::<Position>());
        assert!(!boxed.is::<RawPacket>());
        assert_eq!(boxed.downcast_ref::<Position>().map(|p| p.x), Some(0));
        assert!(boxed.downcast_ref::<RawPacket>().is_none());
    }
}
