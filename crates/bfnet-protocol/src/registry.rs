//! Packet registry: maps header type ids to packet factories.
//!
//! The registry is filled during setup, wrapped in an `Arc`, and then
//! only read. Lookups take `&self` and need no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::frame::{FrameHeader, split_frame};
use crate::{DecodeError, FrameError, Packet, PacketId, PacketType, RawPacket, SchemaError};

/// Produces a fresh, empty packet for one type id.
pub type PacketFactory = Arc<dyn Fn() -> Box<dyn Packet> + Send + Sync>;

/// Outcome of dispatching one well-formed frame.
#[derive(Debug)]
pub enum Dispatch {
    /// The payload decoded into a packet.
    Packet {
        header: FrameHeader,
        packet: Box<dyn Packet>,
    },
    /// No type is registered for the header's id. The frame is dropped.
    UnknownType(PacketId),
    /// The registered type refused the payload. The frame is dropped.
    Rejected { id: PacketId, error: DecodeError },
}

#[derive(Default, Clone)]
pub struct PacketRegistry {
    factories: HashMap<PacketId, PacketFactory>,
}

impl fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().copied().collect();
        ids.sort();
        f.debug_struct("PacketRegistry").field("ids", &ids).finish()
    }
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `id`. The last registration for an id wins;
    /// the replaced factory is returned.
    pub fn register<F>(&mut self, id: PacketId, factory: F) -> Option<PacketFactory>
    where
        F: Fn() -> Box<dyn Packet> + Send + Sync + 'static,
    {
        let previous = self.factories.insert(id, Arc::new(factory));
        if previous.is_some() {
            tracing::warn!(type_id = %id, "packet type re-registered, replacing previous factory");
        } else {
            tracing::debug!(type_id = %id, "packet type registered");
        }
        previous
    }

    /// Registers `T` under [`PacketType::ID`] after validating its schema.
    pub fn register_type<T: PacketType>(&mut self) -> Result<(), SchemaError> {
        T::SCHEMA.validate(T::ID)?;
        self.register(T::ID, || Box::new(T::default()));
        Ok(())
    }

    /// Registers an unstructured [`RawPacket`] type under `id`.
    pub fn register_raw(&mut self, id: PacketId) {
        self.register(id, move || Box::new(RawPacket::with_id(id)));
    }

    pub fn lookup(&self, id: PacketId) -> Option<&PacketFactory> {
        self.factories.get(&id)
    }

    pub fn contains(&self, id: PacketId) -> bool {
        self.factories.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<PacketId> {
        let mut ids: Vec<_> = self.factories.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Materialises an empty packet for `id` and runs its creation hook.
    pub fn create(&self, id: PacketId) -> Option<Box<dyn Packet>> {
        let factory = self.lookup(id)?;
        let mut packet = factory();
        if packet.id() != id {
            tracing::warn!(
                type_id = %id,
                packet_id = %packet.id(),
                "factory produced a packet with a different id"
            );
        }
        packet.on_creation();
        Some(packet)
    }

    /// Decodes one read event into a packet.
    ///
    /// Header failures are returned as `Err` and are fatal for the
    /// connection. Unknown ids and payload rejections are reported as
    /// [`Dispatch`] variants and only cost the single frame.
    pub fn dispatch(&self, frame: &[u8]) -> Result<Dispatch, FrameError> {
        let (header, payload) = split_frame(frame)?;
        tracing::debug!(
            version = header.version,
            type_id = %header.type_id,
            len = payload.len(),
            "frame header decoded"
        );

        let Some(mut packet) = self.create(header.type_id) else {
            tracing::warn!(type_id = %header.type_id, "received unknown packet id");
            return Ok(Dispatch::UnknownType(header.type_id));
        };

        match packet.decode(payload) {
            Ok(()) => Ok(Dispatch::Packet { header, packet }),
            Err(error) => {
                tracing::debug!(type_id = %header.type_id, %error, "packet rejected its payload");
                Ok(Dispatch::Rejected {
                    id: header.type_id,
                    error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autopack::{Field, Schema, Value};
    use crate::frame::encode_frame;
    use crate::Unpacker;

    #[derive(Debug, Default)]
    struct Counter {
        n: i32,
    }

    impl Packet for Counter {
        fn id(&self) -> PacketId {
            Self::ID
        }
        fn schema(&self) -> Schema {
            Self::SCHEMA
        }
        fn values(&self) -> Vec<Value> {
            vec![self.n.into()]
        }
        fn decode(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
            let mut u = Unpacker::new(payload);
            self.n = u.i32()?;
            u.finish()
        }
    }

    impl PacketType for Counter {
        const ID: PacketId = PacketId(2);
        const SCHEMA: Schema = Schema::new(&[Field::int("n")]);
    }

    #[derive(Debug, Default)]
    struct Broken;

    impl Packet for Broken {
        fn id(&self) -> PacketId {
            Self::ID
        }
        fn schema(&self) -> Schema {
            Self::SCHEMA
        }
        fn values(&self) -> Vec<Value> {
            vec![Value::Null, Value::Null]
        }
        fn decode(&mut self, _: &[u8]) -> Result<(), DecodeError> {
            Ok(())
        }
    }

    impl PacketType for Broken {
        const ID: PacketId = PacketId(9);
        const SCHEMA: Schema = Schema::new(&[Field::int("a"), Field::int("a")]);
    }

    fn registry() -> PacketRegistry {
        let mut r = PacketRegistry::new();
        r.register_type::<Counter>().unwrap();
        r.register_raw(PacketId(7));
        r
    }

    #[test]
    fn test_lookup_and_contains() {
        let r = registry();
        assert_eq!(r.len(), 2);
        assert!(r.contains(PacketId(7)));
        assert!(r.lookup(PacketId(2)).is_some());
        assert!(r.lookup(PacketId(3)).is_none());
        assert_eq!(r.ids(), vec![PacketId(2), PacketId(7)]);
    }

    #[test]
    fn test_register_type_rejects_bad_schema() {
        let mut r = PacketRegistry::new();
        let err = r.register_type::<Broken>().unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));
        assert!(r.is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut r = PacketRegistry::new();
        assert!(r.register(PacketId(7), || Box::new(RawPacket::with_id(PacketId(7)))).is_none());
        assert!(r.register(PacketId(7), || Box::new(Counter::default())).is_some());
        let p = r.create(PacketId(7)).unwrap();
        assert!(p.is::<Counter>());
    }

    #[test]
    fn test_dispatch_raw_echo_frame() {
        let r = registry();
        let frame = encode_frame(1, PacketId(7), b"hello");
        match r.dispatch(&frame).unwrap() {
            Dispatch::Packet { header, packet } => {
                assert_eq!(header.version, 1);
                assert_eq!(packet.id(), PacketId(7));
                let raw = packet.downcast_ref::<RawPacket>().unwrap();
                assert_eq!(raw.data(), b"hello");
            }
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_structured_frame() {
        let r = registry();
        let frame = encode_frame(1, PacketId(2), &40_000i32.to_be_bytes());
        let Dispatch::Packet { packet, .. } = r.dispatch(&frame).unwrap() else {
            panic!("expected packet");
        };
        assert_eq!(packet.downcast_ref::<Counter>().unwrap().n, 40_000);
    }

    #[test]
    fn test_dispatch_unknown_id() {
        let r = registry();
        let frame = encode_frame(1, PacketId(99), b"x");
        assert!(matches!(
            r.dispatch(&frame).unwrap(),
            Dispatch::UnknownType(PacketId(99))
        ));
    }

    #[test]
    fn test_dispatch_rejected_payload() {
        let r = registry();
        let frame = encode_frame(1, PacketId(2), &[0, 1]);
        match r.dispatch(&frame).unwrap() {
            Dispatch::Rejected { id, error } => {
                assert_eq!(id, PacketId(2));
                assert!(matches!(error, DecodeError::Truncated { .. }));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_header_errors_are_fatal() {
        let r = registry();
        assert!(matches!(
            r.dispatch(b"BF\x00"),
            Err(FrameError::TooShort { len: 3, .. })
        ));
        assert!(matches!(
            r.dispatch(b"HTTP/1.1"),
            Err(FrameError::BadMagic(_))
        ));
    }

    #[test]
    fn test_version_is_not_checked() {
        let r = registry();
        let frame = encode_frame(42, PacketId(7), b"v");
        assert!(matches!(r.dispatch(&frame).unwrap(), Dispatch::Packet { .. }));
    }

    #[test]
    fn test_create_runs_creation_hook() {
        #[derive(Debug, Default)]
        struct Hooked {
            ready: bool,
        }
        impl Packet for Hooked {
            fn id(&self) -> PacketId {
                PacketId(5)
            }
            fn schema(&self) -> Schema {
                Schema::EMPTY
            }
            fn values(&self) -> Vec<Value> {
                Vec::new()
            }
            fn on_creation(&mut self) {
                self.ready = true;
            }
            fn decode(&mut self, _: &[u8]) -> Result<(), DecodeError> {
                if self.ready {
                    Ok(())
                } else {
                    Err(DecodeError::Invalid("creation hook did not run".into()))
                }
            }
        }

        let mut r = PacketRegistry::new();
        r.register(PacketId(5), || Box::new(Hooked::default()));
        let frame = encode_frame(1, PacketId(5), b"");
        assert!(matches!(r.dispatch(&frame).unwrap(), Dispatch::Packet { .. }));
    }
}
