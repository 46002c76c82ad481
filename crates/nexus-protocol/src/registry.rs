//! Packet registry keyed by `(id, state, direction)` and by Rust type.
//!
//! Built once at startup and shared read-only afterwards. Receiving resolves
//! a descriptor from the frame's id and the session's state; sending resolves
//! it from the value's type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::PacketWriter;
use crate::error::{CodecError, PacketError, RegistryError};
use crate::framing::{Frame, encode_frame};
use crate::schema::{PacketDescriptor, PacketDirection, ProtocolState};
use crate::serializer::{decode_body, encode_fields};
use crate::value::{Model, Value, Values};

/// A packet type bound to its wire identity.
pub trait Packet: Model + fmt::Debug + Send + Sync + 'static {
    const ID: i32;
    const STATE: ProtocolState;
    const DIRECTION: PacketDirection;
}

/// A type-erased packet, as published to handlers.
pub trait AnyPacket: Any + fmt::Debug + Send + Sync + 'static {
    /// The packet's schema name.
    fn name(&self) -> &'static str;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Field values in wire order.
    fn values(&self) -> Vec<Value>;
}

impl<P: Packet> AnyPacket for P {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn values(&self) -> Vec<Value> {
        self.to_values()
    }
}

impl dyn AnyPacket {
    /// Borrow as the concrete packet type, if it is one.
    pub fn downcast_ref<P: Packet>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }

    /// Whether the packet is of type `P`.
    pub fn is<P: Packet>(&self) -> bool {
        self.as_any().is::<P>()
    }
}

type DecodeFn = fn(Vec<Value>) -> Result<Box<dyn AnyPacket>, CodecError>;

fn decode_as<P: Packet>(values: Vec<Value>) -> Result<Box<dyn AnyPacket>, CodecError> {
    Ok(Box::new(P::from_values(&mut Values::new(values))?))
}

#[derive(Debug)]
struct Registration {
    descriptor: Arc<PacketDescriptor>,
    decode: DecodeFn,
}

type Key = (i32, ProtocolState, PacketDirection);

/// Lookup tables for every known packet.
#[derive(Debug, Default)]
pub struct PacketRegistry {
    by_key: HashMap<Key, Registration>,
    by_type: HashMap<TypeId, Arc<PacketDescriptor>>,
}

impl PacketRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register packet type `P`.
    ///
    /// Fails if its schema is invalid, or if its `(id, state, direction)`
    /// tuple or its type is already registered.
    pub fn register<P: Packet>(&mut self) -> Result<(), RegistryError> {
        let descriptor = PacketDescriptor::new(P::ID, P::STATE, P::DIRECTION, P::NAME, P::fields())
            .map_err(|source| RegistryError::InvalidSchema {
                name: P::NAME,
                source,
            })?;

        let key = (P::ID, P::STATE, P::DIRECTION);
        if self.by_key.contains_key(&key) || self.by_type.contains_key(&TypeId::of::<P>()) {
            return Err(RegistryError::DuplicateRegistration {
                id: P::ID,
                state: P::STATE,
                direction: P::DIRECTION,
                name: P::NAME,
            });
        }

        let descriptor = Arc::new(descriptor);
        self.by_type.insert(TypeId::of::<P>(), Arc::clone(&descriptor));
        self.by_key.insert(
            key,
            Registration {
                descriptor,
                decode: decode_as::<P>,
            },
        );
        tracing::trace!(packet = P::NAME, id = P::ID, state = ?P::STATE, "Registered packet");
        Ok(())
    }

    /// Number of registered packet types.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Every registered descriptor, in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PacketDescriptor> {
        self.by_key.values().map(|r| r.descriptor.as_ref())
    }

    /// Resolve a descriptor by its wire identity.
    pub fn lookup(
        &self,
        id: i32,
        state: ProtocolState,
        direction: PacketDirection,
    ) -> Result<&PacketDescriptor, RegistryError> {
        self.registration(id, state, direction)
            .map(|r| r.descriptor.as_ref())
    }

    /// Resolve a descriptor by the packet's Rust type.
    pub fn lookup_by_type<P: Packet>(&self) -> Result<&PacketDescriptor, RegistryError> {
        self.lookup_by_type_id(TypeId::of::<P>(), P::NAME)
    }

    fn lookup_by_type_id(&self, type_id: TypeId, name: &'static str) -> Result<&PacketDescriptor, RegistryError> {
        self.by_type
            .get(&type_id)
            .map(Arc::as_ref)
            .ok_or(RegistryError::UnregisteredPacketType(name))
    }

    fn registration(
        &self,
        id: i32,
        state: ProtocolState,
        direction: PacketDirection,
    ) -> Result<&Registration, RegistryError> {
        self.by_key
            .get(&(id, state, direction))
            .ok_or(RegistryError::NotFound {
                id,
                state,
                direction,
            })
    }

    /// Encode `packet` into a complete wire frame.
    pub fn encode<P: Packet>(&self, packet: &P) -> Result<Vec<u8>, PacketError> {
        self.encode_any(packet)
    }

    /// Encode a type-erased packet into a complete wire frame.
    pub fn encode_any(&self, packet: &dyn AnyPacket) -> Result<Vec<u8>, PacketError> {
        let descriptor = self.lookup_by_type_id(packet.as_any().type_id(), packet.name())?;
        let mut writer = PacketWriter::new();
        encode_fields(&descriptor.fields, &packet.values(), &mut writer).map_err(|source| {
            PacketError::Codec {
                packet: descriptor.name,
                source,
            }
        })?;
        Ok(encode_frame(descriptor.id, writer.as_slice()))
    }

    /// Decode a received frame into its typed packet.
    pub fn decode(
        &self,
        frame: &Frame,
        state: ProtocolState,
        direction: PacketDirection,
    ) -> Result<Box<dyn AnyPacket>, PacketError> {
        let registration = self.registration(frame.packet_id, state, direction)?;
        let name = registration.descriptor.name;
        let values = decode_body(&registration.descriptor.fields, &frame.body)
            .map_err(|source| PacketError::Codec { packet: name, source })?;
        (registration.decode)(values).map_err(|source| PacketError::Codec { packet: name, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::try_extract_frame;
    use crate::schema::{FieldBuilder, FieldDescriptor, PrimitiveKind, primitive};

    #[derive(Debug, Clone, PartialEq)]
    struct Ping {
        time: i64,
    }

    impl Model for Ping {
        const NAME: &'static str = "Ping";

        fn fields() -> Vec<FieldDescriptor> {
            vec![primitive("time", PrimitiveKind::Long)]
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::I64(self.time)]
        }

        fn from_values(values: &mut Values) -> Result<Self, CodecError> {
            Ok(Self {
                time: values.take("time")?,
            })
        }
    }

    impl Packet for Ping {
        const ID: i32 = 0x01;
        const STATE: ProtocolState = ProtocolState::Status;
        const DIRECTION: PacketDirection = PacketDirection::ServerBound;
    }

    #[derive(Debug)]
    struct Clash;

    impl Model for Clash {
        const NAME: &'static str = "Clash";

        fn fields() -> Vec<FieldDescriptor> {
            Vec::new()
        }

        fn to_values(&self) -> Vec<Value> {
            Vec::new()
        }

        fn from_values(_: &mut Values) -> Result<Self, CodecError> {
            Ok(Clash)
        }
    }

    impl Packet for Clash {
        const ID: i32 = 0x01;
        const STATE: ProtocolState = ProtocolState::Status;
        const DIRECTION: PacketDirection = PacketDirection::ServerBound;
    }

    #[derive(Debug)]
    struct Broken;

    impl Model for Broken {
        const NAME: &'static str = "Broken";

        fn fields() -> Vec<FieldDescriptor> {
            vec![FieldBuilder::new("value", PrimitiveKind::Int).conditional().build()]
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Optional(None)]
        }

        fn from_values(_: &mut Values) -> Result<Self, CodecError> {
            Ok(Broken)
        }
    }

    impl Packet for Broken {
        const ID: i32 = 0x09;
        const STATE: ProtocolState = ProtocolState::Play;
        const DIRECTION: PacketDirection = PacketDirection::ClientBound;
    }

    fn registry() -> PacketRegistry {
        let mut registry = PacketRegistry::new();
        registry.register::<Ping>().unwrap();
        registry
    }

    #[test]
    fn test_duplicate_tuple_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.register::<Clash>(),
            Err(RegistryError::DuplicateRegistration {
                id: 0x01,
                state: ProtocolState::Status,
                direction: PacketDirection::ServerBound,
                name: "Clash",
            })
        );
        assert!(registry.register::<Ping>().is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let mut registry = PacketRegistry::new();
        assert!(matches!(
            registry.register::<Broken>(),
            Err(RegistryError::InvalidSchema { name: "Broken", .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_is_scoped_by_state_and_direction() {
        let registry = registry();
        assert_eq!(
            registry
                .lookup(0x01, ProtocolState::Status, PacketDirection::ServerBound)
                .unwrap()
                .name,
            "Ping"
        );
        assert_eq!(
            registry.lookup(0x01, ProtocolState::Play, PacketDirection::ServerBound),
            Err(RegistryError::NotFound {
                id: 0x01,
                state: ProtocolState::Play,
                direction: PacketDirection::ServerBound
            })
        );
        assert!(
            registry
                .lookup(0x01, ProtocolState::Status, PacketDirection::ClientBound)
                .is_err()
        );
    }

    #[test]
    fn test_lookup_by_type() {
        let registry = registry();
        assert_eq!(registry.lookup_by_type::<Ping>().unwrap().id, 0x01);
        assert_eq!(
            registry.lookup_by_type::<Clash>(),
            Err(RegistryError::UnregisteredPacketType("Clash"))
        );
    }

    #[test]
    fn test_encode_decode_through_frame() {
        let registry = registry();
        let bytes = registry.encode(&Ping { time: 1_700_000_000 }).unwrap();
        assert_eq!(bytes[0], 9);
        assert_eq!(bytes[1], 0x01);

        let (frame, consumed) = try_extract_frame(&bytes, 1024).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        let packet = registry
            .decode(&frame, ProtocolState::Status, PacketDirection::ServerBound)
            .unwrap();
        assert_eq!(packet.name(), "Ping");
        assert!(packet.is::<Ping>());
        assert_eq!(
            packet.downcast_ref::<Ping>(),
            Some(&Ping { time: 1_700_000_000 })
        );
    }

    #[test]
    fn test_encode_unregistered_type() {
        let registry = registry();
        assert!(matches!(
            registry.encode(&Clash),
            Err(PacketError::Registry(RegistryError::UnregisteredPacketType("Clash")))
        ));
    }

    #[test]
    fn test_decode_error_names_packet() {
        let registry = registry();
        let frame = Frame {
            packet_id: 0x01,
            body: vec![0, 1],
        };
        assert!(matches!(
            registry.decode(&frame, ProtocolState::Status, PacketDirection::ServerBound),
            Err(PacketError::Codec {
                packet: "Ping",
                source: CodecError::TruncatedPayload { .. }
            })
        ));
    }
}
