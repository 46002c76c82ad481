//! Wire protocol: codec primitives, declarative packet schemas, the packet
//! registry, VarInt framing and the protocol 767 packet catalogue.

pub mod codec;
pub mod error;
pub mod framing;
pub mod nbt;
pub mod packets;
pub mod registry;
pub mod schema;
pub mod serializer;
pub mod types;
pub mod value;

pub use codec::{PacketReader, PacketWriter};
pub use error::{CodecError, PacketError, RegistryError, SchemaError};
pub use framing::{Frame, FrameBuffer, FrameConfig, FrameError, encode_frame, try_extract_frame};
pub use registry::{AnyPacket, Packet, PacketRegistry};
pub use schema::{PacketDescriptor, PacketDirection, ProtocolState};
pub use types::{FixedBitSet, NbtBlob, Position, Uuid};
pub use value::{Model, ProtocolEnum, Value, Values};
