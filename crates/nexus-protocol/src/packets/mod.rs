//! The protocol 767 packet catalogue.
//!
//! Every type here implements [`Packet`](crate::Packet) with its schema.
//! [`default_registry`] registers all of them.

macro_rules! protocol_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$variant_meta:meta])* $variant:ident = $ordinal:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$variant_meta])* $variant),*
        }

        impl $crate::value::ProtocolEnum for $name {
            const NAME: &'static str = stringify!($name);

            fn ordinal(self) -> i32 {
                match self {
                    $($name::$variant => $ordinal),*
                }
            }

            fn from_ordinal(ordinal: i32) -> Option<Self> {
                match ordinal {
                    $($ordinal => Some($name::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

macro_rules! packet_identity {
    ($ty:ty, $id:literal, $state:ident, $direction:ident) => {
        impl $crate::registry::Packet for $ty {
            const ID: i32 = $id;
            const STATE: $crate::schema::ProtocolState = $crate::schema::ProtocolState::$state;
            const DIRECTION: $crate::schema::PacketDirection =
                $crate::schema::PacketDirection::$direction;
        }
    };
}

/// A packet with no fields.
macro_rules! empty_packet {
    ($(#[$meta:meta])* $name:ident, $id:literal, $state:ident, $direction:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl $crate::value::Model for $name {
            const NAME: &'static str = stringify!($name);

            fn fields() -> Vec<$crate::schema::FieldDescriptor> {
                Vec::new()
            }

            fn to_values(&self) -> Vec<$crate::value::Value> {
                Vec::new()
            }

            fn from_values(
                _: &mut $crate::value::Values,
            ) -> Result<Self, $crate::error::CodecError> {
                Ok($name)
            }
        }

        packet_identity!($name, $id, $state, $direction);
    };
}

pub mod configuration;
pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

use crate::error::RegistryError;
use crate::registry::PacketRegistry;

pub use configuration::{
    AcknowledgeFinishConfiguration, ChatMode, ClientInformation, ClientboundKnownPacks,
    FinishConfiguration, KnownPack, MainHand, RegistryData, RegistryEntry,
    ServerboundKnownPacks, ServerboundPluginMessage, SkinParts,
};
pub use handshake::Handshake;
pub use login::{LoginAcknowledged, LoginStart, LoginSuccess, Property};
pub use play::{
    ClientboundKeepAlive, DeathLocation, DimensionType, GameMode, LoginPlay, ServerboundKeepAlive,
};
pub use status::{PingRequest, PingResponse, StatusRequest, StatusResponse};

/// Build a registry holding every packet in the catalogue.
pub fn default_registry() -> Result<PacketRegistry, RegistryError> {
    let mut registry = PacketRegistry::new();

    registry.register::<Handshake>()?;

    registry.register::<StatusRequest>()?;
    registry.register::<PingRequest>()?;
    registry.register::<StatusResponse>()?;
    registry.register::<PingResponse>()?;

    registry.register::<LoginStart>()?;
    registry.register::<LoginAcknowledged>()?;
    registry.register::<LoginSuccess>()?;

    registry.register::<ClientInformation>()?;
    registry.register::<ServerboundPluginMessage>()?;
    registry.register::<AcknowledgeFinishConfiguration>()?;
    registry.register::<ServerboundKnownPacks>()?;
    registry.register::<FinishConfiguration>()?;
    registry.register::<RegistryData>()?;
    registry.register::<ClientboundKnownPacks>()?;

    registry.register::<ServerboundKeepAlive>()?;
    registry.register::<ClientboundKeepAlive>()?;
    registry.register::<LoginPlay>()?;

    Ok(registry)
}
