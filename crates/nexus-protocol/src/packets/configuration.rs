//! Configuration state.

use crate::error::CodecError;
use crate::schema::{FieldBuilder, FieldDescriptor, PrimitiveKind, primitive};
use crate::types::NbtBlob;
use crate::value::{Model, ProtocolEnum, Value, Values, model_value};

protocol_enum! {
    /// Which chat messages the client wants to see.
    pub enum ChatMode {
        Enabled = 0,
        CommandsOnly = 1,
        Hidden = 2,
    }
}

protocol_enum! {
    pub enum MainHand {
        Left = 0,
        Right = 1,
    }
}

/// Bit masks of the `skin_parts` bit field.
pub struct SkinParts;

impl SkinParts {
    pub const CAPE: u8 = 0x01;
    pub const JACKET: u8 = 0x02;
    pub const LEFT_SLEEVE: u8 = 0x04;
    pub const RIGHT_SLEEVE: u8 = 0x08;
    pub const LEFT_PANTS: u8 = 0x10;
    pub const RIGHT_PANTS: u8 = 0x20;
    pub const HAT: u8 = 0x40;
    pub const ALL: u8 = 0x7F;
}

/// Client settings, sent on entering Configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInformation {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: ChatMode,
    pub chat_colors: bool,
    /// [`SkinParts`] flags.
    pub skin_parts: u8,
    pub main_hand: MainHand,
    pub text_filtering: bool,
    pub server_listings: bool,
}

impl Model for ClientInformation {
    const NAME: &'static str = "ClientInformation";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("locale", PrimitiveKind::String),
            primitive("view_distance", PrimitiveKind::Byte),
            FieldBuilder::new("chat_mode", PrimitiveKind::Int).enumeration().build(),
            primitive("chat_colors", PrimitiveKind::Bool),
            FieldBuilder::new("skin_parts", PrimitiveKind::Byte).bit_field(7).build(),
            FieldBuilder::new("main_hand", PrimitiveKind::Int).enumeration().build(),
            primitive("text_filtering", PrimitiveKind::Bool),
            primitive("server_listings", PrimitiveKind::Bool),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.locale.as_str()),
            Value::I8(self.view_distance),
            Value::I32(self.chat_mode.ordinal()),
            Value::Bool(self.chat_colors),
            Value::U8(self.skin_parts),
            Value::I32(self.main_hand.ordinal()),
            Value::Bool(self.text_filtering),
            Value::Bool(self.server_listings),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            locale: values.take("locale")?,
            view_distance: values.take("view_distance")?,
            chat_mode: values.enumeration("chat_mode")?,
            chat_colors: values.take("chat_colors")?,
            skin_parts: values.take("skin_parts")?,
            main_hand: values.enumeration("main_hand")?,
            text_filtering: values.take("text_filtering")?,
            server_listings: values.take("server_listings")?,
        })
    }
}

packet_identity!(ClientInformation, 0x00, Configuration, ServerBound);

/// A custom-channel payload. The data runs to the end of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerboundPluginMessage {
    pub channel: String,
    pub data: Vec<u8>,
}

impl Model for ServerboundPluginMessage {
    const NAME: &'static str = "ServerboundPluginMessage";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("channel", PrimitiveKind::String),
            FieldBuilder::new("data", PrimitiveKind::Byte).remainder().build(),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::from(self.channel.as_str()), Value::Bytes(self.data.clone())]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            channel: values.take("channel")?,
            data: values.take("data")?,
        })
    }
}

packet_identity!(ServerboundPluginMessage, 0x02, Configuration, ServerBound);

empty_packet!(
    /// Client confirms `FinishConfiguration`; the connection moves to Play.
    AcknowledgeFinishConfiguration, 0x03, Configuration, ServerBound
);

empty_packet!(
    /// Server ends the configuration phase.
    FinishConfiguration, 0x03, Configuration, ClientBound
);

/// A data pack identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPack {
    pub namespace: String,
    pub id: String,
    pub version: String,
}

impl Model for KnownPack {
    const NAME: &'static str = "KnownPack";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("namespace", PrimitiveKind::String),
            primitive("id", PrimitiveKind::String),
            primitive("version", PrimitiveKind::String),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.namespace.as_str()),
            Value::from(self.id.as_str()),
            Value::from(self.version.as_str()),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            namespace: values.take("namespace")?,
            id: values.take("id")?,
            version: values.take("version")?,
        })
    }
}

fn known_pack_fields() -> Vec<FieldDescriptor> {
    vec![FieldBuilder::model::<KnownPack>("packs").array().build()]
}

/// Packs the client has locally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerboundKnownPacks {
    pub packs: Vec<KnownPack>,
}

impl Model for ServerboundKnownPacks {
    const NAME: &'static str = "ServerboundKnownPacks";

    fn fields() -> Vec<FieldDescriptor> {
        known_pack_fields()
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Array(self.packs.iter().map(model_value).collect())]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            packs: values.models("packs")?,
        })
    }
}

packet_identity!(ServerboundKnownPacks, 0x07, Configuration, ServerBound);

/// Packs the server wants to use.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientboundKnownPacks {
    pub packs: Vec<KnownPack>,
}

impl Model for ClientboundKnownPacks {
    const NAME: &'static str = "ClientboundKnownPacks";

    fn fields() -> Vec<FieldDescriptor> {
        known_pack_fields()
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Array(self.packs.iter().map(model_value).collect())]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            packs: values.models("packs")?,
        })
    }
}

packet_identity!(ClientboundKnownPacks, 0x0E, Configuration, ClientBound);

/// One entry of a synchronized registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: String,
    /// Omitted when the client should use its known-pack copy.
    pub data: Option<NbtBlob>,
}

impl Model for RegistryEntry {
    const NAME: &'static str = "RegistryEntry";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("id", PrimitiveKind::String),
            primitive("has_data", PrimitiveKind::Bool),
            FieldBuilder::new("data", PrimitiveKind::Nbt).conditional().build(),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.id.as_str()),
            Value::Bool(self.data.is_some()),
            Value::from(self.data.clone()),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        let id = values.take("id")?;
        let _has_data: bool = values.take("has_data")?;
        Ok(Self {
            id,
            data: values.optional("data")?,
        })
    }
}

/// Contents of one registry, e.g. `minecraft:dimension_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryData {
    pub registry_id: String,
    pub entries: Vec<RegistryEntry>,
}

impl Model for RegistryData {
    const NAME: &'static str = "RegistryData";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("registry_id", PrimitiveKind::String),
            FieldBuilder::model::<RegistryEntry>("entries").array().build(),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.registry_id.as_str()),
            Value::Array(self.entries.iter().map(model_value).collect()),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            registry_id: values.take("registry_id")?,
            entries: values.models("entries")?,
        })
    }
}

packet_identity!(RegistryData, 0x07, Configuration, ClientBound);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::tests::roundtrip;

    fn client_information() -> ClientInformation {
        ClientInformation {
            locale: "en_us".into(),
            view_distance: 12,
            chat_mode: ChatMode::CommandsOnly,
            chat_colors: true,
            skin_parts: SkinParts::CAPE | SkinParts::HAT,
            main_hand: MainHand::Left,
            text_filtering: false,
            server_listings: true,
        }
    }

    #[test]
    fn test_client_information_roundtrip() {
        let packet = client_information();
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_skin_parts_overflow_rejected() {
        let packet = ClientInformation {
            skin_parts: 0x80,
            ..client_information()
        };
        let err = crate::packets::default_registry()
            .unwrap()
            .encode(&packet)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::PacketError::Codec {
                source: CodecError::BitFieldOverflow { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_plugin_message_takes_remainder() {
        let packet = ServerboundPluginMessage {
            channel: "minecraft:brand".into(),
            data: b"\x07vanilla".to_vec(),
        };
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_known_packs_and_registry_data_roundtrip() {
        let packs = ClientboundKnownPacks {
            packs: vec![KnownPack {
                namespace: "minecraft".into(),
                id: "core".into(),
                version: "1.21.1".into(),
            }],
        };
        assert_eq!(roundtrip(&packs), packs);
        assert_eq!(
            roundtrip(&ServerboundKnownPacks::default()),
            ServerboundKnownPacks::default()
        );

        let data = RegistryData {
            registry_id: "minecraft:dimension_type".into(),
            entries: vec![
                RegistryEntry {
                    id: "minecraft:overworld".into(),
                    data: None,
                },
                RegistryEntry {
                    id: "nexus:void".into(),
                    data: Some(NbtBlob(vec![10, 1, 0, 1, b'x', 5, 0])),
                },
            ],
        };
        assert_eq!(roundtrip(&data), data);
    }
}
