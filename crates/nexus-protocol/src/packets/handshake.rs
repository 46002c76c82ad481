//! Handshake state.

use crate::error::CodecError;
use crate::schema::{FieldBuilder, FieldDescriptor, PrimitiveKind, ProtocolState, primitive};
use crate::value::{Model, ProtocolEnum, Value, Values};

/// Protocol states travel as their ordinal in `Handshake::next_state`.
impl ProtocolEnum for ProtocolState {
    const NAME: &'static str = "ProtocolState";

    fn ordinal(self) -> i32 {
        i32::from(ProtocolState::ordinal(self))
    }

    fn from_ordinal(ordinal: i32) -> Option<Self> {
        u8::try_from(ordinal)
            .ok()
            .and_then(ProtocolState::from_ordinal)
    }
}

/// First packet of every connection; selects Status or Login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: ProtocolState,
}

impl Model for Handshake {
    const NAME: &'static str = "Handshake";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("protocol_version", PrimitiveKind::VarInt),
            primitive("server_address", PrimitiveKind::String),
            primitive("server_port", PrimitiveKind::UShort),
            FieldBuilder::new("next_state", PrimitiveKind::Int)
                .enumeration()
                .build(),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::I32(self.protocol_version),
            Value::from(self.server_address.as_str()),
            Value::U16(self.server_port),
            Value::I32(ProtocolEnum::ordinal(self.next_state)),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            protocol_version: values.take("protocol_version")?,
            server_address: values.take("server_address")?,
            server_port: values.take("server_port")?,
            next_state: values.enumeration("next_state")?,
        })
    }
}

packet_identity!(Handshake, 0x00, Handshake, ServerBound);
