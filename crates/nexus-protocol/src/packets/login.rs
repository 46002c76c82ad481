//! Login state.

use crate::error::CodecError;
use crate::schema::{FieldBuilder, FieldDescriptor, PrimitiveKind, primitive};
use crate::types::Uuid;
use crate::value::{Model, Value, Values, model_value};

/// Client announces its name and UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
    pub player_uuid: Uuid,
}

impl Model for LoginStart {
    const NAME: &'static str = "LoginStart";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("name", PrimitiveKind::String),
            primitive("player_uuid", PrimitiveKind::Uuid),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::from(self.name.as_str()), Value::Uuid(self.player_uuid)]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            name: values.take("name")?,
            player_uuid: values.take("player_uuid")?,
        })
    }
}

packet_identity!(LoginStart, 0x00, Login, ServerBound);

empty_packet!(
    /// Client confirms `LoginSuccess`; the connection moves to Configuration.
    LoginAcknowledged, 0x03, Login, ServerBound
);

/// A profile property such as `textures`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub value: String,
    /// Present when the property is signed.
    pub signature: Option<String>,
}

impl Model for Property {
    const NAME: &'static str = "Property";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("name", PrimitiveKind::String),
            primitive("value", PrimitiveKind::String),
            primitive("is_signed", PrimitiveKind::Bool),
            FieldBuilder::new("signature", PrimitiveKind::String)
                .conditional()
                .build(),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.name.as_str()),
            Value::from(self.value.as_str()),
            Value::Bool(self.signature.is_some()),
            Value::from(self.signature.clone()),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        let name = values.take("name")?;
        let value = values.take("value")?;
        let _is_signed: bool = values.take("is_signed")?;
        Ok(Self {
            name,
            value,
            signature: values.optional("signature")?,
        })
    }
}

/// Server accepts the login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
    pub properties: Vec<Property>,
    pub strict_error_handling: bool,
}

impl Model for LoginSuccess {
    const NAME: &'static str = "LoginSuccess";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("uuid", PrimitiveKind::Uuid),
            primitive("username", PrimitiveKind::String),
            FieldBuilder::model::<Property>("properties").array().build(),
            primitive("strict_error_handling", PrimitiveKind::Bool),
        ]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Uuid(self.uuid),
            Value::from(self.username.as_str()),
            Value::Array(self.properties.iter().map(model_value).collect()),
            Value::Bool(self.strict_error_handling),
        ]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            uuid: values.take("uuid")?,
            username: values.take("username")?,
            properties: values.models("properties")?,
            strict_error_handling: values.take("strict_error_handling")?,
        })
    }
}

packet_identity!(LoginSuccess, 0x02, Login, ClientBound);
