//! Status state: the server list ping.

use crate::error::CodecError;
use crate::schema::{FieldDescriptor, PrimitiveKind, primitive};
use crate::value::{Model, Value, Values};

empty_packet!(
    /// Asks for the server list entry.
    StatusRequest, 0x00, Status, ServerBound
);

/// Latency probe; echoed back verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub time: i64,
}

impl Model for PingRequest {
    const NAME: &'static str = "PingRequest";

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

packet_identity!(PingRequest, 0x01, Status, ServerBound);

/// The server list entry as a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl Model for StatusResponse {
    const NAME: &'static str = "StatusResponse";

    fn fields() -> Vec<FieldDescriptor> {
        vec![primitive("json", PrimitiveKind::String)]
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::from(self.json.as_str())]
    }

    fn from_values(values: &mut Values) -> Result<Self, CodecError> {
        Ok(Self {
            json: values.take("json")?,
        })
    }
}

packet_identity!(StatusResponse, 0x00, Status, ClientBound);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResponse {
    pub time: i64,
}

impl Model for PingResponse {
    const NAME: &'static str = "PingResponse";

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

packet_identity!(PingResponse, 0x01, Status, ClientBound);
