//! Error types for the codec, schema and registry layers.

use crate::schema::{PacketDirection, ProtocolState};

/// Errors raised while reading or writing field values.
///
/// All of these are per-frame errors: the offending frame is dropped and the
/// connection stays open.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// No terminating byte appeared within the maximum VarInt/VarLong width.
    #[error("malformed VarInt: no terminating byte within {max_bytes} bytes")]
    MalformedVarInt {
        /// Maximum number of bytes allowed for the encoding.
        max_bytes: usize,
    },

    /// Fewer bytes remain than the value requires.
    #[error("truncated payload: needed {needed} bytes, {remaining} remaining")]
    TruncatedPayload {
        /// Bytes required by the value being read.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string was not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A length prefix decoded to a negative number.
    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    /// The NBT tag tree could not be walked.
    #[error("malformed NBT: {0}")]
    MalformedNbt(&'static str),

    /// A value did not have the type its field descriptor requires.
    #[error("field `{field}` expected a {expected} value")]
    FieldTypeMismatch {
        /// Name of the field.
        field: &'static str,
        /// Human-readable name of the expected value type.
        expected: &'static str,
    },

    /// Fewer values were supplied than the descriptor has fields.
    #[error("missing value for field `{field}`")]
    MissingField {
        /// Name of the field.
        field: &'static str,
    },

    /// A conditional value was present while its trigger was false, or absent
    /// while its trigger was true.
    #[error("conditional field `{field}` does not agree with its trigger")]
    ConditionalMismatch {
        /// Name of the field.
        field: &'static str,
    },

    /// A bit-field value has bits set outside its declared width.
    #[error("bit field `{field}` value {value:#04x} exceeds {width_bits} bits")]
    BitFieldOverflow {
        /// Name of the field.
        field: &'static str,
        /// The offending value.
        value: u8,
        /// Declared width.
        width_bits: u8,
    },

    /// An enum ordinal has no matching variant.
    #[error("invalid ordinal {ordinal} for enum `{enumeration}`")]
    InvalidEnumOrdinal {
        /// Name of the enum type.
        enumeration: &'static str,
        /// The ordinal read from the wire.
        ordinal: i32,
    },

    /// Bytes were left over after every field had been decoded.
    #[error("{count} trailing bytes after the last field")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

/// Errors raised when a packet schema violates the descriptor invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A preceding-boolean conditional is the first field or does not follow a boolean.
    #[error("field `{field}` is gated on the preceding field, which is not a boolean")]
    PrecedingFieldNotBoolean {
        /// The conditional field.
        field: &'static str,
    },

    /// A named trigger does not refer to an earlier boolean field.
    #[error("field `{field}` is gated on `{trigger}`, which is not an earlier boolean field")]
    UnknownTrigger {
        /// The conditional field.
        field: &'static str,
        /// The trigger name it references.
        trigger: &'static str,
    },

    /// A conditional was nested inside another field kind.
    #[error("field `{field}` nests a conditional inside another field kind")]
    NestedConditional {
        /// The offending field.
        field: &'static str,
    },

    /// A remainder-as-bytes field is not the last field, or its elements are not byte-sized.
    #[error("field `{field}` consumes the remainder but is not a trailing byte block")]
    MisplacedRemainder {
        /// The offending field.
        field: &'static str,
    },

    /// A bit field was declared wider than one byte.
    #[error("bit field `{field}` is {width_bits} bits wide; at most 8 are allowed")]
    BitFieldTooWide {
        /// The offending field.
        field: &'static str,
        /// Declared width.
        width_bits: u8,
    },
}

/// Errors raised by the packet registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The (id, state, direction) tuple, or the value type, is already registered.
    #[error("duplicate registration for packet {id:#04x} in {state:?}/{direction:?} ({name})")]
    DuplicateRegistration {
        /// Packet identifier.
        id: i32,
        /// Protocol state.
        state: ProtocolState,
        /// Packet direction.
        direction: PacketDirection,
        /// Name of the packet being registered.
        name: &'static str,
    },

    /// No descriptor is registered under the requested key.
    #[error("no packet {id:#04x} registered in {state:?}/{direction:?}")]
    NotFound {
        /// Packet identifier.
        id: i32,
        /// Protocol state.
        state: ProtocolState,
        /// Packet direction.
        direction: PacketDirection,
    },

    /// No descriptor is registered for the value's runtime type.
    #[error("packet type `{0}` is not registered")]
    UnregisteredPacketType(&'static str),

    /// The descriptor failed validation.
    #[error("invalid schema for `{name}`: {source}")]
    InvalidSchema {
        /// Name of the packet being registered.
        name: &'static str,
        /// The validation failure.
        #[source]
        source: SchemaError,
    },
}

/// Errors raised by [`PacketRegistry`](crate::PacketRegistry) encode and decode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacketError {
    /// The registry could not resolve the packet.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The field values could not be encoded or decoded.
    #[error("{packet}: {source}")]
    Codec {
        /// Name of the packet.
        packet: &'static str,
        /// The codec failure.
        #[source]
        source: CodecError,
    },
}
