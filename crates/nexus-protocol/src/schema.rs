//! Declarative packet schemas.
//!
//! A packet is described as data: its id, the protocol state and direction
//! that scope that id, and an ordered list of [`FieldDescriptor`]s whose order
//! is exactly the wire order. A single generic interpreter
//! ([`crate::serializer`]) encodes and decodes every packet from these tables.
//!
//! Field kinds are usually not written out by hand. [`FieldBuilder`] takes the
//! declared value type plus annotations and derives the effective kind:
//!
//! ```text
//! base type -> overwrite -> bit_set -> bit_field -> enumeration
//!           -> array (byte-sized elements flatten to a byte block)
//!           -> conditional
//! ```
//!
//! Each step replaces what the previous one produced.

use std::sync::Arc;

use crate::error::SchemaError;
use crate::value::Model;

// ---------------------------------------------------------------------------
// Protocol state and direction
// ---------------------------------------------------------------------------

/// Phase of a connection's lifecycle. Scopes which packet ids are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProtocolState {
    /// Initial state; only the handshake packet is valid.
    Handshake = 0,
    /// Server list ping.
    Status = 1,
    /// Authentication and identity.
    Login = 2,
    /// Registry and resource-pack negotiation.
    Configuration = 3,
    /// In game. Terminal while connected.
    Play = 4,
}

impl ProtocolState {
    /// Every state in lifecycle order.
    pub const ALL: [ProtocolState; 5] = [
        ProtocolState::Handshake,
        ProtocolState::Status,
        ProtocolState::Login,
        ProtocolState::Configuration,
        ProtocolState::Play,
    ];

    /// Numeric ordinal of the state.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ordinal`](Self::ordinal).
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Whether the lifecycle allows moving from `self` directly to `next`.
    ///
    /// `Handshake -> Status | Login`, `Login -> Configuration`,
    /// `Configuration -> Play`. Nothing leaves `Status` or `Play`.
    pub fn can_transition_to(self, next: ProtocolState) -> bool {
        matches!(
            (self, next),
            (ProtocolState::Handshake, ProtocolState::Status)
                | (ProtocolState::Handshake, ProtocolState::Login)
                | (ProtocolState::Login, ProtocolState::Configuration)
                | (ProtocolState::Configuration, ProtocolState::Play)
        )
    }
}

/// Which side of the connection sends a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketDirection {
    /// Server to client.
    ClientBound,
    /// Client to server.
    ServerBound,
}

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// Scalar wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    Long,
    Float,
    Double,
    VarInt,
    VarLong,
    String,
    Uuid,
    Position,
    Nbt,
}

impl PrimitiveKind {
    /// Whether the kind occupies exactly one byte on the wire.
    pub fn is_byte_sized(self) -> bool {
        matches!(self, PrimitiveKind::Bool | PrimitiveKind::Byte | PrimitiveKind::UByte)
    }

    /// Name used in type-mismatch errors.
    pub fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::UByte => "unsigned byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::UShort => "unsigned short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::VarInt => "VarInt",
            PrimitiveKind::VarLong => "VarLong",
            PrimitiveKind::String => "string",
            PrimitiveKind::Uuid => "UUID",
            PrimitiveKind::Position => "position",
            PrimitiveKind::Nbt => "NBT",
        }
    }
}

/// How many elements an array or byte block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthPolicy {
    /// A VarInt element count precedes the elements.
    VarIntPrefixed,
    /// The schema fixes the element count; nothing is written for it.
    Fixed(usize),
    /// Every byte left in the frame. Only valid for a trailing byte block.
    RemainderAsBytes,
}

/// The boolean that decides whether a conditional field is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The field immediately before the conditional one.
    PrecedingBoolean,
    /// An earlier boolean field with this name.
    NamedBoolean(&'static str),
}

/// Wire width of an enum ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnumWire {
    #[default]
    VarInt,
    UByte,
    Byte,
}

/// Effective encoding rule of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A single scalar.
    Primitive(PrimitiveKind),
    /// A sequence of elements sharing one kind.
    Array {
        element: Box<FieldKind>,
        length: LengthPolicy,
    },
    /// A flattened array of byte-sized elements, carried as raw bytes.
    Bytes(LengthPolicy),
    /// Present on the wire only when `trigger` is true. No presence byte of
    /// its own is written.
    Conditional {
        inner: Box<FieldKind>,
        trigger: Trigger,
    },
    /// A set of up to eight flags packed into one byte.
    BitField { width_bits: u8 },
    /// A fixed-length bit set taking `ceil(length_bits / 8)` bytes.
    BitSet { length_bits: usize },
    /// An enum ordinal.
    Enum { wire: EnumWire },
    /// A recursively encoded sub-structure.
    Nested(Arc<ModelDescriptor>),
}

impl FieldKind {
    /// Whether every element of this kind occupies exactly one byte.
    fn is_byte_sized(&self) -> bool {
        match self {
            FieldKind::Primitive(kind) => kind.is_byte_sized(),
            FieldKind::BitField { .. } => true,
            _ => false,
        }
    }
}

/// A named field in wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// The field layout of a nested sub-structure.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    /// Build and validate a model layout.
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        validate_fields(&fields)?;
        Ok(Self { name, fields })
    }
}

/// Immutable schema of one packet type.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketDescriptor {
    /// Packet id, unique within `(state, direction)`.
    pub id: i32,
    pub state: ProtocolState,
    pub direction: PacketDirection,
    pub name: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl PacketDescriptor {
    /// Build and validate a packet schema.
    pub fn new(
        id: i32,
        state: ProtocolState,
        direction: PacketDirection,
        name: &'static str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, SchemaError> {
        validate_fields(&fields)?;
        Ok(Self {
            id,
            state,
            direction,
            name,
            fields,
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check the invariants of an ordered field list.
///
/// Triggers may only point backwards at boolean fields, conditionals may not
/// be nested inside other kinds, and a remainder block must be the last field.
pub fn validate_fields(fields: &[FieldDescriptor]) -> Result<(), SchemaError> {
    let last = fields.len().saturating_sub(1);
    for (index, field) in fields.iter().enumerate() {
        let kind = match &field.kind {
            FieldKind::Conditional { inner, trigger } => {
                validate_trigger(fields, index, *trigger)?;
                inner.as_ref()
            }
            other => other,
        };
        validate_kind(field.name, kind, index == last)?;
    }
    Ok(())
}

fn validate_trigger(
    fields: &[FieldDescriptor],
    index: usize,
    trigger: Trigger,
) -> Result<(), SchemaError> {
    let field = fields[index].name;
    match trigger {
        Trigger::PrecedingBoolean => {
            let preceding = index.checked_sub(1).map(|i| &fields[i].kind);
            if preceding != Some(&FieldKind::Primitive(PrimitiveKind::Bool)) {
                return Err(SchemaError::PrecedingFieldNotBoolean { field });
            }
        }
        Trigger::NamedBoolean(name) => {
            let found = fields[..index]
                .iter()
                .any(|f| f.name == name && f.kind == FieldKind::Primitive(PrimitiveKind::Bool));
            if !found {
                return Err(SchemaError::UnknownTrigger {
                    field,
                    trigger: name,
                });
            }
        }
    }
    Ok(())
}

fn validate_kind(field: &'static str, kind: &FieldKind, is_last: bool) -> Result<(), SchemaError> {
    match kind {
        FieldKind::Conditional { .. } => Err(SchemaError::NestedConditional { field }),
        FieldKind::BitField { width_bits } if *width_bits > 8 => Err(SchemaError::BitFieldTooWide {
            field,
            width_bits: *width_bits,
        }),
        FieldKind::Bytes(LengthPolicy::RemainderAsBytes) if !is_last => {
            Err(SchemaError::MisplacedRemainder { field })
        }
        FieldKind::Array { element, length } => {
            if *length == LengthPolicy::RemainderAsBytes {
                return Err(SchemaError::MisplacedRemainder { field });
            }
            validate_kind(field, element, false)
        }
        FieldKind::Nested(model) => validate_fields(&model.fields),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum BaseType {
    Primitive(PrimitiveKind),
    Model(Arc<ModelDescriptor>),
}

/// Derives a [`FieldDescriptor`] from a declared type and its annotations.
///
/// ```
/// use nexus_protocol::schema::{FieldBuilder, FieldKind, LengthPolicy, PrimitiveKind};
///
/// let data = FieldBuilder::new("data", PrimitiveKind::UByte).array().remainder().build();
/// assert_eq!(data.kind, FieldKind::Bytes(LengthPolicy::RemainderAsBytes));
/// ```
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: &'static str,
    base: BaseType,
    overwrite: Option<PrimitiveKind>,
    bit_set: Option<usize>,
    bit_field: Option<u8>,
    enumeration: bool,
    array: Option<LengthPolicy>,
    conditional: Option<Trigger>,
}

impl FieldBuilder {
    /// Start from a scalar declared type.
    pub fn new(name: &'static str, base: PrimitiveKind) -> Self {
        Self::with_base(name, BaseType::Primitive(base))
    }

    /// Start from a nested model type.
    pub fn nested(name: &'static str, model: Arc<ModelDescriptor>) -> Self {
        Self::with_base(name, BaseType::Model(model))
    }

    /// Start from a nested [`Model`] type.
    pub fn model<M: Model>(name: &'static str) -> Self {
        Self::nested(
            name,
            Arc::new(ModelDescriptor {
                name: M::NAME,
                fields: M::fields(),
            }),
        )
    }

    fn with_base(name: &'static str, base: BaseType) -> Self {
        Self {
            name,
            base,
            overwrite: None,
            bit_set: None,
            bit_field: None,
            enumeration: false,
            array: None,
            conditional: None,
        }
    }

    /// Encode with a different scalar width than the declared type.
    ///
    /// On an enum field this selects the ordinal's wire width instead.
    pub fn overwrite(mut self, kind: PrimitiveKind) -> Self {
        self.overwrite = Some(kind);
        self
    }

    /// Encode as a fixed-length bit set.
    pub fn bit_set(mut self, length_bits: usize) -> Self {
        self.bit_set = Some(length_bits);
        self
    }

    /// Encode as a single byte of packed flags.
    pub fn bit_field(mut self, width_bits: u8) -> Self {
        self.bit_field = Some(width_bits);
        self
    }

    /// Encode the value's enum ordinal.
    pub fn enumeration(mut self) -> Self {
        self.enumeration = true;
        self
    }

    /// Wrap in a VarInt-prefixed array.
    pub fn array(mut self) -> Self {
        self.array = Some(LengthPolicy::VarIntPrefixed);
        self
    }

    /// Wrap in an array of exactly `n` elements.
    pub fn fixed_length(mut self, n: usize) -> Self {
        self.array = Some(LengthPolicy::Fixed(n));
        self
    }

    /// Wrap in an array that consumes the rest of the frame.
    pub fn remainder(mut self) -> Self {
        self.array = Some(LengthPolicy::RemainderAsBytes);
        self
    }

    /// Present only when the preceding boolean field is true.
    pub fn conditional(mut self) -> Self {
        self.conditional = Some(Trigger::PrecedingBoolean);
        self
    }

    /// Present only when the earlier boolean field `trigger` is true.
    pub fn conditional_on(mut self, trigger: &'static str) -> Self {
        self.conditional = Some(Trigger::NamedBoolean(trigger));
        self
    }

    /// Apply the annotations in precedence order.
    pub fn build(self) -> FieldDescriptor {
        let mut kind = match self.base {
            BaseType::Primitive(kind) => FieldKind::Primitive(kind),
            BaseType::Model(model) => FieldKind::Nested(model),
        };
        if let Some(overwrite) = self.overwrite
            && !self.enumeration
        {
            kind = FieldKind::Primitive(overwrite);
        }
        if let Some(length_bits) = self.bit_set {
            kind = FieldKind::BitSet { length_bits };
        }
        if let Some(width_bits) = self.bit_field {
            kind = FieldKind::BitField { width_bits };
        }
        if self.enumeration {
            let wire = match self.overwrite {
                Some(PrimitiveKind::UByte) => EnumWire::UByte,
                Some(PrimitiveKind::Byte) => EnumWire::Byte,
                _ => EnumWire::VarInt,
            };
            kind = FieldKind::Enum { wire };
        }
        // A bit set carries its own length and is never an array.
        if let Some(length) = self.array
            && self.bit_set.is_none()
        {
            kind = if kind.is_byte_sized() {
                FieldKind::Bytes(length)
            } else {
                FieldKind::Array {
                    element: Box::new(kind),
                    length,
                }
            };
        }
        if let Some(trigger) = self.conditional {
            kind = FieldKind::Conditional {
                inner: Box::new(kind),
                trigger,
            };
        }
        FieldDescriptor::new(self.name, kind)
    }
}

/// Shorthand for an unannotated scalar field.
pub fn primitive(name: &'static str, kind: PrimitiveKind) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldKind::Primitive(kind))
}
