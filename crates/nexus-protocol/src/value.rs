//! Dynamically typed field values.
//!
//! Typed packets convert to and from a flat `Vec<Value>` with one entry per
//! top-level field. The serializer walks those values alongside the
//! descriptor's field kinds.

use crate::error::CodecError;
use crate::schema::FieldDescriptor;
use crate::types::{FixedBitSet, NbtBlob, Position, Uuid};

/// One field's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Uuid(Uuid),
    Position(Position),
    Nbt(NbtBlob),
    /// A flattened byte block.
    Bytes(Vec<u8>),
    BitSet(FixedBitSet),
    Array(Vec<Value>),
    /// A conditional field; `None` when its trigger is false.
    Optional(Option<Box<Value>>),
    /// A nested model's field values.
    Model(Vec<Value>),
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident, $name:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl FromValue for $ty {
                const EXPECTED: &'static str = $name;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

/// Extraction of a concrete Rust type from a [`Value`].
pub trait FromValue: Sized {
    /// Name reported in [`CodecError::FieldTypeMismatch`].
    const EXPECTED: &'static str;

    /// Return the inner value if `value` has the matching variant.
    fn from_value(value: Value) -> Option<Self>;
}

value_conversions! {
    bool => Bool, "bool";
    i8 => I8, "byte";
    u8 => U8, "unsigned byte";
    i16 => I16, "short";
    u16 => U16, "unsigned short";
    i32 => I32, "int";
    i64 => I64, "long";
    f32 => F32, "float";
    f64 => F64, "double";
    String => String, "string";
    Uuid => Uuid, "UUID";
    Position => Position, "position";
    NbtBlob => Nbt, "NBT";
    Vec<u8> => Bytes, "byte block";
    FixedBitSet => BitSet, "bit set";
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        Value::Optional(value.map(|v| Box::new(v.into())))
    }
}

/// An enum carried on the wire as its integer ordinal.
pub trait ProtocolEnum: Sized + Copy {
    /// Name reported in [`CodecError::InvalidEnumOrdinal`].
    const NAME: &'static str;

    fn ordinal(self) -> i32;

    fn from_ordinal(ordinal: i32) -> Option<Self>;
}

/// A structure encoded field-by-field, either a packet or a nested model.
pub trait Model: Sized {
    /// Type name used in schemas, logs and errors.
    const NAME: &'static str;

    /// Field layout in wire order.
    fn fields() -> Vec<FieldDescriptor>;

    /// Field values in wire order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild from decoded field values.
    fn from_values(values: &mut Values) -> Result<Self, CodecError>;
}

/// Wrap a model as a nested [`Value`].
pub fn model_value<M: Model>(model: &M) -> Value {
    Value::Model(model.to_values())
}

/// Cursor over decoded field values, consumed in wire order.
#[derive(Debug)]
pub struct Values {
    inner: std::vec::IntoIter<Value>,
}

impl Values {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            inner: values.into_iter(),
        }
    }

    /// Take the next raw value.
    pub fn next(&mut self, field: &'static str) -> Result<Value, CodecError> {
        self.inner.next().ok_or(CodecError::MissingField { field })
    }

    /// Take the next value as `T`.
    pub fn take<T: FromValue>(&mut self, field: &'static str) -> Result<T, CodecError> {
        convert(field, self.next(field)?)
    }

    /// Take the next value as an enum ordinal.
    pub fn enumeration<E: ProtocolEnum>(&mut self, field: &'static str) -> Result<E, CodecError> {
        let ordinal: i32 = self.take(field)?;
        E::from_ordinal(ordinal).ok_or(CodecError::InvalidEnumOrdinal {
            enumeration: E::NAME,
            ordinal,
        })
    }

    /// Take the next value as a conditional `T`.
    pub fn optional<T: FromValue>(&mut self, field: &'static str) -> Result<Option<T>, CodecError> {
        match self.next(field)? {
            Value::Optional(inner) => inner.map(|v| convert(field, *v)).transpose(),
            _ => Err(mismatch(field, "conditional")),
        }
    }

    /// Take the next value as an array of `T`.
    pub fn array<T: FromValue>(&mut self, field: &'static str) -> Result<Vec<T>, CodecError> {
        self.items(field)?
            .into_iter()
            .map(|item| convert(field, item))
            .collect()
    }

    /// Take the next value as a nested model.
    pub fn model<M: Model>(&mut self, field: &'static str) -> Result<M, CodecError> {
        let value = self.next(field)?;
        model_from(field, value)
    }

    /// Take the next value as an array of nested models.
    pub fn models<M: Model>(&mut self, field: &'static str) -> Result<Vec<M>, CodecError> {
        self.items(field)?
            .into_iter()
            .map(|item| model_from(field, item))
            .collect()
    }

    fn items(&mut self, field: &'static str) -> Result<Vec<Value>, CodecError> {
        match self.next(field)? {
            Value::Array(items) => Ok(items),
            _ => Err(mismatch(field, "array")),
        }
    }
}

fn convert<T: FromValue>(field: &'static str, value: Value) -> Result<T, CodecError> {
    T::from_value(value).ok_or(mismatch(field, T::EXPECTED))
}

fn model_from<M: Model>(field: &'static str, value: Value) -> Result<M, CodecError> {
    match value {
        Value::Model(fields) => M::from_values(&mut Values::new(fields)),
        _ => Err(mismatch(field, "model")),
    }
}

fn mismatch(field: &'static str, expected: &'static str) -> CodecError {
    CodecError::FieldTypeMismatch { field, expected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Colour {
        Red,
        Blue,
    }

    impl ProtocolEnum for Colour {
        const NAME: &'static str = "Colour";

        fn ordinal(self) -> i32 {
            self as i32
        }

        fn from_ordinal(ordinal: i32) -> Option<Self> {
            match ordinal {
                0 => Some(Colour::Red),
                1 => Some(Colour::Blue),
                _ => None,
            }
        }
    }

    #[test]
    fn test_take_in_order() {
        let mut values = Values::new(vec![Value::I32(7), "hi".into(), Some(3i64).into()]);
        assert_eq!(values.take::<i32>("a").unwrap(), 7);
        assert_eq!(values.take::<String>("b").unwrap(), "hi");
        assert_eq!(values.optional::<i64>("c").unwrap(), Some(3));
        assert_eq!(
            values.take::<bool>("d"),
            Err(CodecError::MissingField { field: "d" })
        );
    }

    #[test]
    fn test_type_mismatch_names_field() {
        let mut values = Values::new(vec![Value::Bool(true)]);
        assert_eq!(
            values.take::<String>("name"),
            Err(CodecError::FieldTypeMismatch {
                field: "name",
                expected: "string"
            })
        );
    }

    #[test]
    fn test_enumeration_rejects_unknown_ordinal() {
        let mut values = Values::new(vec![Value::I32(1), Value::I32(9)]);
        assert_eq!(values.enumeration::<Colour>("c").unwrap(), Colour::Blue);
        assert_eq!(
            values.enumeration::<Colour>("c"),
            Err(CodecError::InvalidEnumOrdinal {
                enumeration: "Colour",
                ordinal: 9
            })
        );
    }

    #[test]
    fn test_array_conversion() {
        let mut values = Values::new(vec![Value::Array(vec!["a".into(), "b".into()])]);
        assert_eq!(values.array::<String>("names").unwrap(), vec!["a", "b"]);
    }
}
