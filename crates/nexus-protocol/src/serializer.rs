//! Generic schema interpreter.
//!
//! One routine encodes and one decodes every packet by walking its
//! [`FieldDescriptor`]s next to the matching [`Value`]s.

use crate::codec::{PacketReader, PacketWriter};
use crate::error::CodecError;
use crate::schema::{EnumWire, FieldDescriptor, FieldKind, LengthPolicy, PrimitiveKind, Trigger};
use crate::value::Value;

/// Encode `values` according to `fields`, appending to `writer`.
pub fn encode_fields(
    fields: &[FieldDescriptor],
    values: &[Value],
    writer: &mut PacketWriter,
) -> Result<(), CodecError> {
    for (index, field) in fields.iter().enumerate() {
        let value = values
            .get(index)
            .ok_or(CodecError::MissingField { field: field.name })?;
        match &field.kind {
            FieldKind::Conditional { inner, trigger } => {
                let present = trigger_value(fields, values, index, *trigger)?;
                match (present, value) {
                    (true, Value::Optional(Some(inner_value))) => {
                        encode_value(field.name, inner, inner_value, writer)?;
                    }
                    (false, Value::Optional(None)) => {}
                    (_, Value::Optional(_)) => {
                        return Err(CodecError::ConditionalMismatch { field: field.name });
                    }
                    _ => return Err(mismatch(field.name, "conditional")),
                }
            }
            kind => encode_value(field.name, kind, value, writer)?,
        }
    }
    Ok(())
}

/// Decode one value per field from `reader`.
pub fn decode_fields(
    fields: &[FieldDescriptor],
    reader: &mut PacketReader<'_>,
) -> Result<Vec<Value>, CodecError> {
    let mut values = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        let value = match &field.kind {
            FieldKind::Conditional { inner, trigger } => {
                if trigger_value(fields, &values, index, *trigger)? {
                    Value::Optional(Some(Box::new(decode_value(field.name, inner, reader)?)))
                } else {
                    Value::Optional(None)
                }
            }
            kind => decode_value(field.name, kind, reader)?,
        };
        values.push(value);
    }
    Ok(values)
}

/// Decode a complete packet body, rejecting unread trailing bytes.
pub fn decode_body(fields: &[FieldDescriptor], body: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut reader = PacketReader::new(body);
    let values = decode_fields(fields, &mut reader)?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: reader.remaining(),
        });
    }
    Ok(values)
}

/// Look up the boolean that gates the conditional field at `index`.
fn trigger_value(
    fields: &[FieldDescriptor],
    values: &[Value],
    index: usize,
    trigger: Trigger,
) -> Result<bool, CodecError> {
    let field = fields[index].name;
    let position = match trigger {
        Trigger::PrecedingBoolean => index.checked_sub(1),
        Trigger::NamedBoolean(name) => fields[..index].iter().position(|f| f.name == name),
    };
    match position.and_then(|i| values.get(i)) {
        Some(Value::Bool(present)) => Ok(*present),
        _ => Err(CodecError::ConditionalMismatch { field }),
    }
}

fn mismatch(field: &'static str, expected: &'static str) -> CodecError {
    CodecError::FieldTypeMismatch { field, expected }
}

fn length_of(field: &'static str, len: usize) -> Result<i32, CodecError> {
    i32::try_from(len).map_err(|_| mismatch(field, "length that fits a VarInt"))
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

fn encode_value(
    field: &'static str,
    kind: &FieldKind,
    value: &Value,
    w: &mut PacketWriter,
) -> Result<(), CodecError> {
    match (kind, value) {
        (FieldKind::Primitive(primitive), value) => encode_primitive(field, *primitive, value, w),
        (FieldKind::Array { element, length }, Value::Array(items)) => {
            match length {
                LengthPolicy::VarIntPrefixed => w.write_var_int(length_of(field, items.len())?),
                LengthPolicy::Fixed(n) if items.len() != *n => {
                    return Err(mismatch(field, "array of the fixed length"));
                }
                _ => {}
            }
            for item in items {
                encode_value(field, element, item, w)?;
            }
            Ok(())
        }
        (FieldKind::Bytes(length), Value::Bytes(bytes)) => {
            match length {
                LengthPolicy::VarIntPrefixed => w.write_var_int(length_of(field, bytes.len())?),
                LengthPolicy::Fixed(n) if bytes.len() != *n => {
                    return Err(mismatch(field, "byte block of the fixed length"));
                }
                _ => {}
            }
            w.write_bytes(bytes);
            Ok(())
        }
        (FieldKind::BitField { width_bits }, Value::U8(bits)) => {
            if u32::from(*bits) >> width_bits != 0 {
                return Err(CodecError::BitFieldOverflow {
                    field,
                    value: *bits,
                    width_bits: *width_bits,
                });
            }
            w.write_u8(*bits);
            Ok(())
        }
        (FieldKind::BitSet { length_bits }, Value::BitSet(set)) if set.len() == *length_bits => {
            w.write_bit_set(set);
            Ok(())
        }
        (FieldKind::Enum { wire }, Value::I32(ordinal)) => {
            let out_of_range = || CodecError::InvalidEnumOrdinal {
                enumeration: field,
                ordinal: *ordinal,
            };
            match wire {
                EnumWire::VarInt => w.write_var_int(*ordinal),
                EnumWire::UByte => w.write_u8(u8::try_from(*ordinal).map_err(|_| out_of_range())?),
                EnumWire::Byte => w.write_i8(i8::try_from(*ordinal).map_err(|_| out_of_range())?),
            }
            Ok(())
        }
        (FieldKind::Nested(model), Value::Model(values)) => encode_fields(&model.fields, values, w),
        (kind, _) => Err(mismatch(field, kind_name(kind))),
    }
}

fn encode_primitive(
    field: &'static str,
    kind: PrimitiveKind,
    value: &Value,
    w: &mut PacketWriter,
) -> Result<(), CodecError> {
    match (kind, value) {
        (PrimitiveKind::Bool, Value::Bool(v)) => w.write_bool(*v),
        (PrimitiveKind::Byte, Value::I8(v)) => w.write_i8(*v),
        (PrimitiveKind::UByte, Value::U8(v)) => w.write_u8(*v),
        (PrimitiveKind::Short, Value::I16(v)) => w.write_i16(*v),
        (PrimitiveKind::UShort, Value::U16(v)) => w.write_u16(*v),
        (PrimitiveKind::Int, Value::I32(v)) => w.write_i32(*v),
        (PrimitiveKind::Long, Value::I64(v)) => w.write_i64(*v),
        (PrimitiveKind::Float, Value::F32(v)) => w.write_f32(*v),
        (PrimitiveKind::Double, Value::F64(v)) => w.write_f64(*v),
        (PrimitiveKind::VarInt, Value::I32(v)) => w.write_var_int(*v),
        (PrimitiveKind::VarLong, Value::I64(v)) => w.write_var_long(*v),
        (PrimitiveKind::String, Value::String(v)) => {
            length_of(field, v.len())?;
            w.write_string(v)
        }
        (PrimitiveKind::Uuid, Value::Uuid(v)) => w.write_uuid(*v),
        (PrimitiveKind::Position, Value::Position(v)) => w.write_position(*v),
        (PrimitiveKind::Nbt, Value::Nbt(v)) => w.write_nbt(v),
        (kind, _) => return Err(mismatch(field, kind.type_name())),
    }
    Ok(())
}

fn kind_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Primitive(primitive) => primitive.type_name(),
        FieldKind::Array { .. } => "array",
        FieldKind::Bytes(_) => "byte block",
        FieldKind::Conditional { .. } => "conditional",
        FieldKind::BitField { .. } => "bit field",
        FieldKind::BitSet { .. } => "bit set of the declared length",
        FieldKind::Enum { .. } => "enum ordinal",
        FieldKind::Nested(_) => "model",
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

fn decode_value(
    field: &'static str,
    kind: &FieldKind,
    r: &mut PacketReader<'_>,
) -> Result<Value, CodecError> {
    Ok(match kind {
        FieldKind::Primitive(primitive) => decode_primitive(*primitive, r)?,
        FieldKind::Array { element, length } => {
            let count = match length {
                LengthPolicy::VarIntPrefixed => {
                    let len = r.read_var_int()?;
                    usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))?
                }
                LengthPolicy::Fixed(n) => *n,
                LengthPolicy::RemainderAsBytes => {
                    return Err(mismatch(field, "trailing byte block"));
                }
            };
            // Every element takes at least one byte, so the remaining length
            // bounds the allocation.
            let mut items = Vec::with_capacity(count.min(r.remaining()));
            for _ in 0..count {
                items.push(decode_value(field, element, r)?);
            }
            Value::Array(items)
        }
        FieldKind::Bytes(length) => Value::Bytes(match length {
            LengthPolicy::VarIntPrefixed => r.read_prefixed_bytes()?,
            LengthPolicy::Fixed(n) => r.read_bytes(*n)?,
            LengthPolicy::RemainderAsBytes => r.read_remaining(),
        }),
        FieldKind::BitField { width_bits } => {
            let bits = r.read_u8()?;
            if u32::from(bits) >> width_bits != 0 {
                return Err(CodecError::BitFieldOverflow {
                    field,
                    value: bits,
                    width_bits: *width_bits,
                });
            }
            Value::U8(bits)
        }
        FieldKind::BitSet { length_bits } => Value::BitSet(r.read_bit_set(*length_bits)?),
        FieldKind::Enum { wire } => Value::I32(match wire {
            EnumWire::VarInt => r.read_var_int()?,
            EnumWire::UByte => i32::from(r.read_u8()?),
            EnumWire::Byte => i32::from(r.read_i8()?),
        }),
        FieldKind::Nested(model) => Value::Model(decode_fields(&model.fields, r)?),
        FieldKind::Conditional { .. } => return Err(mismatch(field, "non-nested conditional")),
    })
}

fn decode_primitive(kind: PrimitiveKind, r: &mut PacketReader<'_>) -> Result<Value, CodecError> {
    Ok(match kind {
        PrimitiveKind::Bool => Value::Bool(r.read_bool()?),
        PrimitiveKind::Byte => Value::I8(r.read_i8()?),
        PrimitiveKind::UByte => Value::U8(r.read_u8()?),
        PrimitiveKind::Short => Value::I16(r.read_i16()?),
        PrimitiveKind::UShort => Value::U16(r.read_u16()?),
        PrimitiveKind::Int => Value::I32(r.read_i32()?),
        PrimitiveKind::Long => Value::I64(r.read_i64()?),
        PrimitiveKind::Float => Value::F32(r.read_f32()?),
        PrimitiveKind::Double => Value::F64(r.read_f64()?),
        PrimitiveKind::VarInt => Value::I32(r.read_var_int()?),
        PrimitiveKind::VarLong => Value::I64(r.read_var_long()?),
        PrimitiveKind::String => Value::String(r.read_string()?),
        PrimitiveKind::Uuid => Value::Uuid(r.read_uuid()?),
        PrimitiveKind::Position => Value::Position(r.read_position()?),
        PrimitiveKind::Nbt => Value::Nbt(r.read_nbt()?),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{FieldBuilder, ModelDescriptor, primitive};
    use crate::types::{FixedBitSet, NbtBlob, Position};

    fn encode(fields: &[FieldDescriptor], values: &[Value]) -> Result<Vec<u8>, CodecError> {
        let mut w = PacketWriter::new();
        encode_fields(fields, values, &mut w)?;
        Ok(w.into_inner())
    }

    fn death_fields() -> Vec<FieldDescriptor> {
        vec![
            primitive("has_death_location", PrimitiveKind::Bool),
            FieldBuilder::new("death_dimension_name", PrimitiveKind::String)
                .conditional_on("has_death_location")
                .build(),
            FieldBuilder::new("death_location", PrimitiveKind::Position)
                .conditional_on("has_death_location")
                .build(),
            primitive("portal_cooldown", PrimitiveKind::VarInt),
        ]
    }

    #[test]
    fn test_conditional_absent_when_trigger_false() {
        let fields = death_fields();
        let values = vec![
            Value::Bool(false),
            Value::Optional(None),
            Value::Optional(None),
            Value::I32(5),
        ];
        let bytes = encode(&fields, &values).unwrap();
        assert_eq!(bytes, vec![0x00, 0x05]);
        assert_eq!(decode_body(&fields, &bytes).unwrap(), values);
    }

    #[test]
    fn test_conditional_present_when_trigger_true() {
        let fields = death_fields();
        let values = vec![
            Value::Bool(true),
            Some("minecraft:overworld").into(),
            Some(Position::new(10, -60, -3)).into(),
            Value::I32(0),
        ];
        let bytes = encode(&fields, &values).unwrap();
        assert_eq!(bytes.len(), 1 + 1 + 19 + 8 + 1);
        assert_eq!(decode_body(&fields, &bytes).unwrap(), values);
    }

    #[test]
    fn test_conditional_mismatch_on_encode() {
        let fields = death_fields();
        let values = vec![
            Value::Bool(false),
            Some("minecraft:overworld").into(),
            Value::Optional(None),
            Value::I32(0),
        ];
        assert_eq!(
            encode(&fields, &values),
            Err(CodecError::ConditionalMismatch {
                field: "death_dimension_name"
            })
        );
    }

    #[test]
    fn test_preceding_boolean_has_no_extra_byte() {
        let fields = vec![
            primitive("is_signed", PrimitiveKind::Bool),
            FieldBuilder::new("signature", PrimitiveKind::String).conditional().build(),
        ];
        let bytes = encode(&fields, &[Value::Bool(true), Some("sig").into()]).unwrap();
        assert_eq!(bytes, vec![0x01, 0x03, b's', b'i', b'g']);
    }

    #[test]
    fn test_byte_block_flattening_on_wire() {
        let fields = vec![FieldBuilder::new("data", PrimitiveKind::Byte).array().build()];
        let bytes = encode(&fields, &[Value::Bytes(vec![9, 8, 7])]).unwrap();
        assert_eq!(bytes, vec![0x03, 9, 8, 7]);
    }

    #[test]
    fn test_remainder_consumes_rest() {
        let fields = vec![
            primitive("channel", PrimitiveKind::String),
            FieldBuilder::new("data", PrimitiveKind::Byte).remainder().build(),
        ];
        let values = vec!["a:b".into(), Value::Bytes(vec![1, 2, 3, 4])];
        let bytes = encode(&fields, &values).unwrap();
        assert_eq!(bytes, vec![0x03, b'a', b':', b'b', 1, 2, 3, 4]);
        assert_eq!(decode_body(&fields, &bytes).unwrap(), values);
    }

    #[test]
    fn test_bit_field_overflow() {
        let fields = vec![FieldBuilder::new("skin_parts", PrimitiveKind::Byte).bit_field(7).build()];
        assert_eq!(encode(&fields, &[Value::U8(0x7F)]).unwrap(), vec![0x7F]);
        assert_eq!(
            encode(&fields, &[Value::U8(0x80)]),
            Err(CodecError::BitFieldOverflow {
                field: "skin_parts",
                value: 0x80,
                width_bits: 7
            })
        );
        assert!(decode_body(&fields, &[0xFF]).is_err());
    }

    #[test]
    fn test_enum_wire_widths() {
        let fields = vec![
            FieldBuilder::new("a", PrimitiveKind::Int).enumeration().build(),
            FieldBuilder::new("b", PrimitiveKind::Int)
                .enumeration()
                .overwrite(PrimitiveKind::UByte)
                .build(),
            FieldBuilder::new("c", PrimitiveKind::Int)
                .enumeration()
                .overwrite(PrimitiveKind::Byte)
                .build(),
        ];
        let values = vec![Value::I32(300), Value::I32(3), Value::I32(-1)];
        let bytes = encode(&fields, &values).unwrap();
        assert_eq!(bytes, vec![0xAC, 0x02, 0x03, 0xFF]);
        assert_eq!(decode_body(&fields, &bytes).unwrap(), values);

        assert!(matches!(
            encode(&fields, &[Value::I32(0), Value::I32(256), Value::I32(0)]),
            Err(CodecError::InvalidEnumOrdinal { .. })
        ));
    }

    #[test]
    fn test_nested_model_array() {
        let property = Arc::new(
            ModelDescriptor::new(
                "Property",
                vec![
                    primitive("name", PrimitiveKind::String),
                    primitive("is_signed", PrimitiveKind::Bool),
                    FieldBuilder::new("signature", PrimitiveKind::String).conditional().build(),
                ],
            )
            .unwrap(),
        );
        let fields = vec![FieldBuilder::nested("properties", property).array().build()];
        let values = vec![Value::Array(vec![
            Value::Model(vec!["textures".into(), Value::Bool(false), Value::Optional(None)]),
            Value::Model(vec!["cape".into(), Value::Bool(true), Some("x").into()]),
        ])];
        let bytes = encode(&fields, &values).unwrap();
        assert_eq!(bytes[0], 2);
        assert_eq!(decode_body(&fields, &bytes).unwrap(), values);
    }

    #[test]
    fn test_bit_set_and_nbt() {
        let fields = vec![
            FieldBuilder::new("mask", PrimitiveKind::Long).bit_set(12).build(),
            primitive("has_data", PrimitiveKind::Bool),
            FieldBuilder::new("data", PrimitiveKind::Nbt).conditional().build(),
        ];
        let mut mask = FixedBitSet::new(12);
        mask.set(11, true);
        let values = vec![Value::BitSet(mask), Value::Bool(true), Some(NbtBlob::empty()).into()];
        let bytes = encode(&fields, &values).unwrap();
        assert_eq!(bytes, vec![0x00, 0x08, 0x01, 0x00]);
        assert_eq!(decode_body(&fields, &bytes).unwrap(), values);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let fields = vec![primitive("time", PrimitiveKind::Long)];
        let mut body = 42i64.to_be_bytes().to_vec();
        body.push(0);
        assert_eq!(
            decode_body(&fields, &body),
            Err(CodecError::TrailingBytes { count: 1 })
        );
    }

    #[test]
    fn test_type_mismatch_and_missing_field() {
        let fields = vec![
            primitive("name", PrimitiveKind::String),
            primitive("age", PrimitiveKind::VarInt),
        ];
        assert_eq!(
            encode(&fields, &[Value::I32(1), Value::I32(2)]),
            Err(CodecError::FieldTypeMismatch {
                field: "name",
                expected: "string"
            })
        );
        assert_eq!(
            encode(&fields, &["a".into()]),
            Err(CodecError::MissingField { field: "age" })
        );
    }

    #[test]
    fn test_truncated_array_does_not_overallocate() {
        let fields = vec![FieldBuilder::new("names", PrimitiveKind::String).array().build()];
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x07];
        assert!(matches!(
            decode_body(&fields, &bytes),
            Err(CodecError::TruncatedPayload { .. })
        ));
    }
}
