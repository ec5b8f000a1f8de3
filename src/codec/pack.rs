//! Buffer encoding and the JSON display round-trip.

use super::composite::layout_for;
use super::format::{ByteOrder, FormatCode, FormatSpec};
use super::value::{DecodedValue, Record, Scalar};
use super::CodecError;
use crate::core::config::ExcessPolicy;
use crate::packet::PropertyRegistration;
use bytes::{BufMut, Bytes, BytesMut};

/// Encode records into a payload, one format tuple per record.
///
/// `s` formats collapse to the string's own UTF-8 bytes; the declared
/// byte width applies on the decode side only. `p` fields keep their
/// fixed width and length prefix and encode per record.
pub fn pack(reg: &PropertyRegistration, value: &DecodedValue) -> Result<Bytes, CodecError> {
    if reg.format.is_empty() {
        return Ok(Bytes::new());
    }
    let spec = FormatSpec::parse(&reg.format)?;

    if spec.contains_plain_string() {
        let first = value.records.first().and_then(|record| record.first());
        let Some(Scalar::Str(text)) = first else {
            return Err(CodecError::TypeMismatch { expected: "string" });
        };
        return Ok(Bytes::copy_from_slice(text.as_bytes()));
    }

    let mut buf = BytesMut::with_capacity(spec.item_size() * value.records.len());
    for record in &value.records {
        pack_record(&spec, record, &mut buf)?;
    }
    Ok(buf.freeze())
}

fn pack_record(
    spec: &FormatSpec,
    record: &Record,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let mut scalars = record.iter();
    for field in &spec.fields {
        match field.code {
            FormatCode::Pad => buf.put_bytes(0, field.count as usize),
            // `s` formats never reach here; pack() short-circuits them.
            FormatCode::Bytes => unreachable!(),
            FormatCode::Pascal => {
                let scalar = scalars.next().ok_or(CodecError::IncorrectValueCount {
                    expected: spec.scalar_count(),
                    actual: record.len(),
                })?;
                let Scalar::Str(text) = scalar else {
                    return Err(CodecError::TypeMismatch { expected: "string" });
                };
                let width = field.count as usize;
                if width > 0 {
                    let len = text.len().min(width - 1).min(255);
                    buf.put_u8(len as u8);
                    buf.put_slice(&text.as_bytes()[..len]);
                    buf.put_bytes(0, width - 1 - len);
                }
            }
            code => {
                for _ in 0..field.count {
                    let scalar = scalars.next().ok_or(CodecError::IncorrectValueCount {
                        expected: spec.scalar_count(),
                        actual: record.len(),
                    })?;
                    encode_scalar(code, field.symbol, spec.order, scalar, buf)?;
                }
            }
        }
    }
    if scalars.next().is_some() {
        return Err(CodecError::IncorrectValueCount {
            expected: spec.scalar_count(),
            actual: record.len(),
        });
    }
    Ok(())
}

fn encode_scalar(
    code: FormatCode,
    symbol: char,
    order: ByteOrder,
    scalar: &Scalar,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    match code {
        FormatCode::Char => {
            let Scalar::Str(text) = scalar else {
                return Err(CodecError::TypeMismatch {
                    expected: "single character",
                });
            };
            let mut bytes = text.bytes();
            let (Some(byte), None) = (bytes.next(), bytes.next()) else {
                return Err(CodecError::TypeMismatch {
                    expected: "single character",
                });
            };
            buf.put_u8(byte);
        }
        FormatCode::Bool => {
            let truthy = match scalar {
                Scalar::Bool(v) => *v,
                Scalar::Int(v) => *v != 0,
                Scalar::Uint(v) => *v != 0,
                _ => return Err(CodecError::TypeMismatch { expected: "boolean" }),
            };
            buf.put_u8(u8::from(truthy));
        }
        FormatCode::F32 => {
            let v = numeric(scalar)?;
            put_f32(order, v as f32, buf);
        }
        FormatCode::F64 => {
            let v = numeric(scalar)?;
            put_f64(order, v, buf);
        }
        _ => {
            let v = integer(scalar)?;
            encode_integer(code, symbol, order, v, buf)?;
        }
    }
    Ok(())
}

fn numeric(scalar: &Scalar) -> Result<f64, CodecError> {
    scalar
        .as_f64()
        .ok_or(CodecError::TypeMismatch { expected: "number" })
}

fn integer(scalar: &Scalar) -> Result<i128, CodecError> {
    match scalar {
        Scalar::Int(v) => Ok(i128::from(*v)),
        Scalar::Uint(v) => Ok(i128::from(*v)),
        Scalar::Bool(v) => Ok(i128::from(*v)),
        _ => Err(CodecError::TypeMismatch { expected: "integer" }),
    }
}

fn encode_integer(
    code: FormatCode,
    symbol: char,
    order: ByteOrder,
    value: i128,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    let overflow = || CodecError::Overflow {
        code: symbol,
        value: value.to_string(),
    };
    match code {
        FormatCode::I8 => buf.put_i8(i8::try_from(value).map_err(|_| overflow())?),
        FormatCode::U8 => buf.put_u8(u8::try_from(value).map_err(|_| overflow())?),
        FormatCode::I16 => put_i16(order, i16::try_from(value).map_err(|_| overflow())?, buf),
        FormatCode::U16 => put_u16(order, u16::try_from(value).map_err(|_| overflow())?, buf),
        FormatCode::I32 => put_i32(order, i32::try_from(value).map_err(|_| overflow())?, buf),
        FormatCode::U32 => put_u32(order, u32::try_from(value).map_err(|_| overflow())?, buf),
        FormatCode::I64 => put_i64(order, i64::try_from(value).map_err(|_| overflow())?, buf),
        FormatCode::U64 | FormatCode::Pointer => {
            put_u64(order, u64::try_from(value).map_err(|_| overflow())?, buf);
        }
        _ => unreachable!(),
    }
    Ok(())
}

macro_rules! ordered_put {
    ($name:ident, $ty:ty, $be:ident, $le:ident, $ne:ident) => {
        fn $name(order: ByteOrder, value: $ty, buf: &mut BytesMut) {
            match order {
                ByteOrder::Big => buf.$be(value),
                ByteOrder::Little => buf.$le(value),
                ByteOrder::Native => buf.$ne(value),
            }
        }
    };
}

ordered_put!(put_i16, i16, put_i16, put_i16_le, put_i16_ne);
ordered_put!(put_u16, u16, put_u16, put_u16_le, put_u16_ne);
ordered_put!(put_i32, i32, put_i32, put_i32_le, put_i32_ne);
ordered_put!(put_u32, u32, put_u32, put_u32_le, put_u32_ne);
ordered_put!(put_i64, i64, put_i64, put_i64_le, put_i64_ne);
ordered_put!(put_u64, u64, put_u64, put_u64_le, put_u64_ne);
ordered_put!(put_f32, f32, put_f32, put_f32_le, put_f32_ne);
ordered_put!(put_f64, f64, put_f64, put_f64_le, put_f64_ne);

/// Map a decoded value to its display form.
///
/// Primitives flatten to one ordered scalar sequence; composites become a
/// sequence of records keyed by field name.
pub fn format_json(
    value: &DecodedValue,
    reg: &PropertyRegistration,
) -> Result<serde_json::Value, CodecError> {
    match layout_for(reg.prop_type) {
        None => Ok(serde_json::Value::Array(
            value.flattened().map(Scalar::to_json).collect(),
        )),
        Some(layout) => {
            let mut out = Vec::with_capacity(value.len());
            for record in &value.records {
                if record.len() != layout.arity() {
                    return Err(CodecError::IncorrectValueCount {
                        expected: layout.arity(),
                        actual: record.len(),
                    });
                }
                let map: serde_json::Map<String, serde_json::Value> = layout
                    .fields
                    .iter()
                    .zip(record)
                    .map(|(field, scalar)| (field.name.to_string(), scalar.to_json()))
                    .collect();
                out.push(serde_json::Value::Object(map));
            }
            Ok(serde_json::Value::Array(out))
        }
    }
}

/// Inverse of [`format_json`], used on the set-publication path.
pub fn unpack_json(
    input: &serde_json::Value,
    reg: &PropertyRegistration,
    excess: ExcessPolicy,
) -> Result<DecodedValue, CodecError> {
    if let Some(layout) = layout_for(reg.prop_type) {
        return unpack_json_composite(input, reg, layout, excess);
    }

    if reg.format.is_empty() {
        return Ok(DecodedValue::default());
    }
    let spec = FormatSpec::parse(&reg.format)?;

    if spec.contains_plain_string() {
        let text = match input {
            serde_json::Value::String(text) => text.as_str(),
            serde_json::Value::Array(items) => match items.as_slice() {
                [serde_json::Value::String(text)] => text.as_str(),
                _ => return Err(CodecError::TypeMismatch { expected: "string" }),
            },
            _ => return Err(CodecError::TypeMismatch { expected: "string" }),
        };
        return Ok(DecodedValue::from_records(vec![vec![Scalar::Str(
            truncate_utf8(text, reg.length as usize),
        )]]));
    }

    // Top-level elements distribute one per record up to the registered
    // length; an element that is itself an array is a full record.
    let items: Vec<&serde_json::Value> = match input {
        serde_json::Value::Array(items) => items.iter().collect(),
        scalar => vec![scalar],
    };
    let items = apply_excess_policy(items, reg.length, excess)?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let record = match item {
            serde_json::Value::Array(scalars) => scalars
                .iter()
                .map(|v| {
                    Scalar::from_json(v).ok_or(CodecError::TypeMismatch { expected: "scalar" })
                })
                .collect::<Result<Record, _>>()?,
            scalar => vec![
                Scalar::from_json(scalar).ok_or(CodecError::TypeMismatch { expected: "scalar" })?,
            ],
        };
        records.push(record);
    }
    Ok(DecodedValue::from_records(records))
}

fn unpack_json_composite(
    input: &serde_json::Value,
    reg: &PropertyRegistration,
    layout: &'static super::composite::CompositeLayout,
    excess: ExcessPolicy,
) -> Result<DecodedValue, CodecError> {
    let serde_json::Value::Array(items) = input else {
        return Err(CodecError::TypeMismatch {
            expected: "array of records",
        });
    };
    let items = apply_excess_policy(items.iter().collect(), reg.length, excess)?;

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        let serde_json::Value::Object(map) = item else {
            return Err(CodecError::TypeMismatch {
                expected: "record object",
            });
        };
        if let Some(extra) = map.keys().find(|k| !layout.fields.iter().any(|f| f.name == k.as_str()))
        {
            return Err(CodecError::UnexpectedField(extra.clone()));
        }
        let mut record = Record::with_capacity(layout.arity());
        for field in layout.fields {
            let value = map.get(field.name).ok_or(CodecError::MissingField(field.name))?;
            record.push(
                Scalar::from_json(value).ok_or(CodecError::TypeMismatch { expected: "number" })?,
            );
        }
        records.push(record);
    }
    Ok(DecodedValue::from_records(records))
}

fn apply_excess_policy<T>(
    mut items: Vec<T>,
    capacity: u32,
    excess: ExcessPolicy,
) -> Result<Vec<T>, CodecError> {
    if items.len() > capacity as usize {
        match excess {
            ExcessPolicy::Error => {
                return Err(CodecError::TooManyValues {
                    capacity,
                    actual: items.len(),
                })
            }
            ExcessPolicy::Truncate => items.truncate(capacity as usize),
        }
    }
    Ok(items)
}

fn truncate_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
