//! Buffer decoding and bounds enforcement.

use super::composite::layout_for;
use super::format::{ByteOrder, FormatCode, FormatSpec};
use super::value::{DecodedValue, Record, Scalar};
use super::CodecError;
use crate::packet::types::PropertyType;
use crate::packet::PropertyRegistration;
use bytes::Buf;

/// Decode a property payload into records per its registration.
///
/// Records are decoded while they fit in the remaining bytes, up to the
/// registered length; a trailing partial record is discarded. Primitives
/// with an `s` format decode to a single string record; `p` fields keep
/// their length prefix and decode per record.
pub fn unpack(payload: &[u8], reg: &PropertyRegistration) -> Result<DecodedValue, CodecError> {
    if reg.format.is_empty() {
        return Ok(DecodedValue::default());
    }
    let spec = FormatSpec::parse(&reg.format)?;

    if reg.prop_type == PropertyType::Primitive && spec.contains_plain_string() {
        if payload.is_empty() {
            return Ok(DecodedValue::from_records(vec![vec![Scalar::Str(
                String::new(),
            )]]));
        }
        let effective = (reg.length as usize).min(payload.len());
        let text = String::from_utf8_lossy(&payload[..effective]).into_owned();
        return Ok(DecodedValue::from_records(vec![vec![Scalar::Str(text)]]));
    }

    let item_size = spec.item_size();
    if item_size == 0 {
        return Ok(DecodedValue::default());
    }

    let mut buf = payload;
    let mut records = Vec::new();
    while (records.len() as u32) < reg.length && buf.remaining() >= item_size {
        let record = decode_record(&spec, &mut buf)?;
        validate_record(&record, reg)?;
        records.push(record);
    }
    Ok(DecodedValue::from_records(records))
}

fn decode_record(spec: &FormatSpec, buf: &mut impl Buf) -> Result<Record, CodecError> {
    let mut record = Record::with_capacity(spec.scalar_count());
    for field in &spec.fields {
        match field.code {
            FormatCode::Pad => buf.advance(field.count as usize),
            FormatCode::Bytes => {
                let mut raw = vec![0u8; field.count as usize];
                buf.copy_to_slice(&mut raw);
                record.push(Scalar::Str(String::from_utf8_lossy(&raw).into_owned()));
            }
            FormatCode::Pascal => {
                let mut raw = vec![0u8; field.count as usize];
                buf.copy_to_slice(&mut raw);
                let len = raw.first().copied().unwrap_or(0) as usize;
                let end = raw.len().min(1 + len);
                record.push(Scalar::Str(
                    String::from_utf8_lossy(&raw[1.min(raw.len())..end]).into_owned(),
                ));
            }
            code => {
                for _ in 0..field.count {
                    record.push(decode_scalar(code, spec.order, buf));
                }
            }
        }
    }
    Ok(record)
}

fn decode_scalar(code: FormatCode, order: ByteOrder, buf: &mut impl Buf) -> Scalar {
    match code {
        FormatCode::Char => {
            let byte = buf.get_u8();
            Scalar::Str((byte as char).to_string())
        }
        FormatCode::I8 => Scalar::Int(i64::from(buf.get_i8())),
        FormatCode::U8 => Scalar::Uint(u64::from(buf.get_u8())),
        FormatCode::I16 => Scalar::Int(i64::from(get_i16(order, buf))),
        FormatCode::U16 => Scalar::Uint(u64::from(get_u16(order, buf))),
        FormatCode::I32 => Scalar::Int(i64::from(get_i32(order, buf))),
        FormatCode::U32 => Scalar::Uint(u64::from(get_u32(order, buf))),
        FormatCode::I64 => Scalar::Int(get_i64(order, buf)),
        FormatCode::U64 => Scalar::Uint(get_u64(order, buf)),
        FormatCode::F32 => Scalar::Float(f64::from(get_f32(order, buf))),
        FormatCode::F64 => Scalar::Float(get_f64(order, buf)),
        FormatCode::Bool => Scalar::Bool(buf.get_u8() != 0),
        FormatCode::Pointer => Scalar::Uint(buf.get_u64_ne()),
        // Handled by the caller.
        FormatCode::Pad | FormatCode::Bytes | FormatCode::Pascal => unreachable!(),
    }
}

macro_rules! ordered_get {
    ($name:ident, $ty:ty, $be:ident, $le:ident, $ne:ident) => {
        fn $name(order: ByteOrder, buf: &mut impl Buf) -> $ty {
            match order {
                ByteOrder::Big => buf.$be(),
                ByteOrder::Little => buf.$le(),
                ByteOrder::Native => buf.$ne(),
            }
        }
    };
}

ordered_get!(get_i16, i16, get_i16, get_i16_le, get_i16_ne);
ordered_get!(get_u16, u16, get_u16, get_u16_le, get_u16_ne);
ordered_get!(get_i32, i32, get_i32, get_i32_le, get_i32_ne);
ordered_get!(get_u32, u32, get_u32, get_u32_le, get_u32_ne);
ordered_get!(get_i64, i64, get_i64, get_i64_le, get_i64_ne);
ordered_get!(get_u64, u64, get_u64, get_u64_le, get_u64_ne);
ordered_get!(get_f32, f32, get_f32, get_f32_le, get_f32_ne);
ordered_get!(get_f64, f64, get_f64, get_f64_le, get_f64_ne);

/// Bounds policy from the registration: declared min/max for primitives,
/// per-position fixed ranges for composites. Non-numeric scalars pass.
pub(crate) fn validate_record(
    record: &Record,
    reg: &PropertyRegistration,
) -> Result<(), CodecError> {
    match layout_for(reg.prop_type) {
        None => {
            let (min, max) = (
                reg.min.unwrap_or(f64::NEG_INFINITY),
                reg.max.unwrap_or(f64::INFINITY),
            );
            for scalar in record {
                if let Some(value) = scalar.as_f64() {
                    if value < min || value > max {
                        return Err(CodecError::OutOfRange { value, min, max });
                    }
                }
            }
        }
        Some(layout) => {
            if record.len() != layout.arity() {
                return Err(CodecError::IncorrectValueCount {
                    expected: layout.arity(),
                    actual: record.len(),
                });
            }
            for (field, scalar) in layout.fields.iter().zip(record) {
                if let Some(value) = scalar.as_f64() {
                    if value < field.min as f64 || value > field.max as f64 {
                        return Err(CodecError::FieldOutOfRange {
                            field: field.name,
                            value,
                            min: field.min,
                            max: field.max,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(prop_type: PropertyType, format: &str, length: u32) -> PropertyRegistration {
        PropertyRegistration {
            path: "p".into(),
            index: 0,
            desc: None,
            prop_type,
            format: format.into(),
            length,
            settable: true,
            gettable: true,
            min: None,
            max: None,
            step: None,
            ui_hidden: None,
        }
    }

    #[test]
    fn test_single_byte() {
        let value = unpack(&[0x07], &reg(PropertyType::Primitive, "B", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Uint(7)]]);
    }

    #[test]
    fn test_length_caps_record_count() {
        let value = unpack(&[1, 2, 3], &reg(PropertyType::Primitive, "B", 2)).unwrap();
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn test_trailing_partial_record_discarded() {
        let value = unpack(&[0, 1, 0], &reg(PropertyType::Primitive, "H", 4)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Uint(1)]]);
    }

    #[test]
    fn test_network_order_default() {
        let value = unpack(&[0x01, 0x00], &reg(PropertyType::Primitive, "H", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Uint(256)]]);
        let value = unpack(&[0x01, 0x00], &reg(PropertyType::Primitive, "<H", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Uint(1)]]);
    }

    #[test]
    fn test_signed_and_float() {
        let value = unpack(&[0xFF], &reg(PropertyType::Primitive, "b", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Int(-1)]]);
        let value = unpack(&1.5f64.to_be_bytes(), &reg(PropertyType::Primitive, "d", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Float(1.5)]]);
    }

    #[test]
    fn test_sixty_four_bit_width_preserved() {
        let raw = u64::MAX.to_be_bytes();
        let value = unpack(&raw, &reg(PropertyType::Primitive, "Q", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Uint(u64::MAX)]]);
    }

    #[test]
    fn test_multi_scalar_record() {
        let value = unpack(&[1, 0, 2, 3], &reg(PropertyType::Primitive, "2HB", 2)).unwrap();
        // One full record fits; the trailing byte is not a full record.
        assert_eq!(value.len(), 0);
        let value = unpack(&[0, 1, 0, 2, 3], &reg(PropertyType::Primitive, "2HB", 2)).unwrap();
        assert_eq!(
            value.records,
            vec![vec![Scalar::Uint(1), Scalar::Uint(2), Scalar::Uint(3)]]
        );
    }

    #[test]
    fn test_string_branch() {
        let r = reg(PropertyType::Primitive, "16s", 16);
        let value = unpack(b"hello", &r).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Str("hello".into())]]);

        let value = unpack(b"", &r).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Str(String::new())]]);

        let short = reg(PropertyType::Primitive, "4s", 4);
        let value = unpack(b"hello", &short).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Str("hell".into())]]);
    }

    #[test]
    fn test_registered_bounds() {
        let mut r = reg(PropertyType::Primitive, "B", 1);
        r.min = Some(0.0);
        r.max = Some(10.0);
        assert!(unpack(&[5], &r).is_ok());
        assert!(matches!(
            unpack(&[11], &r),
            Err(CodecError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_color_unpack() {
        let value = unpack(&[10, 20, 30, 40], &reg(PropertyType::Color, "4B", 1)).unwrap();
        assert_eq!(
            value.records,
            vec![vec![
                Scalar::Uint(10),
                Scalar::Uint(20),
                Scalar::Uint(30),
                Scalar::Uint(40)
            ]]
        );
    }

    #[test]
    fn test_composite_arity_mismatch() {
        // Three-byte records can never satisfy the four-field color layout.
        assert!(matches!(
            unpack(&[1, 2, 3], &reg(PropertyType::Color, "3B", 1)),
            Err(CodecError::IncorrectValueCount { .. })
        ));
    }

    #[test]
    fn test_led_position_ranges() {
        let mut raw = vec![0xFF, 0xFF];
        raw.extend([1, 2, 3, 4, 5]);
        assert!(unpack(&raw, &reg(PropertyType::Led, "H5B", 1)).is_ok());

        // A wide format can carry values past a position's fixed range.
        let mut wide = Vec::new();
        for v in [7u16, 300, 0, 0, 0, 0] {
            wide.extend(v.to_be_bytes());
        }
        assert!(matches!(
            unpack(&wide, &reg(PropertyType::Led, "6H", 1)),
            Err(CodecError::FieldOutOfRange {
                field: "brightness",
                ..
            })
        ));
    }

    #[test]
    fn test_empty_format_decodes_to_nothing() {
        let value = unpack(&[1, 2, 3], &reg(PropertyType::Primitive, "", 0)).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_pascal_strips_length_prefix() {
        let raw = [3, b'a', b'b', b'c', 0, 0];
        let value = unpack(&raw, &reg(PropertyType::Primitive, "6p", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Str("abc".into())]]);

        // A length prefix past the field width is clamped to what fits.
        let raw = [9, b'a', b'b', b'c'];
        let value = unpack(&raw, &reg(PropertyType::Primitive, "4p", 1)).unwrap();
        assert_eq!(value.records, vec![vec![Scalar::Str("abc".into())]]);
    }
}
