//! The property decoder: given a [`FlatProp`] descriptor, decodes one
//! typed value off a [`BitReader`]. Every branch here must consume
//! exactly the bits the wire protocol produced regardless of whether the
//! caller keeps or discards the result — that "skip mode" requirement is
//! satisfied simply by always decoding a full [`DecodedValue`]; the
//! selective-decode policy in `clutch-state::entity` decides whether to
//! keep it, not whether to read it, so the bit cursor can never diverge
//! between the two paths.

use clutch_core::bitreader::BitReader;
use clutch_core::error::{DemoError, DemoResult};

use crate::descriptor::{PropFlags, PropType};
use crate::flatten::{ElementDescriptor, FlatProp};
use crate::value::{DecodedValue, Vector2, Vector3};

const COORD_INTEGER_BITS: u32 = 14;
const COORD_FRACTIONAL_BITS: u32 = 5;
const COORD_DENOMINATOR: f32 = (1u32 << COORD_FRACTIONAL_BITS) as f32;
const NORMAL_FRACTIONAL_BITS: u32 = 11;
const NORMAL_DENOMINATOR: f32 = ((1u32 << NORMAL_FRACTIONAL_BITS) - 1) as f32;
const CELL_COORD_FRACTIONAL_BITS: u32 = 5;
const CELL_COORD_LOW_FRACTIONAL_BITS: u32 = 3;
const MAX_STRING_PROP_LEN: usize = 1024;

fn read_bit_coord(r: &mut BitReader) -> DemoResult<f32> {
    let has_int = r.read_bit()?;
    let has_frac = r.read_bit()?;
    if has_int == 0 && has_frac == 0 {
        return Ok(0.0);
    }
    let sign = r.read_bit()?;
    let int_part = if has_int != 0 {
        r.read_ubits(COORD_INTEGER_BITS)? + 1
    } else {
        0
    };
    let frac_part = if has_frac != 0 {
        r.read_ubits(COORD_FRACTIONAL_BITS)?
    } else {
        0
    };
    let value = int_part as f32 + frac_part as f32 / COORD_DENOMINATOR;
    Ok(if sign != 0 { -value } else { value })
}

fn read_bit_normal(r: &mut BitReader) -> DemoResult<f32> {
    let sign = r.read_bit()?;
    let frac = r.read_ubits(NORMAL_FRACTIONAL_BITS)?;
    let value = frac as f32 / NORMAL_DENOMINATOR;
    Ok(if sign != 0 { -value } else { value })
}

fn read_cell_coord(r: &mut BitReader, bits: u32, flags: PropFlags) -> DemoResult<f32> {
    let integer = r.read_ubits(bits)? as f32;
    if flags.contains(PropFlags::CELL_COORD_INT) {
        return Ok(integer);
    }
    if flags.contains(PropFlags::CELL_COORD_LOW) {
        let frac = r.read_ubits(CELL_COORD_LOW_FRACTIONAL_BITS)?;
        return Ok(integer + frac as f32 / (1u32 << CELL_COORD_LOW_FRACTIONAL_BITS) as f32);
    }
    let frac = r.read_ubits(CELL_COORD_FRACTIONAL_BITS)?;
    Ok(integer + frac as f32 / (1u32 << CELL_COORD_FRACTIONAL_BITS) as f32)
}

fn read_varint64(r: &mut BitReader) -> DemoResult<i64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = r.read_ubits(8)? as u64;
        result |= (byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 70 {
            return Err(DemoError::Truncated);
        }
    }
    Ok(result as i64)
}

fn decode_int(r: &mut BitReader, flags: PropFlags, bits: u32) -> DemoResult<i32> {
    if flags.contains(PropFlags::VARINT) {
        return r.read_varint32();
    }
    if flags.contains(PropFlags::UNSIGNED) {
        Ok(r.read_ubits(bits)? as i32)
    } else {
        r.read_sbits(bits)
    }
}

fn decode_float(r: &mut BitReader, prop: &FlatBits) -> DemoResult<f32> {
    if prop.flags.contains(PropFlags::COORD) {
        read_bit_coord(r)
    } else if prop.flags.contains(PropFlags::NORMAL) {
        read_bit_normal(r)
    } else if prop.flags.contains(PropFlags::NOSCALE) {
        Ok(f32::from_bits(r.read_ubits(32)?))
    } else if prop.flags.intersects(
        PropFlags::CELL_COORD | PropFlags::CELL_COORD_LOW | PropFlags::CELL_COORD_INT,
    ) {
        read_cell_coord(r, prop.bits, prop.flags)
    } else {
        let raw = r.read_ubits(prop.bits)?;
        let denom = if prop.bits >= 32 {
            u32::MAX as f32
        } else {
            ((1u32 << prop.bits) - 1) as f32
        };
        Ok(prop.low + (raw as f32 / denom) * (prop.high - prop.low))
    }
}

/// The subset of a descriptor's decode-relevant fields, shared between
/// [`FlatProp`] and [`ElementDescriptor`] so array elements reuse the
/// same scalar decoders as top-level props.
struct FlatBits {
    flags: PropFlags,
    low: f32,
    high: f32,
    bits: u32,
}

impl From<&FlatProp> for FlatBits {
    fn from(p: &FlatProp) -> Self {
        FlatBits {
            flags: p.flags,
            low: p.low_value,
            high: p.high_value,
            bits: p.num_bits,
        }
    }
}

impl From<&ElementDescriptor> for FlatBits {
    fn from(e: &ElementDescriptor) -> Self {
        FlatBits {
            flags: e.flags,
            low: e.low_value,
            high: e.high_value,
            bits: e.num_bits,
        }
    }
}

fn decode_vector3(r: &mut BitReader, bits: &FlatBits) -> DemoResult<Vector3> {
    if bits.flags.contains(PropFlags::NORMAL) {
        let x = read_bit_normal(r)?;
        let y = read_bit_normal(r)?;
        let sign = r.read_bit()?;
        let mag_sq = 1.0 - x * x - y * y;
        let mut z = if mag_sq > 0.0 { mag_sq.sqrt() } else { 0.0 };
        if sign != 0 {
            z = -z;
        }
        return Ok(Vector3 { x, y, z });
    }
    let x = decode_float(r, bits)?;
    let y = decode_float(r, bits)?;
    let z = decode_float(r, bits)?;
    Ok(Vector3 { x, y, z })
}

fn decode_string(r: &mut BitReader) -> DemoResult<String> {
    let len = r.read_ubits(9)? as usize;
    let len = len.min(MAX_STRING_PROP_LEN);
    let bytes = r.read_bytes(len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn element_count_bits(element_count: u32) -> u32 {
    let mut bits = 0u32;
    let mut n = element_count.max(1);
    while n > 1 {
        n = n.div_ceil(2);
        bits += 1;
    }
    bits.max(1)
}

fn decode_scalar_by_type(
    r: &mut BitReader,
    prop_type: PropType,
    bits: &FlatBits,
) -> DemoResult<DecodedValue> {
    match prop_type {
        PropType::Int => Ok(DecodedValue::Int32(decode_int(r, bits.flags, bits.bits)?)),
        PropType::Int64 => {
            let v = if bits.flags.contains(PropFlags::VARINT) {
                read_varint64(r)?
            } else {
                r.read_ubits(32)? as i64 | ((r.read_ubits(32)? as i64) << 32)
            };
            Ok(DecodedValue::Int64(v))
        }
        PropType::Float => Ok(DecodedValue::Float(decode_float(r, bits)?)),
        PropType::Vector => Ok(DecodedValue::Vector3(decode_vector3(r, bits)?)),
        PropType::VectorXY => {
            let x = decode_float(r, bits)?;
            let y = decode_float(r, bits)?;
            Ok(DecodedValue::Vector2(Vector2 { x, y }))
        }
        PropType::String => Ok(DecodedValue::String(decode_string(r)?)),
        PropType::Array | PropType::DataTable => Err(DemoError::PropertyDecodeError {
            class_id: 0,
            field_index: -1,
        }),
    }
}

/// Decodes one property, per `skip` has no effect on
/// which bits are consumed (see module docs); it is accepted so call
/// sites can express intent without a second code path to keep in sync.
pub fn decode_prop(r: &mut BitReader, prop: &FlatProp, _skip: bool) -> DemoResult<DecodedValue> {
    if prop.prop_type == PropType::Array {
        let element = prop
            .array_element
            .as_deref()
            .ok_or(DemoError::PropertyDecodeError {
                class_id: 0,
                field_index: -1,
            })?;
        let count_bits = element_count_bits(prop.element_count);
        let len = r.read_ubits(count_bits)? as usize;
        let bits = FlatBits::from(element);
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(decode_scalar_by_type(r, element.prop_type, &bits)?);
        }
        return Ok(DecodedValue::Array(values));
    }
    let bits = FlatBits::from(prop);
    decode_scalar_by_type(r, prop.prop_type, &bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(prop_type: PropType, flags: PropFlags, low: f32, high: f32, bits: u32) -> FlatProp {
        FlatProp {
            var_name: "x".into(),
            prop_type,
            flags,
            low_value: low,
            high_value: high,
            num_bits: bits,
            priority: 0,
            element_count: 0,
            array_element: None,
        }
    }

    #[test]
    fn decodes_linear_dequantized_float() {
        // 3 bits, raw 0b111 == 7/7 == 1.0 scaled into [0, 10] -> 10.0
        let data = [0b0000_0111u8];
        let mut r = BitReader::new(&data);
        let p = flat(PropType::Float, PropFlags::empty(), 0.0, 10.0, 3);
        match decode_prop(&mut r, &p, false).unwrap() {
            DecodedValue::Float(v) => assert!((v - 10.0).abs() < 1e-5),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn decodes_noscale_float_as_raw_bits() {
        let raw: u32 = 1_078_530_011; // bit pattern for pi (approx)
        let data = raw.to_le_bytes();
        let mut r = BitReader::new(&data);
        let p = flat(PropType::Float, PropFlags::NOSCALE, 0.0, 0.0, 32);
        match decode_prop(&mut r, &p, false).unwrap() {
            DecodedValue::Float(v) => assert!((v - f32::from_bits(raw)).abs() < 1e-3),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn decodes_unsigned_int() {
        let data = [0b0101_0101u8];
        let mut r = BitReader::new(&data);
        let p = flat(PropType::Int, PropFlags::UNSIGNED, 0.0, 0.0, 8);
        match decode_prop(&mut r, &p, false).unwrap() {
            DecodedValue::Int32(v) => assert_eq!(v, 0b0101_0101),
            _ => panic!("expected int"),
        }
    }

    #[test]
    fn element_count_bits_matches_ceil_log2() {
        assert_eq!(element_count_bits(1), 1);
        assert_eq!(element_count_bits(4), 2);
        assert_eq!(element_count_bits(5), 3);
    }
}
