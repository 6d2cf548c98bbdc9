//! Minimal protobuf wire-format reader.
//!
//! There are no vendored `.proto` schemas to generate real message types
//! from, so this module reads just enough of the wire format (tag/varint/
//! length-delimited/fixed32/fixed64) to pull the handful of fields each
//! required opcode actually carries: a small, manual reader rather than
//! a generated one.

use crate::error::{DemoError, DemoResult};

#[derive(Debug, Clone)]
pub enum WireValue {
    Varint(u64),
    Fixed64([u8; 8]),
    LengthDelimited(Vec<u8>),
    Fixed32([u8; 4]),
}

#[derive(Debug, Clone)]
pub struct WireField {
    pub number: u32,
    pub value: WireValue,
}

/// Walk every top-level field in a protobuf-encoded payload.
pub fn parse_fields(mut buf: &[u8]) -> DemoResult<Vec<WireField>> {
    let mut fields = Vec::new();
    while !buf.is_empty() {
        let (tag, rest) = read_varint(buf)?;
        buf = rest;
        let number = (tag >> 3) as u32;
        let wire_type = tag & 0x7;
        let (value, rest) = match wire_type {
            0 => {
                let (v, rest) = read_varint(buf)?;
                (WireValue::Varint(v), rest)
            }
            1 => {
                if buf.len() < 8 {
                    return Err(DemoError::Truncated);
                }
                let mut b = [0u8; 8];
                b.copy_from_slice(&buf[..8]);
                (WireValue::Fixed64(b), &buf[8..])
            }
            2 => {
                let (len, rest) = read_varint(buf)?;
                let len = len as usize;
                if rest.len() < len {
                    return Err(DemoError::Truncated);
                }
                (
                    WireValue::LengthDelimited(rest[..len].to_vec()),
                    &rest[len..],
                )
            }
            5 => {
                if buf.len() < 4 {
                    return Err(DemoError::Truncated);
                }
                let mut b = [0u8; 4];
                b.copy_from_slice(&buf[..4]);
                (WireValue::Fixed32(b), &buf[4..])
            }
            _ => return Err(DemoError::Truncated),
        };
        buf = rest;
        fields.push(WireField { number, value });
    }
    Ok(fields)
}

fn read_varint(buf: &[u8]) -> DemoResult<(u64, &[u8])> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    let mut i = 0;
    loop {
        let byte = *buf.get(i).ok_or(DemoError::Truncated)?;
        result |= ((byte & 0x7f) as u64) << shift;
        i += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 70 {
            return Err(DemoError::Truncated);
        }
    }
    Ok((result, &buf[i..]))
}

impl WireValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            WireValue::Varint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_u64().map(|v| v as i64)
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().map(|v| v as i32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_u64().map(|v| v != 0)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::LengthDelimited(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            WireValue::Fixed32(b) => Some(f32::from_le_bytes(*b)),
            _ => None,
        }
    }
}

/// Find the first field with the given number.
pub fn field<'a>(fields: &'a [WireField], number: u32) -> Option<&'a WireField> {
    fields.iter().find(|f| f.number == number)
}

/// Collect every field with the given number, in order.
pub fn fields_by<'a>(fields: &'a [WireField], number: u32) -> Vec<&'a WireField> {
    fields.iter().filter(|f| f.number == number).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint_field(number: u32, value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint(&mut out, ((number as u64) << 3) | 0);
        encode_varint(&mut out, value);
        out
    }

    fn encode_varint(out: &mut Vec<u8>, mut v: u64) {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if v == 0 {
                break;
            }
        }
    }

    #[test]
    fn parses_single_varint_field() {
        let buf = encode_varint_field(1, 42);
        let fields = parse_fields(&buf).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].number, 1);
        assert_eq!(fields[0].value.as_i64(), Some(42));
    }

    #[test]
    fn parses_length_delimited_field() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, (2u64 << 3) | 2);
        encode_varint(&mut buf, 5);
        buf.extend_from_slice(b"hello");
        let fields = parse_fields(&buf).unwrap();
        assert_eq!(fields[0].value.as_str().as_deref(), Some("hello"));
    }

    #[test]
    fn truncated_payload_errors() {
        let buf = vec![0x08]; // tag only, no value
        assert!(parse_fields(&buf).is_err());
    }
}
