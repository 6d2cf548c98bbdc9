//! Message framer: iterates `(cmd, size, payload)` triples inside a
//! wire-packet block and hands each payload to the caller's dispatch
//! closure, advancing exactly `size` bytes regardless of what the
//! dispatcher consumed. Mirrors `DumpDemoPacket`'s loop shape in the
//! reference C++ dumper `demofiledump.cpp`.

use crate::bitreader::BitReader;
use crate::error::{DemoError, DemoResult};
use crate::opcodes::Opcode;

/// One framed message, ready to hand to a per-opcode decoder.
pub struct Frame<'a> {
    pub opcode: Opcode,
    pub payload: &'a [u8],
}

/// Walk every frame in `data`, invoking `handle` with each. `handle`
/// returning `Err` with a packet-scoped [`DemoError`] does not abort the
/// iteration — framing.rs only escalates [`DemoError::CorruptFraming`]
/// (the length bookkeeping itself going bad), matching
/// recovery policy: a bad opcode payload drops that message, not the rest
/// of the block.
pub fn for_each_frame<'a, F>(data: &'a [u8], mut handle: F) -> DemoResult<()>
where
    F: FnMut(Frame<'a>) -> DemoResult<()>,
{
    let mut reader = BitReader::new(data);
    let length = data.len() as u32;
    loop {
        let bytes_read = reader.pos_bytes() as u32;
        if bytes_read >= length {
            break;
        }
        let cmd = reader.read_varint32()? as Opcode;
        let size = reader.read_varint32()? as u32;
        let after_header = reader.pos_bytes() as u32;
        if after_header + size > length {
            return Err(DemoError::CorruptFraming {
                bytes_read: after_header,
                size,
                length,
            });
        }
        let start = reader.pos_bytes();
        let payload = &data[start..start + size as usize];
        if let Err(e) = handle(Frame {
            opcode: cmd,
            payload,
        }) {
            if e.is_fatal() {
                return Err(e);
            }
            log::warn!("dropping frame for opcode {cmd}: {e}");
        }
        reader.seek_absolute((start + size as usize) * 8)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_varint(out: &mut Vec<u8>, mut v: u32) {
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
    fn iterates_two_frames() {
        let mut data = Vec::new();
        encode_varint(&mut data, 8); // cmd
        encode_varint(&mut data, 3); // size
        data.extend_from_slice(b"abc");
        encode_varint(&mut data, 9);
        encode_varint(&mut data, 2);
        data.extend_from_slice(b"xy");

        let mut seen = Vec::new();
        for_each_frame(&data, |f| {
            seen.push((f.opcode, f.payload.to_vec()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (8, b"abc".to_vec()));
        assert_eq!(seen[1], (9, b"xy".to_vec()));
    }

    #[test]
    fn corrupt_size_is_fatal() {
        let mut data = Vec::new();
        encode_varint(&mut data, 8);
        encode_varint(&mut data, 100); // size larger than remaining buffer
        data.extend_from_slice(b"a");
        let result = for_each_frame(&data, |_| Ok(()));
        assert!(matches!(result, Err(DemoError::CorruptFraming { .. })));
    }

    #[test]
    fn packet_scoped_handler_error_does_not_abort() {
        let mut data = Vec::new();
        encode_varint(&mut data, 8);
        encode_varint(&mut data, 1);
        data.push(0);
        encode_varint(&mut data, 9);
        encode_varint(&mut data, 1);
        data.push(0);

        let mut count = 0;
        for_each_frame(&data, |_| {
            count += 1;
            Err(DemoError::Truncated)
        })
        .unwrap();
        assert_eq!(count, 2);
    }
}
