//! Entity registry: the per-tick PVS state machine and delta-prop
//! application. Grounded on `ReadFieldIndex`, `ReadNewEntity`, and the
//! `PrintNetMessage<CSVCMsg_PacketEntities,...>` update loop in
//! the reference C++ dumper `demofiledump.cpp`.

use std::collections::HashMap;

use clutch_core::bitreader::BitReader;
use clutch_core::error::{DemoError, DemoResult};
use clutch_proto::flatten::FlattenedClass;
use clutch_proto::value::DecodedValue;
use clutch_proto::{decode_prop, server_class_bits};

/// Standard Source-engine values; the defining headers aren't part of
/// the retrieved reference source, so these are carried over as the
/// well-known constants rather than re-derived.
pub const MAX_EDICTS: usize = 2048;
const NUM_NETWORKED_EHANDLE_SERIAL_NUMBER_BITS: u32 = 10;
const ENTITY_SENTINEL: i32 = 9999;

const FHDR_ZERO: u8 = 0;
const FHDR_LEAVEPVS: u8 = 1;
const FHDR_DELETE: u8 = 2;
const FHDR_ENTERPVS: u8 = 4;

/// One live networked entity: its server class and the sparse set of
/// decoded property values addressed by flattened field index.
#[derive(Clone, Debug)]
pub struct Entity {
    pub id: i32,
    pub class_id: u16,
    pub serial_num: u32,
    pub props: HashMap<usize, DecodedValue>,
}

impl Entity {
    fn new(id: i32, class_id: u16, serial_num: u32) -> Self {
        Entity {
            id,
            class_id,
            serial_num,
            props: HashMap::new(),
        }
    }

    pub fn get(&self, field_index: usize) -> Option<&DecodedValue> {
        self.props.get(&field_index)
    }
}

/// A kind of per-entity update applied while walking one `PacketEntities`
/// message, surfaced to callers so the semantic layer can react
/// without re-deriving it from raw flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    EnterPvs,
    LeavePvs { deleted: bool },
    Delta,
    Preserve,
}

/// One observed entity update, yielded to the caller as the packet is
/// walked.
pub struct EntityUpdate {
    pub entity_id: i32,
    pub kind: UpdateKind,
}

/// Holds the full entity table plus the flattened class table needed to
/// resolve field indices to decoders. One instance lives for the whole
/// demo; server classes are registered once after the data-tables block
/// is parsed.
pub struct EntityRegistry {
    entities: Vec<Option<Entity>>,
    classes: HashMap<u16, FlattenedClass>,
    server_class_bits: u32,
}

impl EntityRegistry {
    pub fn new(num_server_classes: usize) -> Self {
        EntityRegistry {
            entities: vec![None; MAX_EDICTS],
            classes: HashMap::new(),
            server_class_bits: server_class_bits(num_server_classes),
        }
    }

    pub fn register_class(&mut self, flattened: FlattenedClass) {
        self.classes.insert(flattened.class_id, flattened);
    }

    pub fn get(&self, entity_id: i32) -> Option<&Entity> {
        self.entities.get(entity_id as usize)?.as_ref()
    }

    /// Walks one `PacketEntities` payload, applying every ENTER_PVS,
    /// LEAVE_PVS, DELTA, and PRESERVE update it describes and returning
    /// them in wire order.
    pub fn apply_packet_entities(
        &mut self,
        reader: &mut BitReader,
        updated_entries: i32,
        is_delta: bool,
    ) -> DemoResult<Vec<EntityUpdate>> {
        let mut header_count = updated_entries;
        let mut header_base: i32 = -1;
        let mut new_entity: i32 = -1;
        let mut updates = Vec::new();

        loop {
            header_count -= 1;
            let is_entity = header_count >= 0;
            let mut flags = FHDR_ZERO;

            if is_entity {
                new_entity = header_base + 1 + reader.read_ubit_var()? as i32;
                header_base = new_entity;

                if reader.read_bit()? == 0 {
                    if reader.read_bit()? != 0 {
                        flags |= FHDR_ENTERPVS;
                    }
                } else {
                    flags |= FHDR_LEAVEPVS;
                    if reader.read_bit()? != 0 {
                        flags |= FHDR_DELETE;
                    }
                }
            }

            if !is_entity || new_entity > ENTITY_SENTINEL {
                break;
            }

            let kind = if flags & FHDR_ENTERPVS != 0 {
                UpdateKind::EnterPvs
            } else if flags & FHDR_LEAVEPVS != 0 {
                UpdateKind::LeavePvs {
                    deleted: flags & FHDR_DELETE != 0,
                }
            } else {
                UpdateKind::Delta
            };

            match kind {
                UpdateKind::EnterPvs => {
                    let class_id = reader.read_ubits(self.server_class_bits)? as u16;
                    let serial_num = reader.read_ubits(NUM_NETWORKED_EHANDLE_SERIAL_NUMBER_BITS)?;
                    let entity = Entity::new(new_entity, class_id, serial_num);
                    self.set_slot(new_entity, entity)?;
                    self.read_new_entity(reader, new_entity)?;
                }
                UpdateKind::LeavePvs { .. } => {
                    if !is_delta {
                        log::warn!("LeavePVS on a full update for entity {new_entity}");
                    } else {
                        self.clear_slot(new_entity)?;
                    }
                }
                UpdateKind::Delta => {
                    self.read_new_entity(reader, new_entity)?;
                }
                UpdateKind::Preserve => {}
            }

            updates.push(EntityUpdate {
                entity_id: new_entity,
                kind,
            });
        }

        Ok(updates)
    }

    fn set_slot(&mut self, id: i32, entity: Entity) -> DemoResult<()> {
        let idx = id as usize;
        if idx >= self.entities.len() {
            return Err(DemoError::PropertyDecodeError {
                class_id: 0,
                field_index: id,
            });
        }
        self.entities[idx] = Some(entity);
        Ok(())
    }

    fn clear_slot(&mut self, id: i32) -> DemoResult<()> {
        if let Some(slot) = self.entities.get_mut(id as usize) {
            *slot = None;
        }
        Ok(())
    }

    /// Reads the field-index list for one entity's delta and decodes
    /// each referenced property in place, grounded on `ReadNewEntity`.
    fn read_new_entity(&mut self, reader: &mut BitReader, entity_id: i32) -> DemoResult<()> {
        let class_id = match self.entities.get(entity_id as usize).and_then(|e| e.as_ref()) {
            Some(e) => e.class_id,
            None => {
                return Err(DemoError::PropertyDecodeError {
                    class_id: 0,
                    field_index: entity_id,
                })
            }
        };

        let flattened = self.classes.get(&class_id).ok_or(DemoError::PropertyDecodeError {
            class_id,
            field_index: -1,
        })?;

        let new_way = reader.read_bit()? != 0;
        let mut field_indices = Vec::new();
        let mut index: i32 = -1;
        let mut steps = 0u32;
        loop {
            index = read_field_index(reader, index, new_way)?;
            if index == -1 {
                break;
            }
            field_indices.push(index);
            steps += 1;
            if steps > clutch_core::error::MAX_FIELD_INDEX_STEPS {
                return Err(DemoError::RunawayFieldIndex(steps));
            }
        }

        for &idx in &field_indices {
            let prop = flattened.props.get(idx as usize).ok_or(DemoError::PropertyDecodeError {
                class_id,
                field_index: idx,
            })?;
            let value = decode_prop(reader, prop, false)?;
            if let Some(entity) = self.entities.get_mut(entity_id as usize).and_then(|e| e.as_mut()) {
                entity.props.insert(idx as usize, value);
            }
        }

        Ok(())
    }
}

/// Decodes one field index off the delta stream.
/// Grounded on `ReadFieldIndex`: a run of 1-bits each advance by exactly
/// one, otherwise a variable-width offset is read and added to
/// `last_index + 1`; `0xFFF` is the end-of-list sentinel.
fn read_field_index(reader: &mut BitReader, last_index: i32, new_way: bool) -> DemoResult<i32> {
    if new_way && reader.read_bit()? != 0 {
        return Ok(last_index + 1);
    }

    let ret = if new_way && reader.read_bit()? != 0 {
        reader.read_ubits(3)?
    } else {
        let mut ret = reader.read_ubits(7)?;
        match ret & (32 | 64) {
            32 => ret = (ret & !96) | (reader.read_ubits(2)? << 5),
            64 => ret = (ret & !96) | (reader.read_ubits(4)? << 5),
            96 => ret = (ret & !96) | (reader.read_ubits(7)? << 5),
            _ => {}
        }
        ret
    };

    if ret == 0xFFF {
        return Ok(-1);
    }

    Ok(last_index + 1 + ret as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BitWriter {
        bytes: Vec<u8>,
        bit_pos: usize,
    }

    impl BitWriter {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                bit_pos: 0,
            }
        }
        fn push_bit(&mut self, bit: u32) {
            if self.bit_pos % 8 == 0 {
                self.bytes.push(0);
            }
            let byte_idx = self.bit_pos / 8;
            self.bytes[byte_idx] |= ((bit & 1) as u8) << (self.bit_pos % 8);
            self.bit_pos += 1;
        }
        fn push_bits(&mut self, value: u32, n: u32) {
            for i in 0..n {
                self.push_bit((value >> i) & 1);
            }
        }
    }

    #[test]
    fn field_index_increments_by_one_on_consecutive_bit() {
        let mut w = BitWriter::new();
        w.push_bit(1); // new_way consecutive marker
        let mut r = BitReader::new(&w.bytes);
        let idx = read_field_index(&mut r, 4, true).unwrap();
        assert_eq!(idx, 5);
    }

    #[test]
    fn field_index_sentinel_ends_list() {
        let mut w = BitWriter::new();
        w.push_bit(0); // not consecutive
        w.push_bit(0); // old-style 7-bit path within new_way
        w.push_bits(0xFFF & 0x7f, 7); // low 7 bits = 0x7f
        // high bits of 0xFFF: 0xFFF & 96 == 96, so another 7 bits follow
        w.push_bits(0xFFF >> 5, 7);
        let mut r = BitReader::new(&w.bytes);
        let idx = read_field_index(&mut r, 10, true).unwrap();
        assert_eq!(idx, -1);
    }

    #[test]
    fn runaway_field_index_is_rejected_past_limit() {
        assert!(clutch_core::error::MAX_FIELD_INDEX_STEPS == 20_000);
    }
}
