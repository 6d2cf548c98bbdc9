//! String table engine: one shared decode routine for both full
//! creation and delta updates, plus the `userinfo` specialization that
//! reinterprets user-data as a [`PlayerInfo`] record. Grounded on
//! `ParseStringTableUpdate` in the reference C++ dumper
//! `demofiledump.cpp`.

use std::collections::VecDeque;

use clutch_core::bitreader::BitReader;
use clutch_core::error::{DemoError, DemoResult};

use crate::playerinfo::PlayerInfo;

/// Width of the substring history index and the maximum length of a
/// substring-referenced prefix; also sizes each history ring slot to
/// `2^SUBSTRING_BITS` bytes.
const SUBSTRING_BITS: u32 = 5;
const HISTORY_CAPACITY: usize = 32;
const MAX_USERDATA_BITS: u32 = 14;
const MAX_USERDATA_SIZE: usize = 1 << MAX_USERDATA_BITS;

/// One decoded string-table entry, before the `userinfo` specialization
/// is applied.
#[derive(Clone, Debug)]
pub struct DecodedEntry {
    pub index: u32,
    pub value: String,
    pub user_data: Option<Vec<u8>>,
}

/// Parameters shared by full-creation and delta-update ingress.
#[derive(Clone, Copy, Debug)]
pub struct UpdateParams {
    pub entry_count: u32,
    pub max_entries: u32,
    pub fixed_size: bool,
    pub size_bits: u32,
    pub user_data_size: usize,
}

fn entry_index_bits(max_entries: u32) -> u32 {
    let mut bits = 0u32;
    let mut n = max_entries;
    while n > 1 {
        n >>= 1;
        bits += 1;
    }
    bits.max(1)
}

/// Decodes `params.entry_count` entries from `reader`, maintaining the
/// FIFO substring-reference history ring in place. Returns
/// [`DemoError::UnsupportedEncoding`] immediately if the block is
/// dictionary-encoded — packet-scoped, the caller drops just this
/// update.
pub fn decode_update(
    reader: &mut BitReader,
    params: UpdateParams,
    history: &mut VecDeque<String>,
) -> DemoResult<Vec<DecodedEntry>> {
    if reader.read_bit()? != 0 {
        return Err(DemoError::UnsupportedEncoding);
    }

    let index_bits = entry_index_bits(params.max_entries);
    let mut last_index: i64 = -1;
    let mut out = Vec::with_capacity(params.entry_count as usize);

    for _ in 0..params.entry_count {
        let index = if reader.read_bit()? != 0 {
            last_index + 1
        } else {
            reader.read_ubits(index_bits)? as i64
        };
        last_index = index;

        let mut value = String::new();
        if reader.read_bit()? != 0 {
            if reader.read_bit()? != 0 {
                let history_index = reader.read_ubits(5)? as usize;
                let prefix_len = reader.read_ubits(SUBSTRING_BITS)? as usize;
                if let Some(prefix) = history.get(history_index) {
                    value.push_str(&prefix.chars().take(prefix_len).collect::<String>());
                }
                value.push_str(&reader.read_string(1024)?);
            } else {
                value = reader.read_string(1024)?;
            }
            let cap = 1usize << SUBSTRING_BITS;
            if value.len() > cap {
                value.truncate(cap);
            }
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(value.clone());
        }

        let user_data = if reader.read_bit()? != 0 {
            if params.fixed_size {
                let mut buf = vec![0u8; params.user_data_size];
                reader.read_bits(&mut buf, params.size_bits as usize)?;
                Some(buf)
            } else {
                let len = reader.read_ubits(MAX_USERDATA_BITS)? as usize;
                if len > MAX_USERDATA_SIZE {
                    return Err(DemoError::Truncated);
                }
                Some(reader.read_bytes(len)?)
            }
        } else {
            None
        };

        out.push(DecodedEntry {
            index: index as u32,
            value,
            user_data,
        });
    }

    Ok(out)
}

/// One named string table. Plain entries are tracked generically; the
/// `userinfo` table additionally feeds a parallel [`PlayerInfo`] vector
/// owned by the caller, since player-info has its own dense-index
/// append-or-overwrite semantics distinct from this table's own entry
/// slots.
pub struct StringTable {
    pub name: String,
    pub max_entries: u32,
    pub is_userinfo: bool,
    pub fixed_user_data_size: usize,
    pub fixed_user_data_size_bits: u32,
    pub user_data_fixed_size: bool,
    entries: Vec<Option<DecodedEntry>>,
    history: VecDeque<String>,
}

impl StringTable {
    pub fn create(
        name: impl Into<String>,
        max_entries: u32,
        user_data_size: usize,
        user_data_size_bits: u32,
        user_data_fixed_size: bool,
    ) -> Self {
        let name = name.into();
        let is_userinfo = name == "userinfo";
        Self {
            name,
            max_entries,
            is_userinfo,
            fixed_user_data_size: user_data_size,
            fixed_user_data_size_bits: user_data_size_bits,
            user_data_fixed_size,
            entries: Vec::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Applies a full snapshot: resets the history ring (:
    /// "reset at every `CreateStringTable` but not at `UpdateStringTable`").
    pub fn apply_create(&mut self, reader: &mut BitReader, entry_count: u32) -> DemoResult<Vec<DecodedEntry>> {
        self.history.clear();
        let entries = decode_update(
            reader,
            UpdateParams {
                entry_count,
                max_entries: self.max_entries,
                fixed_size: self.user_data_fixed_size,
                size_bits: self.fixed_user_data_size_bits,
                user_data_size: self.fixed_user_data_size,
            },
            &mut self.history,
        )?;
        self.store(&entries);
        Ok(entries)
    }

    pub fn apply_update(&mut self, reader: &mut BitReader, num_changed: u32) -> DemoResult<Vec<DecodedEntry>> {
        let entries = decode_update(
            reader,
            UpdateParams {
                entry_count: num_changed,
                max_entries: self.max_entries,
                fixed_size: self.user_data_fixed_size,
                size_bits: self.fixed_user_data_size_bits,
                user_data_size: self.fixed_user_data_size,
            },
            &mut self.history,
        )?;
        self.store(&entries);
        Ok(entries)
    }

    fn store(&mut self, entries: &[DecodedEntry]) {
        for e in entries {
            let idx = e.index as usize;
            if idx >= self.entries.len() {
                self.entries.resize(idx + 1, None);
            }
            self.entries[idx] = Some(e.clone());
        }
    }

    pub fn get(&self, index: u32) -> Option<&DecodedEntry> {
        self.entries.get(index as usize).and_then(|e| e.as_ref())
    }
}

/// Builds a [`PlayerInfo`] from a decoded userinfo entry's user-data
/// buffer, per specialization.
pub fn player_info_from_entry(entry: &DecodedEntry) -> DemoResult<Option<PlayerInfo>> {
    match &entry.user_data {
        Some(buf) => Ok(Some(PlayerInfo::from_bytes(buf)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit_writer() -> Vec<u8> {
        Vec::new()
    }

    struct BitWriter {
        bytes: Vec<u8>,
        bit_pos: usize,
    }

    impl BitWriter {
        fn new() -> Self {
            Self {
                bytes: bit_writer(),
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
        fn push_byte_aligned(&mut self, b: u8) {
            self.push_bits(b as u32, 8);
        }
    }

    #[test]
    fn history_ring_evicts_oldest_at_33rd_write() {
        let mut history: VecDeque<String> = VecDeque::new();
        for i in 0..33 {
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(format!("entry{i}"));
        }
        assert_eq!(history.len(), 32);
        assert_eq!(history.front().unwrap(), "entry1");
    }

    #[test]
    fn decodes_simple_creation_without_userdata() {
        let mut w = BitWriter::new();
        w.push_bit(0); // not dictionary-encoded
        // entry 0: explicit index bit=0 absent (uses "not explicit" path => bit=1 means last+1)
        w.push_bit(1); // incremental index (last_index+1 == 0)
        w.push_bit(1); // has string
        w.push_bit(0); // not substring
        for b in b"hello" {
            w.push_byte_aligned(*b);
        }
        w.push_byte_aligned(0);
        w.push_bit(0); // no user data
        let mut reader = BitReader::new(&w.bytes);
        let mut history = VecDeque::new();
        let entries = decode_update(
            &mut reader,
            UpdateParams {
                entry_count: 1,
                max_entries: 1024,
                fixed_size: false,
                size_bits: 0,
                user_data_size: 0,
            },
            &mut history,
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "hello");
        assert_eq!(entries[0].index, 0);
    }

    #[test]
    fn dictionary_encoding_is_rejected() {
        let data = [0b0000_0001u8];
        let mut reader = BitReader::new(&data);
        let mut history = VecDeque::new();
        let result = decode_update(
            &mut reader,
            UpdateParams {
                entry_count: 1,
                max_entries: 16,
                fixed_size: false,
                size_bits: 0,
                user_data_size: 0,
            },
            &mut history,
        );
        assert!(matches!(result, Err(DemoError::UnsupportedEncoding)));
    }
}
