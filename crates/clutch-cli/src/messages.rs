//! Per-opcode message shapes decoded off `clutch_core::wire`'s generic
//! field reader. Field numbers are this repo's own internal scheme, not
//! a vendored `.proto` — the only requirement is that encoder and
//! decoder agree, since no real `.proto` schemas are vendored here.
//! Field *names* and the handful of values each one carries are
//! grounded on the corresponding `ParseFromArray`/accessor calls in
//! the reference C++ dumper `demofiledump.cpp`.

use clutch_core::error::{DemoError, DemoResult};
use clutch_core::wire::{self, WireValue};

fn require_bytes(fields: &[wire::WireField], number: u32) -> DemoResult<Vec<u8>> {
    wire::field(fields, number)
        .and_then(|f| f.value.as_bytes())
        .map(|b| b.to_vec())
        .ok_or(DemoError::Truncated)
}

fn str_field(fields: &[wire::WireField], number: u32) -> String {
    wire::field(fields, number)
        .and_then(|f| f.value.as_str())
        .unwrap_or_default()
}

fn i32_field(fields: &[wire::WireField], number: u32) -> i32 {
    wire::field(fields, number)
        .and_then(|f| f.value.as_i32())
        .unwrap_or(0)
}

fn bool_field(fields: &[wire::WireField], number: u32) -> bool {
    wire::field(fields, number)
        .and_then(|f| f.value.as_bool())
        .unwrap_or(false)
}

/// `CSVCMsg_ServerInfo` (opcode 8): the fields the textual sink's
/// redesigned dump prints and the ones `Session`/the driver need
/// (`tick_interval`, `map_name`). Names mirror
/// `serverInfo.{map_name,tick_interval,...}` in the reference.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub protocol: i32,
    pub server_count: i32,
    pub is_dedicated: bool,
    pub is_hltv: bool,
    pub is_replay: bool,
    pub max_clients: i32,
    pub max_classes: i32,
    pub tick_interval: f32,
    pub game_dir: String,
    pub map_name: String,
    pub host_name: String,
}

pub fn parse_server_info(bytes: &[u8]) -> DemoResult<ServerInfo> {
    let fields = wire::parse_fields(bytes)?;
    Ok(ServerInfo {
        protocol: i32_field(&fields, 1),
        server_count: i32_field(&fields, 2),
        is_dedicated: bool_field(&fields, 3),
        is_hltv: bool_field(&fields, 5),
        is_replay: bool_field(&fields, 6),
        max_clients: i32_field(&fields, 11),
        max_classes: i32_field(&fields, 12),
        tick_interval: wire::field(&fields, 13)
            .and_then(|f| f.value.as_f32())
            .unwrap_or(0.0),
        game_dir: str_field(&fields, 14),
        map_name: str_field(&fields, 15),
        host_name: str_field(&fields, 17),
    })
}

/// `CSVCMsg_CreateStringTable` (opcode 12). `string_data` is the raw
/// bit-packed entry stream consumed by `clutch_state::stringtable`.
#[derive(Debug, Clone)]
pub struct CreateStringTableMsg {
    pub name: String,
    pub max_entries: u32,
    pub num_entries: u32,
    pub user_data_fixed_size: bool,
    pub user_data_size: i32,
    pub user_data_size_bits: i32,
    pub string_data: Vec<u8>,
}

pub fn parse_create_string_table(bytes: &[u8]) -> DemoResult<CreateStringTableMsg> {
    let fields = wire::parse_fields(bytes)?;
    Ok(CreateStringTableMsg {
        name: str_field(&fields, 1),
        max_entries: i32_field(&fields, 2) as u32,
        num_entries: i32_field(&fields, 3) as u32,
        user_data_fixed_size: bool_field(&fields, 4),
        user_data_size: i32_field(&fields, 5),
        user_data_size_bits: i32_field(&fields, 6),
        string_data: require_bytes(&fields, 8)?,
    })
}

/// `CSVCMsg_UpdateStringTable` (opcode 13).
#[derive(Debug, Clone)]
pub struct UpdateStringTableMsg {
    pub table_id: i32,
    pub num_changed_entries: u32,
    pub string_data: Vec<u8>,
}

pub fn parse_update_string_table(bytes: &[u8]) -> DemoResult<UpdateStringTableMsg> {
    let fields = wire::parse_fields(bytes)?;
    Ok(UpdateStringTableMsg {
        table_id: i32_field(&fields, 1),
        num_changed_entries: i32_field(&fields, 2) as u32,
        string_data: require_bytes(&fields, 3)?,
    })
}

/// `CSVCMsg_PacketEntities` (opcode 26).
#[derive(Debug, Clone)]
pub struct PacketEntitiesMsg {
    pub updated_entries: i32,
    pub is_delta: bool,
    pub entity_data: Vec<u8>,
}

pub fn parse_packet_entities(bytes: &[u8]) -> DemoResult<PacketEntitiesMsg> {
    let fields = wire::parse_fields(bytes)?;
    Ok(PacketEntitiesMsg {
        updated_entries: i32_field(&fields, 2),
        is_delta: bool_field(&fields, 3),
        entity_data: require_bytes(&fields, 7)?,
    })
}

/// One key/value pair off `CSVCMsg_GameEvent.keys` (
/// sum over `{string, float, long, short, byte, bool, uint64}`), plus the
/// `type` tag the `GameEventList` descriptor's parallel key carries.
#[derive(Debug, Clone)]
pub struct GameEventKeyWire {
    pub val_string: Option<String>,
    pub val_float: Option<f32>,
    pub val_long: Option<i32>,
    pub val_short: Option<i32>,
    pub val_byte: Option<i32>,
    pub val_bool: Option<bool>,
    pub val_uint64: Option<u64>,
}

fn parse_game_event_key(bytes: &[u8]) -> DemoResult<GameEventKeyWire> {
    let fields = wire::parse_fields(bytes)?;
    Ok(GameEventKeyWire {
        val_string: wire::field(&fields, 3).and_then(|f| f.value.as_str()),
        val_float: wire::field(&fields, 4).and_then(|f| f.value.as_f32()),
        val_long: wire::field(&fields, 5).and_then(|f| f.value.as_i32()),
        val_short: wire::field(&fields, 6).and_then(|f| f.value.as_i32()),
        val_byte: wire::field(&fields, 7).and_then(|f| f.value.as_i32()),
        val_bool: wire::field(&fields, 8).and_then(|f| f.value.as_bool()),
        val_uint64: wire::field(&fields, 9).and_then(|f| f.value.as_u64()),
    })
}

/// `CSVCMsg_GameEvent` (opcode 25).
#[derive(Debug, Clone)]
pub struct GameEventMsg {
    pub event_id: i32,
    pub keys: Vec<GameEventKeyWire>,
}

pub fn parse_game_event(bytes: &[u8]) -> DemoResult<GameEventMsg> {
    let fields = wire::parse_fields(bytes)?;
    let event_id = i32_field(&fields, 1);
    let mut keys = Vec::new();
    for key_field in wire::fields_by(&fields, 2) {
        if let WireValue::LengthDelimited(b) = &key_field.value {
            keys.push(parse_game_event_key(b)?);
        }
    }
    Ok(GameEventMsg { event_id, keys })
}

/// `CSVCMsg_GameEventList.descriptor_t.key_t.type()` values, per the
/// reference's `ShowPlayerInfo`/`ParseGameEvent` dispatch over
/// `KeyValue.has_val_*()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKeyType {
    String,
    Float,
    Long,
    Short,
    Byte,
    Bool,
    UInt64,
}

fn key_type_from_wire(v: i32) -> WireKeyType {
    match v {
        1 => WireKeyType::Float,
        2 => WireKeyType::Long,
        3 => WireKeyType::Short,
        4 => WireKeyType::Byte,
        5 => WireKeyType::Bool,
        6 => WireKeyType::UInt64,
        _ => WireKeyType::String,
    }
}

#[derive(Debug, Clone)]
pub struct GameEventDescriptorWire {
    pub event_id: i32,
    pub name: String,
    pub keys: Vec<(String, WireKeyType)>,
}

fn parse_descriptor(bytes: &[u8]) -> DemoResult<GameEventDescriptorWire> {
    let fields = wire::parse_fields(bytes)?;
    let event_id = i32_field(&fields, 1);
    let name = str_field(&fields, 2);
    let mut keys = Vec::new();
    for key_field in wire::fields_by(&fields, 3) {
        if let WireValue::LengthDelimited(b) = &key_field.value {
            let kf = wire::parse_fields(b)?;
            let ty = key_type_from_wire(i32_field(&kf, 1));
            let name = str_field(&kf, 2);
            keys.push((name, ty));
        }
    }
    Ok(GameEventDescriptorWire {
        event_id,
        name,
        keys,
    })
}

/// `CSVCMsg_GameEventList` (opcode 35).
pub fn parse_game_event_list(bytes: &[u8]) -> DemoResult<Vec<GameEventDescriptorWire>> {
    let fields = wire::parse_fields(bytes)?;
    let mut out = Vec::new();
    for descriptor_field in wire::fields_by(&fields, 1) {
        if let WireValue::LengthDelimited(b) = &descriptor_field.value {
            out.push(parse_descriptor(b)?);
        }
    }
    Ok(out)
}

/// One `rank_update` record off `CCSUsrMsg_ServerRankUpdate`, identified
/// within a `UserMessage` payload by `msg_type` (see
/// [`crate::pipeline::CS_UM_SERVER_RANK_UPDATE`]).
#[derive(Debug, Clone, Default)]
pub struct RankUpdateEntry {
    pub account_id: u32,
    pub num_wins: Option<i32>,
    pub rank_old: Option<i32>,
    pub rank_new: Option<i32>,
    pub rank_change: Option<i32>,
}

fn parse_rank_update_entry(bytes: &[u8]) -> DemoResult<RankUpdateEntry> {
    let fields = wire::parse_fields(bytes)?;
    Ok(RankUpdateEntry {
        account_id: i32_field(&fields, 1) as u32,
        num_wins: wire::field(&fields, 2).and_then(|f| f.value.as_i32()),
        rank_old: wire::field(&fields, 3).and_then(|f| f.value.as_i32()),
        rank_new: wire::field(&fields, 4).and_then(|f| f.value.as_i32()),
        rank_change: wire::field(&fields, 5).and_then(|f| f.value.as_i32()),
    })
}

/// `CSVCMsg_UserMessage` envelope (opcode 23): a `msg_type` tag plus the
/// inner message's own raw bytes (parsed lazily, only for the handful of
/// user messages this repo cares about — `ServerRankUpdate`).
pub struct UserMessageMsg {
    pub msg_type: i32,
    pub data: Vec<u8>,
}

pub fn parse_user_message(bytes: &[u8]) -> DemoResult<UserMessageMsg> {
    let fields = wire::parse_fields(bytes)?;
    Ok(UserMessageMsg {
        msg_type: i32_field(&fields, 1),
        data: require_bytes(&fields, 2)?,
    })
}

/// `CCSUsrMsg_ServerRankUpdate`: a repeated `rank_update_data` field.
pub fn parse_server_rank_update(bytes: &[u8]) -> DemoResult<Vec<RankUpdateEntry>> {
    let fields = wire::parse_fields(bytes)?;
    let mut out = Vec::new();
    for entry_field in wire::fields_by(&fields, 1) {
        if let WireValue::LengthDelimited(b) = &entry_field.value {
            out.push(parse_rank_update_entry(b)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn tag(out: &mut Vec<u8>, number: u32, wire_type: u32) {
        encode_varint(out, ((number as u64) << 3) | wire_type as u64);
    }

    fn string_field(out: &mut Vec<u8>, number: u32, s: &str) {
        tag(out, number, 2);
        encode_varint(out, s.len() as u64);
        out.extend_from_slice(s.as_bytes());
    }

    fn varint_field(out: &mut Vec<u8>, number: u32, v: u64) {
        tag(out, number, 0);
        encode_varint(out, v);
    }

    #[test]
    fn parses_server_info_fields() {
        let mut buf = Vec::new();
        varint_field(&mut buf, 1, 13);
        string_field(&mut buf, 15, "de_dust2");
        let info = parse_server_info(&buf).unwrap();
        assert_eq!(info.protocol, 13);
        assert_eq!(info.map_name, "de_dust2");
    }

    #[test]
    fn parses_game_event_with_short_key() {
        let mut key = Vec::new();
        varint_field(&mut key, 6, 7); // val_short
        let mut buf = Vec::new();
        varint_field(&mut buf, 1, 42);
        tag(&mut buf, 2, 2);
        encode_varint(&mut buf, key.len() as u64);
        buf.extend_from_slice(&key);
        let msg = parse_game_event(&buf).unwrap();
        assert_eq!(msg.event_id, 42);
        assert_eq!(msg.keys[0].val_short, Some(7));
    }

    #[test]
    fn parses_descriptor_key_types() {
        let mut key = Vec::new();
        varint_field(&mut key, 1, 3); // short
        string_field(&mut key, 2, "userid");
        let mut descriptor = Vec::new();
        varint_field(&mut descriptor, 1, 9);
        string_field(&mut descriptor, 2, "player_jump");
        tag(&mut descriptor, 3, 2);
        encode_varint(&mut descriptor, key.len() as u64);
        descriptor.extend_from_slice(&key);
        let mut buf = Vec::new();
        tag(&mut buf, 1, 2);
        encode_varint(&mut buf, descriptor.len() as u64);
        buf.extend_from_slice(&descriptor);
        let list = parse_game_event_list(&buf).unwrap();
        assert_eq!(list[0].name, "player_jump");
        assert_eq!(list[0].keys[0], ("userid".to_string(), WireKeyType::Short));
    }
}
