//! Send-table store: parses the boundary-marked `SendTable` stream
//! that opens the recording's `dem_datatables` block and binds
//! `class_id → dt_name → table` plus the server-class list. Grounded on
//! `ParseDataTable`/`GatherExcludes` in
//! the reference C++ dumper `demofiledump.cpp`; the protobuf message
//! shapes themselves are read through `clutch_core::wire` since no real
//! `.proto` schemas are vendored here.

use std::collections::HashMap;

use clutch_core::bitreader::BitReader;
use clutch_core::error::{DemoError, DemoResult};
use clutch_core::wire::{self, WireValue};

use crate::descriptor::{PropFlags, PropType, SendProp, SendTable, ServerClassEntry};

mod field {
    pub const IS_END: u32 = 1;
    pub const NET_TABLE_NAME: u32 = 2;
    pub const PROPS: u32 = 3;
}

mod prop_field {
    pub const TYPE: u32 = 1;
    pub const VAR_NAME: u32 = 2;
    pub const FLAGS: u32 = 3;
    pub const PRIORITY: u32 = 4;
    pub const DT_NAME: u32 = 5;
    pub const NUM_ELEMENTS: u32 = 6;
    pub const LOW_VALUE: u32 = 7;
    pub const HIGH_VALUE: u32 = 8;
    pub const NUM_BITS: u32 = 9;
}

fn prop_type_from_wire(v: u64) -> PropType {
    match v {
        0 => PropType::Int,
        1 => PropType::Float,
        2 => PropType::Vector,
        3 => PropType::VectorXY,
        4 => PropType::String,
        5 => PropType::Array,
        7 => PropType::Int64,
        _ => PropType::DataTable,
    }
}

fn parse_send_prop(bytes: &[u8]) -> DemoResult<SendProp> {
    let fields = wire::parse_fields(bytes)?;
    let prop_type = wire::field(&fields, prop_field::TYPE)
        .and_then(|f| f.value.as_u64())
        .map(prop_type_from_wire)
        .unwrap_or(PropType::Int);
    let var_name = wire::field(&fields, prop_field::VAR_NAME)
        .and_then(|f| f.value.as_str())
        .unwrap_or_default();
    let dt_name = wire::field(&fields, prop_field::DT_NAME)
        .and_then(|f| f.value.as_str())
        .unwrap_or_default();
    let flags = wire::field(&fields, prop_field::FLAGS)
        .and_then(|f| f.value.as_u64())
        .map(|v| PropFlags::from_bits_truncate(v as u32))
        .unwrap_or_default();
    let priority = wire::field(&fields, prop_field::PRIORITY)
        .and_then(|f| f.value.as_u64())
        .unwrap_or(0) as u32;
    let element_count = wire::field(&fields, prop_field::NUM_ELEMENTS)
        .and_then(|f| f.value.as_u64())
        .unwrap_or(0) as u32;
    let low_value = wire::field(&fields, prop_field::LOW_VALUE)
        .and_then(|f| f.value.as_f32())
        .unwrap_or(0.0);
    let high_value = wire::field(&fields, prop_field::HIGH_VALUE)
        .and_then(|f| f.value.as_f32())
        .unwrap_or(0.0);
    let num_bits = wire::field(&fields, prop_field::NUM_BITS)
        .and_then(|f| f.value.as_u64())
        .unwrap_or(0) as u32;
    Ok(SendProp {
        var_name,
        dt_name,
        prop_type,
        flags,
        low_value,
        high_value,
        num_bits,
        priority,
        element_count,
        array_element_prop: None,
    })
}

fn parse_send_table_msg(bytes: &[u8]) -> DemoResult<(bool, SendTable)> {
    let fields = wire::parse_fields(bytes)?;
    let is_end = wire::field(&fields, field::IS_END)
        .and_then(|f| f.value.as_bool())
        .unwrap_or(false);
    let net_table_name = wire::field(&fields, field::NET_TABLE_NAME)
        .and_then(|f| f.value.as_str())
        .unwrap_or_default();
    let mut props = Vec::new();
    for prop_field in wire::fields_by(&fields, field::PROPS) {
        if let WireValue::LengthDelimited(bytes) = &prop_field.value {
            let mut prop = parse_send_prop(bytes)?;
            if prop.prop_type == PropType::Array && !props.is_empty() {
                prop.array_element_prop = Some(props.len() - 1);
            }
            props.push(prop);
        }
    }
    Ok((
        is_end,
        SendTable {
            net_table_name,
            props,
        },
    ))
}

/// Parses the `dem_datatables` block body: the `SendTable` stream followed
/// by the server-class list, grounded on `ParseDataTable` in the
/// reference C++ dumper.
pub fn parse_data_tables_block(data: &[u8]) -> DemoResult<(Vec<SendTable>, Vec<ServerClassEntry>)> {
    let mut reader = BitReader::new(data);
    let mut tables = Vec::new();
    loop {
        reader.read_varint32()?; // envelope tag, unused by this reader
        let size = reader.read_varint32()?;
        if size < 0 {
            return Err(DemoError::Truncated);
        }
        let payload = reader.read_bytes(size as usize)?;
        let (is_end, table) = parse_send_table_msg(&payload)?;
        if is_end {
            break;
        }
        tables.push(table);
    }

    let num_server_classes = reader.read_ubits(16)? as u16;
    let mut classes = Vec::with_capacity(num_server_classes as usize);
    for _ in 0..num_server_classes {
        let class_id = reader.read_ubits(16)? as u16;
        let name = reader.read_string(256)?;
        let dt_name = reader.read_string(256)?;
        classes.push(ServerClassEntry {
            class_id,
            name,
            dt_name,
        });
    }
    Ok((tables, classes))
}

/// Holds every `SendTable` parsed off the wire, indexed by net-table name
/// for [`crate::flatten`]'s recursive lookups.
pub struct SendTableStore {
    by_name: HashMap<String, SendTable>,
}

impl SendTableStore {
    pub fn new(tables: Vec<SendTable>) -> Self {
        let by_name = tables
            .into_iter()
            .map(|t| (t.net_table_name.clone(), t))
            .collect();
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&SendTable> {
        self.by_name.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_type_mapping_covers_datatable_fallback() {
        assert_eq!(prop_type_from_wire(1), PropType::Float);
        assert_eq!(prop_type_from_wire(99), PropType::DataTable);
    }
}
