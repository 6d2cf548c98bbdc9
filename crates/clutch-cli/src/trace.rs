//! Textual trace sink: one line per message and per decoded field, for
//! diff-based debugging. Each `trace_*` function is gated by the caller
//! on the matching CLI flag.

use clutch_events::NormalizedEvent;
use clutch_state::{EntityRegistry, EntityUpdate, UpdateKind};

use crate::messages::ServerInfo;

/// Prints the parsed `ServerInfo` fields directly, rather than falling
/// through into the user-message dump the reference's textual branch
/// does by (almost certainly accidental) copy-paste.
pub fn trace_server_info(info: &ServerInfo) {
    println!(
        "ServerInfo: protocol={} server_count={} map={} game_dir={} tick_interval={:.6} host={}",
        info.protocol, info.server_count, info.map_name, info.game_dir, info.tick_interval, info.host_name
    );
}

pub fn trace_data_tables(num_tables: usize, num_classes: usize) {
    println!("DataTables: {num_tables} send tables, {num_classes} server classes");
}

pub fn trace_string_table_create(name: &str, entry_count: usize) {
    println!("CreateStringTable: {name} ({entry_count} entries)");
}

pub fn trace_string_table_update(name: &str, changed: usize) {
    println!("UpdateStringTable: {name} ({changed} changed)");
}

pub fn trace_packet_entities(updates: &[EntityUpdate], registry: &EntityRegistry) {
    for update in updates {
        let kind = match update.kind {
            UpdateKind::EnterPvs => "ENTER_PVS",
            UpdateKind::LeavePvs { deleted: true } => "LEAVE_PVS+DELETE",
            UpdateKind::LeavePvs { deleted: false } => "LEAVE_PVS",
            UpdateKind::Delta => "DELTA",
            UpdateKind::Preserve => "PRESERVE",
        };
        match registry.get(update.entity_id) {
            Some(entity) => println!(
                "  entity {} {} class={} props={}",
                update.entity_id,
                kind,
                entity.class_id,
                entity.props.len()
            ),
            None => println!("  entity {} {}", update.entity_id, kind),
        }
    }
}

pub fn trace_net_message(opcode_name: &str, payload_len: usize) {
    println!("net message {opcode_name} ({payload_len} bytes)");
}

pub fn trace_event(event: &NormalizedEvent) {
    print!("[{}] {}", event.tick, event.event_type);
    for (key, value) in &event.fields {
        print!(" {key}={value:?}");
    }
    println!();
}
