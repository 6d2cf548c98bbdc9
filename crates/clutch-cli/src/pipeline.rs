//! The driver (glue): reads a [`DemoFile`], dispatches every command
//! block, and wires `clutch-proto`/`clutch-state`/`clutch-events`
//! together into either a textual trace or a [`crate::document::Document`].
//! Grounded on `CDemoFileDump::DoDump`'s top-level command switch and
//! `PrintPacket`'s per-opcode dispatch in
//! the reference C++ dumper `demofiledump.cpp`.

use std::collections::HashMap;

use clutch_core::bitreader::BitReader;
use clutch_core::demofile::{DemoCommandBody, DemoFile, DemoHeader};
use clutch_core::error::{DemoError, DemoResult};
use clutch_core::framer::for_each_frame;
use clutch_core::opcodes::{self, Opcode};
use clutch_events::{
    ClassIndices, EventDescriptor, KeyDescriptor, KeyType, MmRankUpdate, NormalizedEvent, RawGameEvent, RawKeyValue,
    Session, SessionConfig,
};
use clutch_proto::{flatten_class, SendTableStore};
use clutch_state::playerinfo::PlayerInfo;
use clutch_state::{EntityRegistry, StringTable};

use crate::cli::Cli;
use crate::document::{Document, EventDocument, MmRankUpdateDocument, PlayerExtraDocument};
use crate::messages;
use crate::trace;

/// `CCSUsrMsg_ServerRankUpdate`'s message-type tag within the
/// `CSVCMsg_UserMessage` envelope. The real enum lives in a `.proto` this
/// repo doesn't vendor; the numeric id is this repo's own internal
/// constant, matched against whatever the encoder side actually sends.
pub const CS_UM_SERVER_RANK_UPDATE: i32 = 43;

struct Tables {
    by_id: HashMap<i32, StringTable>,
}

impl Tables {
    fn new() -> Self {
        Tables { by_id: HashMap::new() }
    }
}

/// Runs the whole pipeline over one opened demo file, producing the
/// aggregated document plus (as a side effect) whatever the textual
/// trace sink prints along the way.
pub struct Pipeline<'a> {
    cli: &'a Cli,
    session: Session,
    entities: Option<EntityRegistry>,
    tables: Tables,
    /// `(class_id, field_index) -> var_name`, since `EntityRegistry` only
    /// exposes decoded values by index; the semantic layer needs the
    /// name back to recognize `m_iTeamNum`/`m_scoreTotal`/`m_bGameRestart`.
    field_names: HashMap<(u16, usize), String>,
    class_indices: ClassIndices,
    tick_interval: f64,
    map_name: String,
    servername: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        let config = session_config(cli);
        Pipeline {
            cli,
            session: Session::new(config, ClassIndices::default(), 1.0 / 64.0),
            entities: None,
            tables: Tables::new(),
            field_names: HashMap::new(),
            class_indices: ClassIndices::default(),
            tick_interval: 1.0 / 64.0,
            map_name: String::new(),
            servername: String::new(),
        }
    }

    pub fn run(mut self, data: Vec<u8>) -> DemoResult<Document> {
        let mut file = DemoFile::new(data);
        let header: DemoHeader = file.read_header()?;
        self.map_name = header.map_name.clone();

        let mut events = Vec::new();

        loop {
            let command = match file.read_command() {
                Ok(Some(c)) => c,
                Ok(None) => break,
                Err(e) if !e.is_fatal() => {
                    log::warn!("dropping malformed command block: {e}");
                    break;
                }
                Err(e) => return Err(e),
            };
            self.session.set_tick(command.tick);

            match command.body {
                DemoCommandBody::WirePacket(bytes) => {
                    if let Err(e) = self.dispatch_wire_packet(&bytes, &mut events) {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        log::warn!("dropping packet at tick {}: {e}", command.tick);
                    }
                }
                DemoCommandBody::DataTables(bytes) => {
                    self.ingest_data_tables(&bytes)?;
                }
                DemoCommandBody::StringTables(bytes) => {
                    if let Err(e) = self.ingest_initial_string_tables(&bytes) {
                        log::warn!("dropping initial string-tables block: {e}");
                    }
                }
                DemoCommandBody::Stop => break,
                DemoCommandBody::SyncTick
                | DemoCommandBody::ConsoleCmd(_)
                | DemoCommandBody::UserCmd(_, _)
                | DemoCommandBody::CustomData(_) => {}
            }
        }

        Ok(self.build_document(events))
    }

    fn ingest_data_tables(&mut self, bytes: &[u8]) -> DemoResult<()> {
        let (tables, classes) = clutch_proto::parse_data_tables_block(bytes)?;
        let num_tables = tables.len();
        let store = SendTableStore::new(tables);
        let mut registry = EntityRegistry::new(classes.len());

        for class in &classes {
            let flattened = flatten_class(&store, class)?;
            if class.dt_name == "DT_CSPlayer" {
                self.class_indices.player_class_id = class.class_id;
                for (i, prop) in flattened.props.iter().enumerate() {
                    if prop.var_name == "m_vecOrigin" {
                        self.class_indices.player_origin_xy_index = i;
                    } else if prop.var_name == "m_vecOrigin[2]" {
                        self.class_indices.player_origin_z_index = i;
                    }
                }
            } else if class.dt_name == "DT_CSTeam" {
                self.class_indices.team_class_id = class.class_id;
            } else if class.dt_name == "DT_CSGameRulesProxy" {
                self.class_indices.gamerules_class_id = class.class_id;
            }

            for (i, prop) in flattened.props.iter().enumerate() {
                self.field_names.insert((class.class_id, i), prop.var_name.clone());
            }
            registry.register_class(flattened);
        }

        if self.cli.data_tables {
            trace::trace_data_tables(num_tables, classes.len());
        }

        self.entities = Some(registry);
        self.session = Session::new(session_config(self.cli), self.class_indices, self.tick_interval);
        Ok(())
    }

    /// Mirrors `DumpStringTables`/`DumpStringTable`: a byte-oriented
    /// snapshot of every table's initial contents, distinct from the
    /// bit-packed `CreateStringTable`/`UpdateStringTable` wire messages
    /// that follow once the recording is live.
    fn ingest_initial_string_tables(&mut self, bytes: &[u8]) -> DemoResult<()> {
        let mut r = BitReader::new(bytes);
        let num_tables = r.read_ubits(8)?;
        for _ in 0..num_tables {
            let table_name = r.read_string(256)?;
            let is_userinfo = table_name == "userinfo";
            let num_strings = r.read_ubits(16)?;
            for i in 0..num_strings {
                let _string_name = r.read_string(4096)?;
                if r.read_bit()? == 1 {
                    let user_data_size = r.read_ubits(16)? as usize;
                    let data = r.read_bytes(user_data_size)?;
                    if is_userinfo {
                        match PlayerInfo::from_bytes(&data) {
                            Ok(info) => self.session.ingest_player_info(i as usize, info),
                            Err(e) => log::warn!("bad player-info record at entry {i}: {e}"),
                        }
                    }
                }
            }
            if r.read_bit()? == 1 {
                let client_strings = r.read_ubits(16)?;
                for _ in 0..client_strings {
                    let _ = r.read_string(4096)?;
                    if r.read_bit()? == 1 {
                        let len = r.read_ubits(16)? as usize;
                        let _ = r.read_bytes(len)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn dispatch_wire_packet(&mut self, bytes: &[u8], events: &mut Vec<EventDocument>) -> DemoResult<()> {
        for_each_frame(bytes, |frame| {
            if self.cli.net_messages {
                trace::trace_net_message(opcodes::opcode_name(frame.opcode), frame.payload.len());
            }
            self.dispatch_opcode(frame.opcode, frame.payload, events)
        })
    }

    fn dispatch_opcode(&mut self, opcode: Opcode, payload: &[u8], events: &mut Vec<EventDocument>) -> DemoResult<()> {
        match opcode {
            opcodes::SVC_SERVER_INFO => {
                let info = messages::parse_server_info(payload)?;
                self.tick_interval = info.tick_interval as f64;
                self.servername = info.host_name.clone();
                if self.map_name.is_empty() {
                    self.map_name = info.map_name.clone();
                }
                if self.cli.net_messages {
                    trace::trace_server_info(&info);
                }
            }
            opcodes::SVC_CREATE_STRING_TABLE => self.handle_create_string_table(payload)?,
            opcodes::SVC_UPDATE_STRING_TABLE => self.handle_update_string_table(payload)?,
            opcodes::SVC_PACKET_ENTITIES => self.handle_packet_entities(payload, events)?,
            opcodes::SVC_USER_MESSAGE => self.handle_user_message(payload)?,
            opcodes::SVC_GAME_EVENT_LIST => self.handle_game_event_list(payload)?,
            opcodes::SVC_GAME_EVENT => self.handle_game_event(payload, events)?,
            _ => {}
        }
        Ok(())
    }

    fn handle_create_string_table(&mut self, payload: &[u8]) -> DemoResult<()> {
        let msg = messages::parse_create_string_table(payload)?;
        let mut table = StringTable::create(
            msg.name.clone(),
            msg.max_entries,
            msg.user_data_size.max(0) as usize,
            msg.user_data_size_bits.max(0) as u32,
            msg.user_data_fixed_size,
        );
        let mut reader = BitReader::new(&msg.string_data);
        let entries = table.apply_create(&mut reader, msg.num_entries)?;
        let is_userinfo = table.is_userinfo;

        if is_userinfo {
            for entry in &entries {
                if let Some(info) = clutch_state::stringtable::player_info_from_entry(entry)? {
                    self.session.ingest_player_info(entry.index as usize, info);
                }
            }
        }

        if self.cli.string_tables {
            trace::trace_string_table_create(&msg.name, entries.len());
        }
        let table_id = self.tables.by_id.len() as i32;
        self.tables.by_id.insert(table_id, table);
        Ok(())
    }

    fn handle_update_string_table(&mut self, payload: &[u8]) -> DemoResult<()> {
        let msg = messages::parse_update_string_table(payload)?;
        let table = self.tables.by_id.get_mut(&msg.table_id).ok_or(DemoError::PropertyDecodeError {
            class_id: 0,
            field_index: msg.table_id,
        })?;
        let mut reader = BitReader::new(&msg.string_data);
        let entries = table.apply_update(&mut reader, msg.num_changed_entries)?;
        let is_userinfo = table.is_userinfo;
        let name = table.name.clone();

        if is_userinfo {
            for entry in &entries {
                if let Some(info) = clutch_state::stringtable::player_info_from_entry(entry)? {
                    self.session.ingest_player_info(entry.index as usize, info);
                }
            }
        }

        if self.cli.string_tables {
            trace::trace_string_table_update(&name, entries.len());
        }
        Ok(())
    }

    fn handle_packet_entities(&mut self, payload: &[u8], out: &mut Vec<EventDocument>) -> DemoResult<()> {
        let msg = messages::parse_packet_entities(payload)?;
        let registry = self.entities.as_mut().ok_or(DemoError::PropertyDecodeError {
            class_id: 0,
            field_index: -1,
        })?;
        let mut reader = BitReader::new(&msg.entity_data);
        let updates = registry.apply_packet_entities(&mut reader, msg.updated_entries, msg.is_delta)?;

        let mut synthesized = Vec::new();
        for update in &updates {
            let Some(entity) = registry.get(update.entity_id) else {
                continue;
            };
            if entity.class_id != self.class_indices.team_class_id
                && entity.class_id != self.class_indices.gamerules_class_id
            {
                continue;
            }
            for (&field_index, value) in &entity.props {
                let Some(name) = self.field_names.get(&(entity.class_id, field_index)) else {
                    continue;
                };
                if let Some(event) = self.session.observe_entity_prop(update.entity_id, entity.class_id, name, value) {
                    synthesized.push(event);
                }
            }
        }

        if self.cli.packet_entities {
            trace::trace_packet_entities(&updates, registry);
        }

        for event in synthesized {
            route_synthetic_event(self.cli, &event, out);
        }
        Ok(())
    }

    fn handle_user_message(&mut self, payload: &[u8]) -> DemoResult<()> {
        let msg = messages::parse_user_message(payload)?;
        if msg.msg_type == CS_UM_SERVER_RANK_UPDATE {
            for entry in messages::parse_server_rank_update(&msg.data)? {
                self.session.ingest_rank_update(
                    entry.account_id,
                    MmRankUpdate {
                        num_wins: entry.num_wins,
                        rank_old: entry.rank_old,
                        rank_new: entry.rank_new,
                        rank_change: entry.rank_change,
                    },
                );
            }
        }
        Ok(())
    }

    fn handle_game_event_list(&mut self, payload: &[u8]) -> DemoResult<()> {
        for descriptor in messages::parse_game_event_list(payload)? {
            let keys = descriptor
                .keys
                .into_iter()
                .map(|(name, ty)| KeyDescriptor {
                    name,
                    key_type: key_type_from_wire(ty),
                })
                .collect();
            self.session.register_event_descriptor(EventDescriptor {
                event_id: descriptor.event_id,
                name: descriptor.name,
                keys,
            });
        }
        Ok(())
    }

    fn handle_game_event(&mut self, payload: &[u8], out: &mut Vec<EventDocument>) -> DemoResult<()> {
        let msg = messages::parse_game_event(payload)?;
        let Some(descriptor) = self.session.event_descriptor(msg.event_id).cloned() else {
            return Ok(());
        };
        let raw = RawGameEvent {
            event_id: msg.event_id,
            keys: msg.keys.into_iter().map(raw_key_value).collect(),
        };
        let normalized = self.session.handle_game_event(&descriptor, &raw, self.entities.as_ref());
        for event in &normalized {
            route_event(self.cli, event, out);
        }
        Ok(())
    }

    fn build_document(self, events: Vec<EventDocument>) -> Document {
        let extra_player_info = self.cli.extra_player_info.then(|| {
            self.session
                .player_records()
                .map(|p| {
                    (
                        p.xuid,
                        PlayerExtraDocument {
                            guid: p.guid.clone(),
                            friends_name: p.friends_name.clone(),
                            fake_player: p.fake_player,
                        },
                    )
                })
                .collect()
        });

        Document {
            map: self.map_name,
            tickrate: if self.tick_interval > 0.0 { 1.0 / self.tick_interval } else { 0.0 },
            servername: self.servername,
            events,
            player_names: self.session.player_names.clone(),
            gotv_bots: self.session.gotv_bots(),
            mm_rank_update: self
                .session
                .mm_rank_update
                .iter()
                .map(|(xuid, u)| (*xuid, MmRankUpdateDocument::from(u)))
                .collect(),
            player_slots: self.session.player_slot.clone(),
            extra_player_info,
        }
    }
}

fn session_config(cli: &Cli) -> SessionConfig {
    SessionConfig {
        only_hsbox_events: cli.only_hsbox_events,
        suppress_footstep_events: cli.suppress_footstep_events,
        suppress_warmup_deaths: cli.suppress_warmup_deaths,
    }
}

/// Either prints the event to the textual trace (gated on `--game-events`
/// / `--deaths`) or collects it for the JSON document, depending on
/// output mode; never both, matching the reference's single-sink dump.
fn route_event(cli: &Cli, event: &NormalizedEvent, out: &mut Vec<EventDocument>) {
    let wanted = cli.game_events || (cli.deaths && event.event_type == "player_death");
    if !wanted {
        return;
    }
    if cli.wants_json() {
        out.push(EventDocument::from(event));
    } else {
        trace::trace_event(event);
    }
}

/// Routes a synthesized `score_changed`/`game_restart` event
/// (`Session::observe_entity_prop` only ever produces one when
/// `--only-hsbox-events` is set). These are pushed unconditionally on
/// `--game-events`/`--deaths`, matching the reference's own gate on
/// `g_bOnlyHsBoxEvents` alone for these two synthetic events.
fn route_synthetic_event(cli: &Cli, event: &NormalizedEvent, out: &mut Vec<EventDocument>) {
    if cli.wants_json() {
        out.push(EventDocument::from(event));
    } else {
        trace::trace_event(event);
    }
}

fn key_type_from_wire(ty: messages::WireKeyType) -> KeyType {
    match ty {
        messages::WireKeyType::String => KeyType::String,
        messages::WireKeyType::Float => KeyType::Float,
        messages::WireKeyType::Long => KeyType::Long,
        messages::WireKeyType::Short => KeyType::Short,
        messages::WireKeyType::Byte => KeyType::Byte,
        messages::WireKeyType::Bool => KeyType::Bool,
        messages::WireKeyType::UInt64 => KeyType::UInt64,
    }
}

fn raw_key_value(key: messages::GameEventKeyWire) -> RawKeyValue {
    if let Some(s) = key.val_string {
        RawKeyValue::Str(s)
    } else if let Some(f) = key.val_float {
        RawKeyValue::Float(f)
    } else if let Some(v) = key.val_long {
        RawKeyValue::Long(v)
    } else if let Some(v) = key.val_short {
        RawKeyValue::Short(v)
    } else if let Some(v) = key.val_byte {
        RawKeyValue::Byte(v)
    } else if let Some(b) = key.val_bool {
        RawKeyValue::Bool(b)
    } else if let Some(v) = key.val_uint64 {
        RawKeyValue::UInt64(v)
    } else {
        RawKeyValue::Long(0)
    }
}
