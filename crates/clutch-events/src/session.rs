//! The semantic layer: owns every piece of derived state the
//! reference keeps as top-level mutables (`teams`, `jumped_last`,
//! `smokes`, `bot_takeover`, `score_snapshot`, `s_PlayerInfos`) and
//! threads it explicitly through a `Session` instead of any global
//! mutable state. Grounded on `addEvent`, `updateTeamScore`,
//! `handleTeamProp`, `HandlePlayerConnectDisconnectEvents`, and
//! `ShowPlayerInfo` in the reference C++ dumper `demofiledump.cpp`.

use std::collections::HashMap;

use clutch_proto::value::DecodedValue;
use clutch_state::entity::EntityRegistry;
use clutch_state::playerinfo::PlayerInfo;

use crate::descriptor::{EventValue, GameEventTable, KeyDescriptor, RawGameEvent, RawKeyValue};
use crate::geometry::{occluding_smokes, Point};
pub use crate::descriptor::EventDescriptor;

const JUMP_DURATION_SECONDS: f64 = 0.75;

const HSBOX_EVENTS: &[&str] = &[
    "player_death",
    "round_start",
    "round_end",
    "player_spawn",
    "game_restart",
    "score_changed",
    "player_hurt",
    "bomb_defused",
    "player_disconnected",
    "round_officially_ended",
];

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionConfig {
    pub only_hsbox_events: bool,
    pub suppress_footstep_events: bool,
    pub suppress_warmup_deaths: bool,
}

/// Class ids and flattened field indices cached once the data-tables
/// block has been parsed and flattened, so later per-tick work can
/// recognize the player/team/gamerules classes by id instead of by name.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassIndices {
    pub player_class_id: u16,
    pub team_class_id: u16,
    pub gamerules_class_id: u16,
    pub player_origin_xy_index: usize,
    pub player_origin_z_index: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct Team {
    total_score: i32,
}

/// One matchmaking rank-update record (`CCSUsrMsg_ServerRankUpdate`'s
/// `rank_update_data`), keyed by xuid in [`Session::mm_rank_update`].
/// Grounded on `PrintUserMessage<CCSUsrMsg_ServerRankUpdate,...>` in
/// the reference C++ dumper `demofiledump.cpp`, which only records
/// these when `g_bOnlyHsBoxEvents` is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmRankUpdate {
    pub num_wins: Option<i32>,
    pub rank_old: Option<i32>,
    pub rank_new: Option<i32>,
    pub rank_change: Option<i32>,
}

pub struct NormalizedEvent {
    pub event_type: String,
    pub tick: i32,
    pub fields: Vec<(String, EventValue)>,
}

impl NormalizedEvent {
    fn new(event_type: impl Into<String>, tick: i32) -> Self {
        NormalizedEvent {
            event_type: event_type.into(),
            tick,
            fields: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&EventValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: EventValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key.to_string(), value));
        }
    }
}

fn point_value(p: Point) -> EventValue {
    EventValue::Point([p.x as i64, p.y as i64, p.z as i64])
}

/// `guid2xuid` from the reference: `2 * tail_digits + 76561197960265728 +
/// (guid[8] == '1')`, where `guid` is a Steam2-style id
/// `STEAM_X:Y:Z`-ish string whose 9th byte flags the low account bit.
fn guid2xuid(guid: &str) -> u64 {
    let bytes = guid.as_bytes();
    if bytes.len() <= 10 {
        return 0;
    }
    let tail: i64 = std::str::from_utf8(&bytes[10..])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let low_bit = if bytes.get(8) == Some(&b'1') { 1 } else { 0 };
    (2 * tail) as u64 + 76_561_197_960_265_728 + low_bit
}

/// Owns every mutable sub-registry the pipeline needs across the whole
/// recording, and resolves/normalizes game events against it.
pub struct Session {
    config: SessionConfig,
    class_indices: ClassIndices,
    tick_interval: f64,
    current_tick: i32,
    match_started: bool,

    event_table: GameEventTable,

    player_infos: Vec<PlayerInfo>,
    userid_info: HashMap<i32, PlayerInfo>,
    pub player_names: HashMap<u64, String>,
    pub player_slot: HashMap<u64, usize>,

    teams: [Team; 4],
    id2teamno: HashMap<i32, u8>,
    score_snapshot: (i32, i32),

    jumped_last: HashMap<u64, i32>,
    smokes: HashMap<i32, Point>,
    bot_takeover: HashMap<u64, i32>,
    pub mm_rank_update: HashMap<u64, MmRankUpdate>,
}

impl Session {
    pub fn new(config: SessionConfig, class_indices: ClassIndices, tick_interval: f64) -> Self {
        Session {
            config,
            class_indices,
            tick_interval,
            current_tick: 0,
            match_started: false,
            event_table: GameEventTable::new(),
            player_infos: Vec::new(),
            userid_info: HashMap::new(),
            player_names: HashMap::new(),
            player_slot: HashMap::new(),
            teams: [Team::default(); 4],
            id2teamno: HashMap::new(),
            score_snapshot: (0, 0),
            jumped_last: HashMap::new(),
            smokes: HashMap::new(),
            bot_takeover: HashMap::new(),
            mm_rank_update: HashMap::new(),
        }
    }

    /// Records one `rank_update` entry from a `ServerRankUpdate` user
    /// message. `account_id` is widened to an xuid the same way the
    /// reference does: `76561197960265728 + account_id`. Only recorded
    /// under `--only-hsbox-events`, per the reference's gate.
    pub fn ingest_rank_update(&mut self, account_id: u32, update: MmRankUpdate) {
        if !self.config.only_hsbox_events {
            return;
        }
        let xuid = 76_561_197_960_265_728u64 + account_id as u64;
        self.mm_rank_update.insert(xuid, update);
    }

    pub fn set_tick(&mut self, tick: i32) {
        self.current_tick = tick;
    }

    pub fn register_event_descriptor(&mut self, descriptor: EventDescriptor) {
        self.event_table.register(descriptor);
    }

    pub fn event_descriptor(&self, event_id: i32) -> Option<&EventDescriptor> {
        self.event_table.get(event_id)
    }

    /// Every known player record — the `--extra-player-info` CLI flag
    /// surfaces `guid`/`friends_name`/`fake_player` off this for the
    /// structured document's `extra_player_info` map.
    pub fn player_records(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.userid_info.values()
    }

    /// Names of every `userid_info` record with `is_hltv` set, mirroring
    /// the reference's `gotv_bots` assembly (a scan over `userid_info`,
    /// not `fake_player`: GOTV relay slots are HLTV connections, not bots).
    pub fn gotv_bots(&self) -> Vec<String> {
        self.userid_info
            .values()
            .filter(|p| p.is_hltv)
            .map(|p| p.name.clone())
            .collect()
    }

    fn find_player_info(&self, user_id: i32) -> Option<&PlayerInfo> {
        self.player_infos
            .iter()
            .find(|p| p.user_id == user_id)
            .or_else(|| self.userid_info.get(&user_id))
    }

    /// Mirrors `addUserId`: joins a player record into the canonical
    /// vector, records its display name (unless bot/HLTV), and records
    /// its slot index by scanning for the matching `user_id`.
    fn add_user_id(&mut self, info: PlayerInfo) {
        self.userid_info.insert(info.user_id, info.clone());
        if !info.fake_player && !info.is_hltv {
            self.player_names.insert(info.xuid, info.name.clone());
        }
        if !info.fake_player {
            if let Some(slot) = self.player_infos.iter().position(|p| p.user_id == info.user_id) {
                self.player_slot.insert(info.xuid, slot);
            }
        }
    }

    /// Applies one decoded `userinfo` string-table entry, keyed by the
    /// table's dense entry index.
    pub fn ingest_player_info(&mut self, dense_index: usize, info: PlayerInfo) {
        self.add_user_id(info.clone());
        if dense_index < self.player_infos.len() {
            self.player_infos[dense_index] = info;
        } else {
            self.player_infos.resize(dense_index, PlayerInfo::default());
            self.player_infos.push(info);
        }
    }

    fn player_entity_id(&self, user_id: i32) -> Option<i32> {
        self.player_infos
            .iter()
            .position(|p| p.user_id == user_id)
            .map(|i| i as i32 + 1)
    }

    fn player_position(&self, user_id: i32, entities: &EntityRegistry) -> Option<Point> {
        let eid = self.player_entity_id(user_id)?;
        let entity = entities.get(eid)?;
        let (x, y) = entity.get(self.class_indices.player_origin_xy_index)?.as_xy()?;
        let z = entity.get(self.class_indices.player_origin_z_index)?.as_f32()?;
        Some(Point::new(x as f64, y as f64, z as f64))
    }

    /// Mirrors `HandlePlayerConnectDisconnectEvents`: handled here rather
    /// than through the generic key loop, since `player_connect`/
    /// `player_disconnect` drive player-registry membership (this is the
    /// only path bots ever join through; humans normally arrive via the
    /// `userinfo` string table and this just mirrors them).
    fn handle_connect_disconnect(
        &mut self,
        descriptor_name: &str,
        keys: &[(KeyDescriptor, RawKeyValue)],
    ) -> Option<Vec<NormalizedEvent>> {
        let is_disconnect = descriptor_name == "player_disconnect";
        if descriptor_name != "player_connect" && !is_disconnect {
            return None;
        }

        let mut userid = -1i32;
        let mut index: Option<usize> = None;
        let mut name = String::new();
        let mut is_bot = false;
        let mut guid = String::new();
        let mut reason: Option<String> = None;

        for (key, value) in keys {
            match key.name.as_str() {
                "userid" => userid = value.as_user_id().unwrap_or(-1),
                "index" => index = value.as_user_id().map(|v| v as usize),
                "name" => {
                    if let RawKeyValue::Str(s) = value {
                        name = s.clone();
                    }
                }
                "networkid" => {
                    if let RawKeyValue::Str(s) = value {
                        guid = s.clone();
                        is_bot = is_bot || s == "BOT";
                    }
                }
                "bot" => {
                    if let RawKeyValue::Bool(b) = value {
                        is_bot = *b;
                    }
                }
                "reason" => {
                    if let RawKeyValue::Str(s) = value {
                        reason = Some(s.clone());
                    }
                }
                _ => {}
            }
        }

        if is_disconnect {
            let xuid = self.find_player_info(userid).map(|p| p.xuid).unwrap_or(userid as u64);
            if let Some(slot) = self.player_infos.iter_mut().find(|p| p.user_id == userid) {
                slot.name = "disconnected".to_string();
                slot.user_id = -1;
                slot.guid.clear();
            }
            let mut event = NormalizedEvent::new("player_disconnected", self.current_tick);
            event.set("name", EventValue::Str(name));
            event.set("userid", EventValue::UInt64(xuid));
            if let Some(r) = reason {
                event.set("reason", EventValue::Str(r));
            }
            return Some(vec![event]);
        }

        let xuid = if is_bot { 0 } else { guid2xuid(&guid) };
        let mut new_player = PlayerInfo {
            xuid,
            name: name.clone(),
            user_id: userid,
            guid: if is_bot { "BOT".to_string() } else { guid.clone() },
            ..Default::default()
        };
        new_player.fake_player = is_bot;

        self.add_user_id(new_player.clone());

        let mut events = Vec::new();
        match index {
            Some(idx) if idx < self.player_infos.len() => {
                if self.player_infos[idx].user_id != userid && self.player_infos[idx].name != name {
                    self.player_infos[idx] = new_player;
                }
            }
            _ => {
                let mut event = NormalizedEvent::new("connect", self.current_tick);
                event.set("name", EventValue::Str(name));
                event.set("steamid", EventValue::Str(new_player.guid.clone()));
                event.set("userid", EventValue::Long(userid as i64));
                events.push(event);
                self.player_infos.push(new_player);
            }
        }
        Some(events)
    }

    fn substitute_player_field(&self, event: &mut NormalizedEvent, field: &str, raw_user_id: i32) {
        let Some(info) = self.find_player_info(raw_user_id) else {
            return;
        };
        if info.fake_player {
            event.set(field, EventValue::Long(raw_user_id as i64));
            return;
        }
        let is_assister_on_death = event.event_type == "player_death" && field == "assister";
        let takeover_applies = self.bot_takeover.contains_key(&info.xuid)
            && event.event_type != "bot_takeover"
            && event.event_type != "player_spawn"
            && !is_assister_on_death;
        if takeover_applies {
            event.set(field, EventValue::Long(self.bot_takeover[&info.xuid] as i64));
        } else {
            event.set(field, EventValue::UInt64(info.xuid));
        }
    }

    fn apply_team_score(&mut self, entity_id: i32, val: i32) -> Option<NormalizedEvent> {
        let teamno = *self.id2teamno.get(&entity_id)?;
        if val < self.score_snapshot.0.max(self.score_snapshot.1) {
            return None;
        }
        let team = &mut self.teams[teamno as usize];
        if team.total_score == val {
            return None;
        }
        team.total_score = val;
        if !self.config.only_hsbox_events {
            return None;
        }
        let mut event = NormalizedEvent::new("score_changed", self.current_tick);
        event.set(
            "score",
            EventValue::Array(vec![
                EventValue::Long(self.teams[2].total_score as i64),
                EventValue::Long(self.teams[3].total_score as i64),
            ]),
        );
        Some(event)
    }

    /// Called by the driver whenever it decodes a property on an entity
    /// of interest, to synthesize `score_changed`/`game_restart` events
    /// from raw prop writes. Named by the flattened descriptor's
    /// `var_name` rather than field index so this stays decoupled from
    /// any one class's flattening.
    pub fn observe_entity_prop(
        &mut self,
        entity_id: i32,
        class_id: u16,
        field_name: &str,
        value: &DecodedValue,
    ) -> Option<NormalizedEvent> {
        if class_id == self.class_indices.team_class_id {
            match field_name {
                "m_iTeamNum" => {
                    let v = value.as_i32()?;
                    if v == 2 || v == 3 {
                        self.id2teamno.insert(entity_id, v as u8);
                    }
                    None
                }
                "m_scoreTotal" => self.apply_team_score(entity_id, value.as_i32()?),
                _ => None,
            }
        } else if class_id == self.class_indices.gamerules_class_id && field_name == "m_bGameRestart" {
            if value.as_i32().unwrap_or(0) != 0 {
                Some(NormalizedEvent::new("game_restart", self.current_tick))
            } else {
                None
            }
        } else {
            None
        }
    }

    fn apply_derived_state(&mut self, event: &NormalizedEvent) {
        match event.event_type.as_str() {
            "round_start" => {
                self.score_snapshot = (self.teams[2].total_score, self.teams[3].total_score);
                self.bot_takeover.clear();
                self.smokes.clear();
            }
            "player_jump" => {
                if let Some(xuid) = as_xuid(event.get("userid")) {
                    self.jumped_last.insert(xuid, event.tick);
                }
            }
            "bot_takeover" => {
                if let (Some(xuid), Some(bot)) = (as_xuid(event.get("userid")), as_i64(event.get("botid"))) {
                    self.bot_takeover.insert(xuid, bot as i32);
                }
            }
            "smokegrenade_detonate" => {
                if let (Some(eid), Some(x), Some(y), Some(z)) = (
                    as_i64(event.get("entityid")),
                    as_f64(event.get("x")),
                    as_f64(event.get("y")),
                    as_f64(event.get("z")),
                ) {
                    self.smokes.insert(eid as i32, Point::new(x, y, z));
                }
            }
            "smokegrenade_expired" => {
                if let Some(eid) = as_i64(event.get("entityid")) {
                    self.smokes.remove(&(eid as i32));
                }
            }
            _ => {}
        }
    }

    /// Resolves and normalizes one raw game event, applying player-info
    /// enrichment, derived-state bookkeeping, and the hsbox/footstep/
    /// warmup filters. `entities` is needed only for `player_death`'s
    /// position/smoke attachment; pass `None` when unavailable and that
    /// enrichment is simply skipped.
    pub fn handle_game_event(
        &mut self,
        descriptor: &EventDescriptor,
        raw: &RawGameEvent,
        entities: Option<&EntityRegistry>,
    ) -> Vec<NormalizedEvent> {
        if descriptor.name == "player_footstep" && self.config.suppress_footstep_events {
            return vec![];
        }

        let paired: Vec<(KeyDescriptor, RawKeyValue)> = descriptor
            .keys
            .iter()
            .cloned()
            .zip(raw.keys.iter().cloned())
            .collect();

        if let Some(events) = self.handle_connect_disconnect(&descriptor.name, &paired) {
            return events;
        }

        let mut event = NormalizedEvent::new(descriptor.name.clone(), self.current_tick);
        let mut dead_user_id = -1i32;
        let mut killer_user_id = -1i32;

        for (key, value) in &paired {
            match key.name.as_str() {
                "userid" | "attacker" | "assister" => {
                    let raw_id = value.as_user_id().unwrap_or(-1);
                    if descriptor.name == "player_death" {
                        if key.name == "userid" {
                            dead_user_id = raw_id;
                        } else if key.name == "attacker" {
                            killer_user_id = raw_id;
                        }
                    }
                    self.substitute_player_field(&mut event, &key.name, raw_id);
                }
                _ => {
                    event.set(&key.name, value.as_plain_value());
                }
            }
        }

        if descriptor.name == "round_announce_match_start" {
            self.match_started = true;
        }

        if descriptor.name == "player_death" {
            if let Some(entities) = entities {
                if let (Some(killer_pos), Some(victim_pos)) = (
                    self.player_position(killer_user_id, entities),
                    self.player_position(dead_user_id, entities),
                ) {
                    event.set("attacker_pos", point_value(killer_pos));
                    event.set("victim_pos", point_value(victim_pos));
                    let smokes: Vec<Point> = self.smokes.values().copied().collect();
                    let occluded = occluding_smokes(killer_pos, victim_pos, &smokes);
                    if !occluded.is_empty() {
                        event.set(
                            "smoke",
                            EventValue::Array(occluded.into_iter().map(point_value).collect()),
                        );
                    }
                }
            }
            if let Some(attacker_xuid) = as_xuid(event.get("attacker")) {
                if let Some(&jump_tick) = self.jumped_last.get(&attacker_xuid) {
                    let window = if self.tick_interval > 0.0 {
                        JUMP_DURATION_SECONDS / self.tick_interval
                    } else {
                        0.0
                    };
                    if (jump_tick as f64) >= self.current_tick as f64 - window {
                        event.set("jump", EventValue::Long((self.current_tick - jump_tick) as i64));
                    }
                }
            }

            if self.config.suppress_warmup_deaths && !self.match_started {
                return vec![];
            }
        }

        self.apply_derived_state(&event);

        if self.config.only_hsbox_events && !HSBOX_EVENTS.contains(&event.event_type.as_str()) {
            return vec![];
        }

        vec![event]
    }
}

fn as_xuid(value: Option<&EventValue>) -> Option<u64> {
    match value {
        Some(EventValue::UInt64(v)) => Some(*v),
        Some(EventValue::Long(v)) => Some(*v as u64),
        _ => None,
    }
}

fn as_i64(value: Option<&EventValue>) -> Option<i64> {
    match value {
        Some(EventValue::Long(v)) => Some(*v),
        Some(EventValue::Short(v)) | Some(EventValue::Byte(v)) => Some(*v as i64),
        Some(EventValue::UInt64(v)) => Some(*v as i64),
        _ => None,
    }
}

fn as_f64(value: Option<&EventValue>) -> Option<f64> {
    match value {
        Some(EventValue::Float(v)) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::KeyType;

    fn session() -> Session {
        Session::new(SessionConfig::default(), ClassIndices::default(), 1.0 / 64.0)
    }

    #[test]
    fn jump_then_death_is_attributed() {
        let mut s = session();
        s.set_tick(1000);
        let jump_descriptor = EventDescriptor {
            event_id: 1,
            name: "player_jump".into(),
            keys: vec![KeyDescriptor {
                name: "userid".into(),
                key_type: KeyType::Short,
            }],
        };
        s.register_event_descriptor(jump_descriptor.clone());
        let bot = PlayerInfo {
            xuid: 999,
            user_id: 1,
            ..Default::default()
        };
        s.ingest_player_info(0, bot);
        let jump_raw = RawGameEvent {
            event_id: 1,
            keys: vec![RawKeyValue::Short(1)],
        };
        let events = s.handle_game_event(&jump_descriptor, &jump_raw, None);
        assert_eq!(events.len(), 1);

        s.set_tick(1010);
        let death_descriptor = EventDescriptor {
            event_id: 2,
            name: "player_death".into(),
            keys: vec![
                KeyDescriptor {
                    name: "userid".into(),
                    key_type: KeyType::Short,
                },
                KeyDescriptor {
                    name: "attacker".into(),
                    key_type: KeyType::Short,
                },
            ],
        };
        s.register_event_descriptor(death_descriptor.clone());
        let death_raw = RawGameEvent {
            event_id: 2,
            keys: vec![RawKeyValue::Short(2), RawKeyValue::Short(1)],
        };
        let events = s.handle_game_event(&death_descriptor, &death_raw, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("jump"), Some(&EventValue::Long(10)));
    }

    #[test]
    fn score_regression_at_round_start_is_dropped() {
        let mut s = session();
        s.config.only_hsbox_events = true;
        s.id2teamno.insert(5, 2);
        s.teams[2].total_score = 15;
        s.teams[3].total_score = 8;
        s.score_snapshot = (15, 8);
        assert!(s.apply_team_score(5, 0).is_none());
    }

    #[test]
    fn bot_takeover_redirects_attacker_credit() {
        let mut s = session();
        let human = PlayerInfo {
            xuid: 42,
            user_id: 7,
            fake_player: false,
            ..Default::default()
        };
        s.ingest_player_info(0, human);
        s.bot_takeover.insert(42, 10);
        let mut event = NormalizedEvent::new("player_death", 100);
        s.substitute_player_field(&mut event, "attacker", 7);
        assert_eq!(event.get("attacker"), Some(&EventValue::Long(10)));
    }
}
