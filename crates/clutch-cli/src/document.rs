//! The structured-document sink: a single `{map, tickrate, servername,
//! events[], player_names, gotv_bots, mm_rank_update, player_slots}`
//! object tree written once at end-of-recording, using the same
//! `serde`+`serde_json` style as other wire-facing document types in
//! this codebase's lineage.

use std::collections::HashMap;

use clutch_events::{EventValue, MmRankUpdate, NormalizedEvent};
use serde::Serialize;
use serde_json::{Map, Value};

fn event_value_to_json(value: &EventValue) -> Value {
    match value {
        EventValue::Str(s) => Value::String(s.clone()),
        EventValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        EventValue::Long(v) => Value::from(*v),
        EventValue::Short(v) | EventValue::Byte(v) => Value::from(*v),
        EventValue::Bool(b) => Value::from(*b),
        EventValue::UInt64(v) => Value::from(*v),
        EventValue::Point(p) => Value::Array(p.iter().map(|c| Value::from(*c)).collect()),
        EventValue::Array(values) => Value::Array(values.iter().map(event_value_to_json).collect()),
    }
}

#[derive(Serialize)]
pub struct EventDocument {
    #[serde(rename = "type")]
    pub event_type: String,
    pub tick: i32,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl From<&NormalizedEvent> for EventDocument {
    fn from(event: &NormalizedEvent) -> Self {
        let mut fields = Map::new();
        for (key, value) in &event.fields {
            fields.insert(key.clone(), event_value_to_json(value));
        }
        EventDocument {
            event_type: event.event_type.clone(),
            tick: event.tick,
            fields,
        }
    }
}

#[derive(Serialize)]
pub struct MmRankUpdateDocument {
    pub num_wins: Option<i32>,
    pub rank_old: Option<i32>,
    pub rank_new: Option<i32>,
    pub rank_change: Option<i32>,
}

impl From<&MmRankUpdate> for MmRankUpdateDocument {
    fn from(u: &MmRankUpdate) -> Self {
        MmRankUpdateDocument {
            num_wins: u.num_wins,
            rank_old: u.rank_old,
            rank_new: u.rank_new,
            rank_change: u.rank_change,
        }
    }
}

#[derive(Serialize)]
pub struct PlayerExtraDocument {
    pub guid: String,
    pub friends_name: String,
    pub fake_player: bool,
}

#[derive(Serialize)]
pub struct Document {
    pub map: String,
    pub tickrate: f64,
    pub servername: String,
    pub events: Vec<EventDocument>,
    pub player_names: HashMap<u64, String>,
    pub gotv_bots: Vec<String>,
    pub mm_rank_update: HashMap<u64, MmRankUpdateDocument>,
    pub player_slots: HashMap<u64, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_player_info: Option<HashMap<u64, PlayerExtraDocument>>,
}
