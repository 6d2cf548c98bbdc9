//! Game-event binder: resolves numeric `event_id` against the
//! `GameEventList` descriptor table and produces a normalized event with
//! typed key/value pairs in descriptor order. Grounded on
//! `GetGameEventDescriptor`/`ParseGameEvent` in
//! the reference C++ dumper `demofiledump.cpp`.

use std::collections::HashMap;

/// The value kinds a game-event key can carry.
#[derive(Clone, Debug, PartialEq)]
pub enum EventValue {
    Str(String),
    Float(f64),
    Long(i64),
    Short(i32),
    Byte(i32),
    Bool(bool),
    UInt64(u64),
    /// A `[x, y, z]` world position, used for `attacker_pos`/`victim_pos`.
    Point([i64; 3]),
    Array(Vec<EventValue>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    String,
    Float,
    Long,
    Short,
    Byte,
    Bool,
    UInt64,
}

#[derive(Clone, Debug)]
pub struct KeyDescriptor {
    pub name: String,
    pub key_type: KeyType,
}

#[derive(Clone, Debug)]
pub struct EventDescriptor {
    pub event_id: i32,
    pub name: String,
    pub keys: Vec<KeyDescriptor>,
}

/// The raw key value as it arrives on the wire, before the descriptor's
/// key name is joined in.
#[derive(Clone, Debug)]
pub enum RawKeyValue {
    Str(String),
    Float(f32),
    Long(i32),
    Short(i32),
    Byte(i32),
    Bool(bool),
    UInt64(u64),
}

impl RawKeyValue {
    /// Widens a raw wire value into the normalized-event value type,
    /// for keys that don't need player-info substitution.
    pub fn as_plain_value(&self) -> EventValue {
        match self {
            RawKeyValue::Str(s) => EventValue::Str(s.clone()),
            RawKeyValue::Float(f) => EventValue::Float(*f as f64),
            RawKeyValue::Long(v) => EventValue::Long(*v as i64),
            RawKeyValue::Short(v) => EventValue::Short(*v),
            RawKeyValue::Byte(v) => EventValue::Byte(*v),
            RawKeyValue::Bool(v) => EventValue::Bool(*v),
            RawKeyValue::UInt64(v) => EventValue::UInt64(*v),
        }
    }

    /// The short/long integer form, used to resolve a player key against
    /// the player-info registry (`userid`/`attacker`/`assister` are
    /// always carried as `val_short`).
    pub fn as_user_id(&self) -> Option<i32> {
        match self {
            RawKeyValue::Short(v) | RawKeyValue::Long(v) | RawKeyValue::Byte(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RawGameEvent {
    pub event_id: i32,
    pub keys: Vec<RawKeyValue>,
}

#[derive(Default)]
pub struct GameEventTable {
    descriptors: HashMap<i32, EventDescriptor>,
}

impl GameEventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: EventDescriptor) {
        self.descriptors.insert(descriptor.event_id, descriptor);
    }

    pub fn get(&self, event_id: i32) -> Option<&EventDescriptor> {
        self.descriptors.get(&event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_id_is_skipped() {
        let table = GameEventTable::new();
        assert!(table.get(7).is_none());
    }

    #[test]
    fn registers_and_resolves_by_id() {
        let mut table = GameEventTable::new();
        table.register(EventDescriptor {
            event_id: 1,
            name: "player_jump".into(),
            keys: vec![KeyDescriptor {
                name: "userid".into(),
                key_type: KeyType::Short,
            }],
        });
        let descriptor = table.get(1).unwrap();
        assert_eq!(descriptor.name, "player_jump");
        assert_eq!(descriptor.keys[0].name, "userid");
    }
}
