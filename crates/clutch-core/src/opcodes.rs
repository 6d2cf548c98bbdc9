//! NET_*/SVC_* opcode constants dispatched by the message framer.

pub type Opcode = u32;

pub const NET_NOP: Opcode = 0;
pub const NET_DISCONNECT: Opcode = 1;
pub const NET_TICK: Opcode = 3;

pub const SVC_SERVER_INFO: Opcode = 8;
pub const SVC_SEND_TABLE: Opcode = 9;
pub const SVC_CLASS_INFO: Opcode = 10;
pub const SVC_CREATE_STRING_TABLE: Opcode = 12;
pub const SVC_UPDATE_STRING_TABLE: Opcode = 13;
pub const SVC_USER_MESSAGE: Opcode = 23;
pub const SVC_GAME_EVENT: Opcode = 25;
pub const SVC_PACKET_ENTITIES: Opcode = 26;
pub const SVC_GAME_EVENT_LIST: Opcode = 35;

/// Human-readable name for opcodes the dispatcher must recognize, used by
/// the textual trace sink. Falls back to a numeric label for anything we
/// merely skip over.
pub fn opcode_name(op: Opcode) -> &'static str {
    match op {
        NET_NOP => "NOP",
        NET_DISCONNECT => "Disconnect",
        NET_TICK => "Tick",
        SVC_SERVER_INFO => "ServerInfo",
        SVC_SEND_TABLE => "SendTable",
        SVC_CLASS_INFO => "ClassInfo",
        SVC_CREATE_STRING_TABLE => "CreateStringTable",
        SVC_UPDATE_STRING_TABLE => "UpdateStringTable",
        SVC_USER_MESSAGE => "UserMessage",
        SVC_GAME_EVENT => "GameEvent",
        SVC_PACKET_ENTITIES => "PacketEntities",
        SVC_GAME_EVENT_LIST => "GameEventList",
        _ => "Unknown",
    }
}
