//! Argument parsing: one positional demo path plus the boolean flags
//! controlling which event categories and extras get included in the
//! output. Grounded on the `clap::Parser` derive usage in the
//! `robopoker` analysis CLI.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "clutch", about = "Parses a Source-engine demo into a trace or JSON document")]
pub struct Cli {
    /// Path to the `.dem` recording.
    pub demo_path: PathBuf,

    /// Emit the structured document as JSON instead of a textual trace.
    #[arg(long)]
    pub json: bool,

    /// Pretty-print the JSON document (implies --json).
    #[arg(long)]
    pub pretty_json: bool,

    /// Include normalized game events in the output.
    #[arg(long)]
    pub game_events: bool,

    /// Restrict normalized events to the hsbox-relevant subset.
    #[arg(long)]
    pub only_hsbox_events: bool,

    /// Drop `player_footstep` events entirely.
    #[arg(long)]
    pub suppress_footstep_events: bool,

    /// Include extra per-player info (guid, friends-id) in the document.
    #[arg(long)]
    pub extra_player_info: bool,

    /// Include `player_death` events in the textual trace.
    #[arg(long)]
    pub deaths: bool,

    /// Suppress `player_death` events observed before match start.
    #[arg(long)]
    pub suppress_warmup_deaths: bool,

    /// Trace string-table creates/updates.
    #[arg(long)]
    pub string_tables: bool,

    /// Trace the send-table/flattening block.
    #[arg(long)]
    pub data_tables: bool,

    /// Trace `PacketEntities` updates.
    #[arg(long)]
    pub packet_entities: bool,

    /// Trace every dispatched net message by opcode.
    #[arg(long)]
    pub net_messages: bool,
}

impl Cli {
    pub fn wants_json(&self) -> bool {
        self.json || self.pretty_json
    }
}
