//! Outer demo-file framing: fixed header plus the `(cmd, tick, player_slot)`
//! command-block stream. Deliberately thin glue —
//! `clutch-proto`/`clutch-state`/`clutch-events` never see a raw file,
//! only the byte slices this module hands them per command.

use crate::error::{DemoError, DemoResult};

pub const MAGIC: &[u8; 8] = b"HL2DEMO\0";
const NAME_FIELD_LEN: usize = 260;

#[derive(Debug, Clone)]
pub struct DemoHeader {
    pub protocol: i32,
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_directory: String,
    pub playback_time: f32,
    pub tick_count: i32,
    pub frame_count: i32,
    pub signon_length: i32,
}

/// Command codes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoCmd {
    Signon,
    Packet,
    SyncTick,
    ConsoleCmd,
    UserCmd,
    DataTables,
    Stop,
    CustomData,
    StringTables,
}

impl DemoCmd {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => DemoCmd::Signon,
            2 => DemoCmd::Packet,
            3 => DemoCmd::SyncTick,
            4 => DemoCmd::ConsoleCmd,
            5 => DemoCmd::UserCmd,
            6 => DemoCmd::DataTables,
            7 => DemoCmd::Stop,
            8 => DemoCmd::CustomData,
            9 => DemoCmd::StringTables,
            _ => return None,
        })
    }
}

/// One command block, with its payload resolved per table.
/// `Packet`/`Signon` payload is the raw wire-packet bytes with the
/// 152-byte `democmdinfo` and sequence-info header already stripped.
#[derive(Debug)]
pub struct DemoCommand {
    pub tick: i32,
    pub player_slot: u8,
    pub body: DemoCommandBody,
}

#[derive(Debug)]
pub enum DemoCommandBody {
    WirePacket(Vec<u8>),
    SyncTick,
    ConsoleCmd(Vec<u8>),
    UserCmd(i32, Vec<u8>),
    DataTables(Vec<u8>),
    Stop,
    CustomData(Vec<u8>),
    StringTables(Vec<u8>),
}

/// Cursor over an in-memory copy of the demo file. The whole file is read
/// up front (: "opened at start, closed at end"); there is no
/// benefit to streaming a format whose header must be read before anything
/// else can be interpreted.
pub struct DemoFile {
    data: Vec<u8>,
    pos: usize,
}

impl DemoFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> DemoResult<&[u8]> {
        if self.pos + n > self.data.len() {
            return Err(DemoError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_i32(&mut self) -> DemoResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f32(&mut self) -> DemoResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u8(&mut self) -> DemoResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_fixed_string(&mut self, len: usize) -> DemoResult<String> {
        let b = self.take(len)?;
        let nul = b.iter().position(|&c| c == 0).unwrap_or(b.len());
        Ok(String::from_utf8_lossy(&b[..nul]).into_owned())
    }

    pub fn read_header(&mut self) -> DemoResult<DemoHeader> {
        let magic = self.take(8)?;
        if magic != MAGIC {
            return Err(DemoError::Truncated);
        }
        let protocol = self.read_i32()?;
        let network_protocol = self.read_i32()?;
        let server_name = self.read_fixed_string(NAME_FIELD_LEN)?;
        let client_name = self.read_fixed_string(NAME_FIELD_LEN)?;
        let map_name = self.read_fixed_string(NAME_FIELD_LEN)?;
        let game_directory = self.read_fixed_string(NAME_FIELD_LEN)?;
        let playback_time = self.read_f32()?;
        let tick_count = self.read_i32()?;
        let frame_count = self.read_i32()?;
        let signon_length = self.read_i32()?;
        Ok(DemoHeader {
            protocol,
            network_protocol,
            server_name,
            client_name,
            map_name,
            game_directory,
            playback_time,
            tick_count,
            frame_count,
            signon_length,
        })
    }

    fn read_length_prefixed(&mut self) -> DemoResult<Vec<u8>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(DemoError::Truncated);
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    /// `democmdinfo_t` (152 bytes) + two sequence-number ints, stripped
    /// ahead of the raw wire-packet bytes in `dem_signon`/`dem_packet`
    /// blocks.
    fn skip_cmd_info(&mut self) -> DemoResult<()> {
        self.take(152)?;
        self.read_i32()?;
        self.read_i32()?;
        Ok(())
    }

    /// Reads the next command block, or `None` at end of file (mirrors
    /// `dem_stop`/EOF — both terminate the driver's loop).
    pub fn read_command(&mut self) -> DemoResult<Option<DemoCommand>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let cmd_byte = self.read_u8()?;
        let tick = self.read_i32()?;
        let player_slot = self.read_u8()?;
        let cmd = DemoCmd::from_byte(cmd_byte).ok_or(DemoError::Truncated)?;
        let body = match cmd {
            DemoCmd::Signon | DemoCmd::Packet => {
                self.skip_cmd_info()?;
                DemoCommandBody::WirePacket(self.read_length_prefixed()?)
            }
            DemoCmd::SyncTick => DemoCommandBody::SyncTick,
            DemoCmd::ConsoleCmd => DemoCommandBody::ConsoleCmd(self.read_length_prefixed()?),
            DemoCmd::UserCmd => {
                let seq = self.read_i32()?;
                DemoCommandBody::UserCmd(seq, self.read_length_prefixed()?)
            }
            DemoCmd::DataTables => DemoCommandBody::DataTables(self.read_length_prefixed()?),
            DemoCmd::Stop => DemoCommandBody::Stop,
            DemoCmd::CustomData => DemoCommandBody::CustomData(self.read_length_prefixed()?),
            DemoCmd::StringTables => DemoCommandBody::StringTables(self.read_length_prefixed()?),
        };
        Ok(Some(DemoCommand {
            tick,
            player_slot,
            body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes() -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(MAGIC);
        v.extend_from_slice(&1i32.to_le_bytes()); // protocol
        v.extend_from_slice(&4i32.to_le_bytes()); // network_protocol
        v.extend_from_slice(&[0u8; NAME_FIELD_LEN]); // server_name
        v.extend_from_slice(&[0u8; NAME_FIELD_LEN]); // client_name
        v.extend_from_slice(&[0u8; NAME_FIELD_LEN]); // map_name
        v.extend_from_slice(&[0u8; NAME_FIELD_LEN]); // game_directory
        v.extend_from_slice(&12.5f32.to_le_bytes()); // playback_time
        v.extend_from_slice(&100i32.to_le_bytes()); // tick_count
        v.extend_from_slice(&200i32.to_le_bytes()); // frame_count
        v.extend_from_slice(&0i32.to_le_bytes()); // signon_length
        v
    }

    #[test]
    fn reads_header_fields() {
        let mut f = DemoFile::new(header_bytes());
        let h = f.read_header().unwrap();
        assert_eq!(h.protocol, 1);
        assert_eq!(h.tick_count, 100);
        assert_eq!(h.frame_count, 200);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header_bytes();
        bytes[0] = b'X';
        let mut f = DemoFile::new(bytes);
        assert!(f.read_header().is_err());
    }

    #[test]
    fn reads_stop_command_then_ends() {
        let mut bytes = header_bytes();
        bytes.push(7); // dem_stop
        bytes.extend_from_slice(&5i32.to_le_bytes());
        bytes.push(0);
        let mut f = DemoFile::new(bytes);
        f.read_header().unwrap();
        let cmd = f.read_command().unwrap().unwrap();
        assert!(matches!(cmd.body, DemoCommandBody::Stop));
        assert_eq!(cmd.tick, 5);
        assert!(f.read_command().unwrap().is_none());
    }
}
