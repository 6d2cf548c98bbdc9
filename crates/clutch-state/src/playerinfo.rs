//! Player-info records: the big-endian-stored composite the game server
//! writes into the `userinfo` string table's user-data buffer. Grounded
//! on `player_info_t` handling in the reference C++ dumper
//! `demofiledump.cpp` (`LowLevelByteSwap` calls on
//! `xuid`/`userID`/`friendsID`, and the `guid`/`name` string fields read
//! verbatim).

use clutch_core::error::{DemoError, DemoResult};

const NAME_LEN: usize = 128;
const GUID_LEN: usize = 33;
const FRIENDS_NAME_LEN: usize = 128;

/// Total on-wire size of one `player_info_t` record.
pub const PLAYER_INFO_SIZE: usize = 8 + NAME_LEN + 4 + GUID_LEN + 4 + FRIENDS_NAME_LEN + 1 + 1 + 16 + 1;

#[derive(Clone, Debug, Default)]
pub struct PlayerInfo {
    /// Stable 64-bit account id. Zero for bots.
    pub xuid: u64,
    pub name: String,
    pub user_id: i32,
    pub guid: String,
    pub friends_id: u32,
    pub friends_name: String,
    pub fake_player: bool,
    pub is_hltv: bool,
    pub files_downloaded: u8,
}

fn read_nul_padded(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

impl PlayerInfo {
    /// Parses a raw `player_info_t` buffer, byte-swapping the three
    /// integer fields the server writes big-endian.
    pub fn from_bytes(buf: &[u8]) -> DemoResult<Self> {
        if buf.len() < PLAYER_INFO_SIZE {
            return Err(DemoError::Truncated);
        }
        let mut off = 0usize;
        let xuid = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let name = read_nul_padded(&buf[off..off + NAME_LEN]);
        off += NAME_LEN;
        let user_id = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let guid = read_nul_padded(&buf[off..off + GUID_LEN]);
        off += GUID_LEN;
        let friends_id = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let friends_name = read_nul_padded(&buf[off..off + FRIENDS_NAME_LEN]);
        off += FRIENDS_NAME_LEN;
        let fake_player = buf[off] != 0;
        off += 1;
        let is_hltv = buf[off] != 0;
        off += 1;
        off += 16; // custom file CRCs, unused downstream
        let files_downloaded = buf[off];
        Ok(PlayerInfo {
            xuid,
            name,
            user_id,
            guid,
            friends_id,
            friends_name,
            fake_player,
            is_hltv,
            files_downloaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buf(xuid: u64, user_id: i32, name: &str) -> Vec<u8> {
        let mut buf = vec![0u8; PLAYER_INFO_SIZE];
        buf[0..8].copy_from_slice(&xuid.to_be_bytes());
        let name_bytes = name.as_bytes();
        buf[8..8 + name_bytes.len()].copy_from_slice(name_bytes);
        let uid_off = 8 + NAME_LEN;
        buf[uid_off..uid_off + 4].copy_from_slice(&user_id.to_be_bytes());
        buf
    }

    #[test]
    fn byte_swaps_xuid_and_user_id() {
        let buf = sample_buf(76561197960265728, 7, "clutch");
        let info = PlayerInfo::from_bytes(&buf).unwrap();
        assert_eq!(info.xuid, 76561197960265728);
        assert_eq!(info.user_id, 7);
        assert_eq!(info.name, "clutch");
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(PlayerInfo::from_bytes(&[0u8; 4]).is_err());
    }
}
