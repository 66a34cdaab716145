pub const PROTOCOL_VERSION: i32 = 68;
pub const NEW_PROTOCOL_VERSION: i32 = 71;
pub const DEMO_PROTOCOLS: [i32; 4] = [71, 68, 67, 66];
pub const DEMO_EXT: &str = "dm_";

pub const GAMENAME_FOR_MASTER: &str = "Quake3Arena";
pub const CLIENT_VERSION: &str = concat!("strafe ", env!("CARGO_PKG_VERSION"));

pub const PORT_SERVER: u16 = 27960;
pub const PORT_MASTER: u16 = 27950;
pub const PORT_UPDATE: u16 = 27951;
pub const NUM_SERVER_PORTS: u16 = 4;

pub const MAX_RELIABLE_COMMANDS: usize = 64;
pub const MAX_STRING_CHARS: usize = 1024;
pub const MAX_INFO_STRING: usize = 1024;
pub const BIG_INFO_STRING: usize = 8192;
/// Leaves room for `connect ""` around the userinfo.
pub const MAX_USERINFO_LENGTH: usize = MAX_INFO_STRING - 13;

pub const MAX_MSGLEN: usize = 16384;
pub const MAX_PACKETLEN: usize = 1400;
pub const FRAGMENT_SIZE: usize = MAX_PACKETLEN - 100;
pub const FRAGMENT_BIT: u32 = 1 << 31;

pub const GENTITYNUM_BITS: u32 = 10;
pub const MAX_GENTITIES: usize = 1 << GENTITYNUM_BITS;
pub const ENTITYNUM_END: u32 = (MAX_GENTITIES - 1) as u32;
pub const MAX_CONFIGSTRINGS: usize = 1024;
pub const MAX_MAP_AREA_BYTES: usize = 32;

pub const PACKET_BACKUP: usize = 32;
pub const PACKET_MASK: usize = PACKET_BACKUP - 1;

pub const RETRANSMIT_TIMEOUT_MS: u64 = 3000;
pub const DISCONNECT_PACKETS: usize = 3;
pub const MAX_TIMEOUT_COUNT: u32 = 5;
pub const CONNECTED_PACKET_INTERVAL_MS: u64 = 1000;

pub const MAX_PINGREQUESTS: usize = 32;
pub const PING_GRACE_MS: u64 = 500;
pub const MIN_PING_TIMEOUT_MS: u64 = 100;
pub const PING_UNREACHABLE: u32 = 999;
pub const MAX_SERVERSTATUSREQUESTS: usize = 16;
pub const SERVER_STATUS_RESEND_MS: u64 = 3000;
pub const MAX_OTHER_SERVERS: usize = 128;
pub const MAX_GLOBAL_SERVERS: usize = 4096;
pub const MAX_MASTER_SERVERS: usize = 5;
pub const MAX_SERVERSPERPACKET: usize = 256;

pub const MAX_DEMO_NAME_ATTEMPTS: u32 = 1000;

/// Server to client op codes.
pub mod svc {
    pub const BAD: u8 = 0;
    pub const NOP: u8 = 1;
    pub const GAMESTATE: u8 = 2;
    pub const CONFIGSTRING: u8 = 3;
    pub const BASELINE: u8 = 4;
    pub const SERVER_COMMAND: u8 = 5;
    pub const DOWNLOAD: u8 = 6;
    pub const SNAPSHOT: u8 = 7;
    pub const EOF: u8 = 8;
}

/// Client to server op codes.
pub mod clc {
    pub const CLIENT_COMMAND: u8 = 4;
    pub const EOF: u8 = 5;
}

#[inline]
pub fn netchan_checksum(challenge: i32, sequence: i32) -> i32 {
    challenge ^ sequence.wrapping_mul(challenge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_size_fits_packet() {
        assert!(FRAGMENT_SIZE < MAX_PACKETLEN);
        assert_eq!(ENTITYNUM_END, 1023);
    }

    #[test]
    fn checksum_depends_on_both_inputs() {
        assert_eq!(netchan_checksum(0, 55), 0);
        assert_ne!(netchan_checksum(1234, 1), netchan_checksum(1234, 2));
    }
}
