mod address;
mod info;
mod netchan;
mod oob;
mod stats;
mod transport;

pub use address::{AddressFamily, NetAddress};
pub use info::{info_pairs, info_value, remove_info_key, set_info_value};
pub use netchan::{NetSide, Netchan, NetchanMessage};
pub use oob::{
    Args, OOB_SENTINEL, atoi, command_line, is_connectionless, out_of_band, out_of_band_data,
    trailing_text,
};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{MemoryTransport, Transport, UdpTransport};
