pub mod config;
pub mod demo;
pub mod discovery;
pub mod error;
pub mod msg;
pub mod net;
pub mod parse;
pub mod protocol;
pub mod session;

pub use config::SessionConfig;
pub use demo::{DemoPlayer, DemoReader, DemoRecord, DemoRecorder, DemoWriter, StopOutcome};
pub use discovery::{
    AddressDedup, PingPool, ServerDiscovery, ServerList, ServerListEntry, ServerSource,
    ServerStatusReport,
};
pub use error::{DemoError, MessageError, ParseError, SessionError};
pub use msg::{EntityState, Message, PlayerState};
pub use net::{
    AddressFamily, MemoryTransport, NetAddress, NetSide, Netchan, NetworkStats,
    PacketLossSimulation, Transport, UdpTransport,
};
pub use parse::{ClientState, MessageParser, ParsedEvents, WireParser};
pub use session::{
    ConnectionSession, ConnectionState, DisconnectReason, ReliableCommandQueue, SessionEvent,
};
