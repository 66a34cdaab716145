use std::fmt;

use crate::discovery::{ServerSource, ServerStatusReport};
use crate::net::NetAddress;

/// Connection lifecycle, ordered so `state >= Connected` means a channel exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Challenging,
    Connected,
    Primed,
    Active,
    Cinematic,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self >= ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Challenging => "challenging",
            ConnectionState::Connected => "connected",
            ConnectionState::Primed => "primed",
            ConnectionState::Active => "active",
            ConnectionState::Cinematic => "cinematic",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested,
    TimedOut,
    Dropped(String),
    DemoCompleted,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => f.write_str("Disconnected."),
            DisconnectReason::TimedOut => f.write_str("Server connection timed out."),
            DisconnectReason::Dropped(message) => f.write_str(message),
            DisconnectReason::DemoCompleted => f.write_str("Demo playback finished."),
        }
    }
}

/// Things the frame driver reacts to, drained with `poll_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Connected {
        server: NetAddress,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    ServerPrint(String),
    Motd(String),
    DemoCompleted {
        next_demo: Option<String>,
        timedemo: Option<String>,
    },
    ServerListUpdated {
        source: ServerSource,
        count: usize,
    },
    ServerStatus(ServerStatusReport),
}
