use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::net::AddressFamily;
use crate::protocol::GAMENAME_FOR_MASTER;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identifies this client to the server across NAT port changes.
    pub qport: u16,
    pub userinfo: String,
    pub timeout_secs: u64,
    pub retransmit_ms: u64,
    /// Pings slower than this count as lost. Never below 100.
    pub max_ping: u32,
    /// Outgoing packets per second once in a level, clamped to 15..=125.
    pub max_packets: u32,
    /// Up to five master server addresses; empty entries are skipped.
    pub masters: Vec<String>,
    pub game_name: String,
    pub demo_dir: PathBuf,
    /// Command handed back when demo playback finishes.
    pub next_demo: Option<String>,
    pub timedemo: bool,
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
    pub family: AddressFamily,
    pub rcon_address: Option<String>,
    pub rcon_password: String,
    pub update_server: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            qport: rand::thread_rng().gen_range(1..=u16::MAX),
            userinfo: "\\name\\UnnamedPlayer\\rate\\25000\\snaps\\20".to_string(),
            timeout_secs: 200,
            retransmit_ms: 3000,
            max_ping: 800,
            max_packets: 60,
            masters: vec!["master.quake3arena.com".to_string()],
            game_name: GAMENAME_FOR_MASTER.to_string(),
            demo_dir: PathBuf::from("demos"),
            next_demo: None,
            timedemo: false,
            enable_ipv4: true,
            enable_ipv6: true,
            family: AddressFamily::Any,
            rcon_address: None,
            rcon_password: String::new(),
            update_server: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "timeout_secs": 30, "masters": ["m.example"] }"#).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.masters, vec!["m.example".to_string()]);
        assert_eq!(config.retransmit_ms, 3000);
        assert_eq!(config.demo_dir, PathBuf::from("demos"));
        assert_ne!(config.qport, 0);
    }

    #[test]
    fn qport_is_never_zero() {
        for _ in 0..32 {
            assert_ne!(SessionConfig::default().qport, 0);
        }
    }
}
