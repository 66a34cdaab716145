use serde::{Deserialize, Serialize};

use crate::net::{NetAddress, atoi, info_value};

/// Which list a discovery result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerSource {
    #[default]
    Local,
    Global,
    Favorites,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerListEntry {
    pub address: NetAddress,
    pub clients: i32,
    pub host_name: String,
    pub map_name: String,
    pub max_clients: i32,
    pub game: String,
    pub game_type: i32,
    pub net_type: i32,
    pub min_ping: i32,
    pub max_ping: i32,
    pub punkbuster: i32,
    pub human_players: i32,
    pub need_pass: i32,
    /// -1 until pinged, 0 when the ping was lost.
    pub ping: i32,
    pub visible: bool,
}

impl ServerListEntry {
    pub fn new(address: NetAddress) -> Self {
        Self {
            address,
            clients: 0,
            host_name: String::new(),
            map_name: String::new(),
            max_clients: 0,
            game: String::new(),
            game_type: 0,
            net_type: 0,
            min_ping: 0,
            max_ping: 0,
            punkbuster: 0,
            human_players: 0,
            need_pass: 0,
            ping: -1,
            visible: true,
        }
    }

    /// Resets the descriptor for a new address, keeping its visibility.
    pub fn reinit(&mut self, address: NetAddress) {
        let visible = self.visible;
        *self = Self::new(address);
        self.visible = visible;
    }

    pub fn apply_info(&mut self, info: Option<&str>, ping: i32) {
        if let Some(info) = info {
            self.clients = atoi(info_value(info, "clients"));
            self.host_name = info_value(info, "hostname").to_string();
            self.map_name = info_value(info, "mapname").to_string();
            self.max_clients = atoi(info_value(info, "sv_maxclients"));
            self.game = info_value(info, "game").to_string();
            self.game_type = atoi(info_value(info, "gametype"));
            self.net_type = atoi(info_value(info, "nettype"));
            self.min_ping = atoi(info_value(info, "minping"));
            self.max_ping = atoi(info_value(info, "maxping"));
            self.punkbuster = atoi(info_value(info, "punkbuster"));
            self.human_players = atoi(info_value(info, "g_humanplayers"));
            self.need_pass = atoi(info_value(info, "g_needpass"));
        }
        self.ping = ping;
    }
}

/// A bounded list of discovered servers.
#[derive(Debug, Clone)]
pub struct ServerList {
    entries: Vec<ServerListEntry>,
    capacity: usize,
    awaiting_response: bool,
}

impl ServerList {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            awaiting_response: false,
        }
    }

    pub fn entries(&self) -> &[ServerListEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ServerListEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, address: &NetAddress) -> bool {
        self.entries.iter().any(|e| e.address == *address)
    }

    /// Returns false when the list is full.
    pub fn push(&mut self, address: NetAddress) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(ServerListEntry::new(address));
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True between a new query and its first response.
    pub fn awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    pub fn set_awaiting_response(&mut self, awaiting: bool) {
        self.awaiting_response = awaiting;
    }

    pub fn update_by_address(&mut self, address: &NetAddress, info: Option<&str>, ping: i32) {
        for entry in self.entries.iter_mut().filter(|e| e.address == *address) {
            entry.apply_info(info, ping);
        }
    }
}
