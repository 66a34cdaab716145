use crate::msg::{EntityState, PlayerState};
use crate::net::info_value;
use crate::protocol::{MAX_CONFIGSTRINGS, MAX_GENTITIES, MAX_RELIABLE_COMMANDS, PACKET_BACKUP};

pub const CS_SERVERINFO: usize = 0;
pub const CS_SYSTEMINFO: usize = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub valid: bool,
    pub snap_flags: u8,
    pub server_time: i32,
    pub message_num: i32,
    pub delta_num: i32,
    pub area_mask: Vec<u8>,
    pub player_state: PlayerState,
    /// Sorted by entity number.
    pub entities: Vec<EntityState>,
    pub server_command_num: i32,
}

#[derive(Debug)]
pub struct SnapshotRing {
    snapshots: Vec<Option<Snapshot>>,
}

impl Default for SnapshotRing {
    fn default() -> Self {
        Self {
            snapshots: vec![None; PACKET_BACKUP],
        }
    }
}

impl SnapshotRing {
    pub fn push(&mut self, snapshot: Snapshot) {
        let index = snapshot.message_num as usize % PACKET_BACKUP;
        self.snapshots[index] = Some(snapshot);
    }

    /// The snapshot for `message_num`, if it is still held and valid.
    pub fn get(&self, message_num: i32) -> Option<&Snapshot> {
        let index = message_num as usize % PACKET_BACKUP;
        self.snapshots[index]
            .as_ref()
            .filter(|s| s.valid && s.message_num == message_num)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.snapshots {
            *slot = None;
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    configstrings: Vec<String>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            configstrings: vec![String::new(); MAX_CONFIGSTRINGS],
        }
    }
}

impl GameState {
    pub fn configstring(&self, index: usize) -> &str {
        self.configstrings.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn set_configstring(&mut self, index: usize, value: String) {
        if let Some(slot) = self.configstrings.get_mut(index) {
            *slot = value;
        }
    }

    /// Every non-empty configstring with its index.
    pub fn configstrings(&self) -> impl Iterator<Item = (usize, &str)> {
        self.configstrings
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_empty())
            .map(|(i, s)| (i, s.as_str()))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.configstrings {
            slot.clear();
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerCommandRing {
    commands: Vec<String>,
}

impl Default for ServerCommandRing {
    fn default() -> Self {
        Self {
            commands: vec![String::new(); MAX_RELIABLE_COMMANDS],
        }
    }
}

impl ServerCommandRing {
    pub fn get(&self, sequence: i32) -> &str {
        &self.commands[sequence as usize & (MAX_RELIABLE_COMMANDS - 1)]
    }

    pub fn set(&mut self, sequence: i32, text: String) {
        self.commands[sequence as usize & (MAX_RELIABLE_COMMANDS - 1)] = text;
    }

    pub fn clear(&mut self) {
        for slot in &mut self.commands {
            slot.clear();
        }
    }
}

/// Everything the server message parser fills in from the wire.
#[derive(Debug)]
pub struct ClientState {
    pub game_state: GameState,
    baselines: Vec<Option<EntityState>>,
    pub snapshots: SnapshotRing,
    pub snap: Snapshot,
    pub new_snapshots: bool,
    pub server_commands: ServerCommandRing,
    pub server_command_sequence: i32,
    pub server_message_sequence: i32,
    pub reliable_acknowledge: i32,
    pub client_num: i32,
    pub checksum_feed: i32,
    pub server_id: i32,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            game_state: GameState::default(),
            baselines: vec![None; MAX_GENTITIES],
            snapshots: SnapshotRing::default(),
            snap: Snapshot::default(),
            new_snapshots: false,
            server_commands: ServerCommandRing::default(),
            server_command_sequence: 0,
            server_message_sequence: 0,
            reliable_acknowledge: 0,
            client_num: 0,
            checksum_feed: 0,
            server_id: 0,
        }
    }
}

impl ClientState {
    /// Baseline for `number`, or the null entity when none was sent.
    pub fn baseline(&self, number: u32) -> EntityState {
        self.baselines
            .get(number as usize)
            .copied()
            .flatten()
            .unwrap_or(EntityState::with_number(number))
    }

    pub fn set_baseline(&mut self, entity: EntityState) {
        if let Some(slot) = self.baselines.get_mut(entity.number as usize) {
            *slot = Some(entity);
        }
    }

    pub fn baselines(&self) -> impl Iterator<Item = &EntityState> {
        self.baselines.iter().flatten()
    }

    /// Drops everything tied to the current gamestate. Server commands survive.
    pub fn clear_gamestate(&mut self) {
        self.game_state.clear();
        for slot in &mut self.baselines {
            *slot = None;
        }
        self.snapshots.clear();
        self.snap = Snapshot::default();
        self.new_snapshots = false;
    }

    pub fn update_server_id(&mut self) {
        let systeminfo = self.game_state.configstring(CS_SYSTEMINFO);
        self.server_id = crate::net::atoi(info_value(systeminfo, "sv_serverid"));
    }
}
