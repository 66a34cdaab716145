use crate::net::{NetAddress, atoi};
use crate::protocol::{MAX_SERVERSTATUSREQUESTS, SERVER_STATUS_RESEND_MS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub score: i32,
    pub ping: i32,
    pub name: String,
}

impl PlayerStatus {
    /// Parses a `score ping "name"` line.
    pub fn parse(line: &str) -> Self {
        let mut fields = line.splitn(3, ' ');
        let score = atoi(fields.next().unwrap_or(""));
        let ping = atoi(fields.next().unwrap_or(""));
        let name = fields.next().unwrap_or("unknown").to_string();
        Self { score, ping, name }
    }
}

/// A `statusResponse` that was requested for printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatusReport {
    pub address: NetAddress,
    pub info: String,
    pub players: Vec<PlayerStatus>,
}

#[derive(Debug, Clone, Default)]
struct StatusSlot {
    address: Option<NetAddress>,
    text: String,
    start_ms: u64,
    time_ms: u64,
    pending: bool,
    retrieved: bool,
    print: bool,
}

/// What a status poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPoll {
    /// The cached response, handed out once.
    Retrieved(String),
    /// A `getstatus` should go out now.
    Send,
    Waiting,
}

/// Outstanding `getstatus` requests, matched to responses by address.
#[derive(Debug)]
pub struct ServerStatusPool {
    slots: Vec<StatusSlot>,
}

impl Default for ServerStatusPool {
    fn default() -> Self {
        let mut pool = Self {
            slots: vec![StatusSlot::default(); MAX_SERVERSTATUSREQUESTS],
        };
        pool.reset();
        pool
    }
}

impl ServerStatusPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.address = None;
            slot.retrieved = true;
        }
    }

    /// Same address first, then any retrieved slot, then the oldest request.
    fn slot_for(&self, address: &NetAddress) -> usize {
        if let Some(index) = self.slots.iter().position(|s| s.address == Some(*address)) {
            return index;
        }
        if let Some(index) = self.slots.iter().position(|s| s.retrieved) {
            return index;
        }
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.start_ms)
            .map_or(0, |(index, _)| index)
    }

    pub fn poll(&mut self, address: NetAddress, now_ms: u64) -> StatusPoll {
        let index = self.slot_for(&address);
        let slot = &mut self.slots[index];

        if slot.address == Some(address) {
            if !slot.pending {
                slot.retrieved = true;
                slot.start_ms = 0;
                return StatusPoll::Retrieved(slot.text.clone());
            }
            if now_ms.saturating_sub(slot.start_ms) > SERVER_STATUS_RESEND_MS {
                slot.print = false;
                slot.pending = true;
                slot.retrieved = false;
                slot.time_ms = 0;
                slot.start_ms = now_ms;
                return StatusPoll::Send;
            }
        } else if slot.retrieved {
            *slot = StatusSlot {
                address: Some(address),
                start_ms: now_ms,
                pending: true,
                ..StatusSlot::default()
            };
            return StatusPoll::Send;
        }
        StatusPoll::Waiting
    }

    /// Drops interest in the response for `address`.
    pub fn forget(&mut self, address: &NetAddress) {
        let index = self.slot_for(address);
        self.slots[index].retrieved = true;
    }

    /// Marks a request whose response should be reported when it lands.
    pub fn request_print(&mut self, address: NetAddress, now_ms: u64) {
        let index = self.slot_for(&address);
        let slot = &mut self.slots[index];
        slot.address = Some(address);
        slot.print = true;
        slot.pending = true;
        slot.start_ms = now_ms;
    }

    /// Stores a `statusResponse` body. Returns a report for print requests.
    pub fn response(
        &mut self,
        from: &NetAddress,
        body: &str,
        now_ms: u64,
    ) -> Option<ServerStatusReport> {
        let slot = self.slots.iter_mut().find(|s| s.address == Some(*from))?;

        let mut lines = body.split('\n');
        let info = lines.next().unwrap_or("").to_string();
        let players: Vec<&str> = lines.take_while(|line| !line.is_empty()).collect();

        slot.text = format!("{}\\", info);
        for line in &players {
            slot.text.push('\\');
            slot.text.push_str(line);
        }
        slot.text.push('\\');

        slot.time_ms = now_ms;
        slot.pending = false;
        if !slot.print {
            return None;
        }
        slot.retrieved = true;

        Some(ServerStatusReport {
            address: *from,
            info,
            players: players.into_iter().map(PlayerStatus::parse).collect(),
        })
    }
}
