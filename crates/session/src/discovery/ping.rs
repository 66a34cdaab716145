use crate::net::{NetAddress, set_info_value};
use crate::protocol::{
    MAX_INFO_STRING, MAX_PINGREQUESTS, MIN_PING_TIMEOUT_MS, PING_GRACE_MS, PING_UNREACHABLE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub address: NetAddress,
    pub start_ms: u64,
    /// Round trip in milliseconds, 0 while unanswered.
    pub time: u32,
    pub info: String,
}

impl PingRequest {
    fn new(address: NetAddress, now_ms: u64) -> Self {
        Self {
            address,
            start_ms: now_ms,
            time: 0,
            info: String::new(),
        }
    }

    fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_ms)
    }
}

/// Fixed pool of outstanding `getinfo` pings.
#[derive(Debug)]
pub struct PingPool {
    slots: Vec<Option<PingRequest>>,
}

impl Default for PingPool {
    fn default() -> Self {
        Self {
            slots: vec![None; MAX_PINGREQUESTS],
        }
    }
}

impl PingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, n: usize) -> Option<&PingRequest> {
        self.slots.get(n)?.as_ref()
    }

    pub fn queue_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn contains(&self, address: &NetAddress) -> bool {
        self.slots.iter().flatten().any(|p| p.address == *address)
    }

    /// A slot that is empty, unanswered past the grace period, or answered
    /// slowly. Otherwise the request that has been out the longest.
    fn free_slot(&self, now_ms: u64) -> usize {
        let reusable = self.slots.iter().position(|slot| match slot {
            None => true,
            Some(p) if p.time == 0 => p.elapsed(now_ms) >= PING_GRACE_MS,
            Some(p) => p.time as u64 >= PING_GRACE_MS,
        });
        if let Some(index) = reusable {
            return index;
        }

        self.slots
            .iter()
            .enumerate()
            .max_by_key(|(index, slot)| {
                let elapsed = slot.as_ref().map_or(u64::MAX, |p| p.elapsed(now_ms));
                (elapsed, std::cmp::Reverse(*index))
            })
            .map_or(0, |(index, _)| index)
    }

    /// Starts a ping, evicting if needed. Returns the slot used.
    pub fn start(&mut self, address: NetAddress, now_ms: u64) -> usize {
        let index = self.free_slot(now_ms);
        self.slots[index] = Some(PingRequest::new(address, now_ms));
        index
    }

    /// Starts a ping only if an empty slot exists.
    pub fn start_in_empty(&mut self, address: NetAddress, now_ms: u64) -> Option<usize> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(PingRequest::new(address, now_ms));
        Some(index)
    }

    /// Records an `infoResponse` against the first unanswered ping to `from`.
    pub fn answer(&mut self, from: &NetAddress, info: &str, now_ms: u64) -> Option<&PingRequest> {
        let request = self
            .slots
            .iter_mut()
            .flatten()
            .find(|p| p.time == 0 && p.address == *from)?;

        request.time = request.elapsed(now_ms).clamp(1, u32::MAX as u64) as u32;
        request.info = info.to_string();
        let net_type = if from.is_ipv6() { "2" } else { "1" };
        set_info_value(&mut request.info, "nettype", net_type, MAX_INFO_STRING);

        log::debug!("ping time {}ms from {}", request.time, from);
        Some(request)
    }

    /// The address and ping of slot `n`. A ping of 0 means still waiting;
    /// an unanswered ping past the timeout reports as unreachable.
    pub fn result(&self, n: usize, now_ms: u64, max_ping: u32) -> Option<(NetAddress, u32)> {
        let request = self.slot(n)?;
        let mut time = request.time;
        if time == 0 {
            let timeout = (max_ping as u64).max(MIN_PING_TIMEOUT_MS);
            if request.elapsed(now_ms) >= timeout {
                time = PING_UNREACHABLE;
            }
        }
        Some((request.address, time))
    }

    pub fn info(&self, n: usize) -> &str {
        self.slot(n).map_or("", |p| p.info.as_str())
    }

    pub fn clear(&mut self, n: usize) {
        if let Some(slot) = self.slots.get_mut(n) {
            *slot = None;
        }
    }

    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index)
    }
}
