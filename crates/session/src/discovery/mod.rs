mod dedup;
mod master;
mod ping;
mod server_list;
mod status;

pub use dedup::AddressDedup;
pub use master::parse_server_list;
pub use ping::{PingPool, PingRequest};
pub use server_list::{ServerList, ServerListEntry, ServerSource};
pub use status::{PlayerStatus, ServerStatusPool, ServerStatusReport, StatusPoll};

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::net::{AddressFamily, NetAddress, Transport, atoi, info_value, out_of_band};
use crate::protocol::{
    MAX_GLOBAL_SERVERS, MAX_MASTER_SERVERS, MAX_OTHER_SERVERS, MAX_PINGREQUESTS,
    NEW_PROTOCOL_VERSION, NUM_SERVER_PORTS, PORT_MASTER, PORT_SERVER, PROTOCOL_VERSION,
};

const INFO_REQUEST: &str = "getinfo xxx";

fn send_text(transport: &mut dyn Transport, to: &NetAddress, text: &str) -> io::Result<()> {
    transport.send_to(&out_of_band(text), to)
}

/// Server browser state: the three lists, the ping pool and status requests.
#[derive(Debug)]
pub struct ServerDiscovery {
    local: ServerList,
    global: ServerList,
    favorites: ServerList,
    global_overflow: Vec<NetAddress>,
    dedup: AddressDedup,
    pings: PingPool,
    statuses: ServerStatusPool,
    ping_source: ServerSource,
    masters: Vec<String>,
    game_name: String,
    max_ping: u32,
    family: AddressFamily,
    ipv4_enabled: bool,
}

impl ServerDiscovery {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            local: ServerList::new(MAX_OTHER_SERVERS),
            global: ServerList::new(MAX_GLOBAL_SERVERS),
            favorites: ServerList::new(MAX_OTHER_SERVERS),
            global_overflow: Vec::new(),
            dedup: AddressDedup::new(),
            pings: PingPool::new(),
            statuses: ServerStatusPool::new(),
            ping_source: ServerSource::Local,
            masters: config.masters.clone(),
            game_name: config.game_name.clone(),
            max_ping: config.max_ping,
            family: config.family,
            ipv4_enabled: config.enable_ipv4,
        }
    }

    pub fn list(&self, source: ServerSource) -> &ServerList {
        match source {
            ServerSource::Local => &self.local,
            ServerSource::Global => &self.global,
            ServerSource::Favorites => &self.favorites,
        }
    }

    pub fn list_mut(&mut self, source: ServerSource) -> &mut ServerList {
        match source {
            ServerSource::Local => &mut self.local,
            ServerSource::Global => &mut self.global,
            ServerSource::Favorites => &mut self.favorites,
        }
    }

    pub fn ping_source(&self) -> ServerSource {
        self.ping_source
    }

    pub fn global_overflow(&self) -> &[NetAddress] {
        &self.global_overflow
    }

    pub fn pings(&self) -> &PingPool {
        &self.pings
    }

    pub fn add_favorite(&mut self, address: NetAddress) -> bool {
        !self.favorites.contains(&address) && self.favorites.push(address)
    }

    /// Broadcasts `getinfo` on every server port, twice in case one is lost.
    pub fn local_servers(&mut self, transport: &mut dyn Transport) -> io::Result<()> {
        log::info!(
            "Scanning for servers on the local network ({} servers)...",
            self.local.len()
        );
        self.ping_source = ServerSource::Local;
        self.local.clear();

        for _ in 0..2 {
            for offset in 0..NUM_SERVER_PORTS {
                let to = NetAddress::Broadcast {
                    port: PORT_SERVER + offset,
                };
                send_text(transport, &to, INFO_REQUEST)?;
            }
        }
        Ok(())
    }

    /// Queries master `master` (1..=5), or every configured master for 0.
    pub fn global_servers(
        &mut self,
        transport: &mut dyn Transport,
        master: usize,
        protocol: &str,
        keywords: &[String],
    ) -> Result<(), SessionError> {
        if master > MAX_MASTER_SERVERS {
            return Err(SessionError::BadMasterNumber(master));
        }

        if master == 0 {
            let configured: Vec<usize> = (1..=MAX_MASTER_SERVERS)
                .filter(|&n| self.master_address(n).is_some())
                .collect();
            if configured.is_empty() {
                log::warn!("No master server addresses.");
            }
            for number in configured {
                self.global_servers(transport, number, protocol, keywords)?;
            }
            return Ok(());
        }

        let Some(name) = self.master_address(master).map(str::to_string) else {
            log::warn!("No master server address given.");
            return Ok(());
        };
        let to = NetAddress::resolve(&name, PORT_MASTER, self.family)
            .ok_or_else(|| SessionError::BadServerAddress(name.clone()))?;

        log::info!("Requesting servers from {} ({})...", name, to);

        self.global.set_awaiting_response(true);
        self.ping_source = ServerSource::Global;

        let mut command = if to.is_ipv6() {
            let mut command = format!("getserversExt {} {}", self.game_name, protocol);
            if !self.ipv4_enabled {
                command.push_str(" ipv6");
            }
            command
        } else {
            format!("getservers {}", protocol)
        };
        for keyword in keywords {
            command.push(' ');
            command.push_str(keyword);
        }

        send_text(transport, &to, &command)?;
        Ok(())
    }

    fn master_address(&self, number: usize) -> Option<&str> {
        self.masters
            .get(number.checked_sub(1)?)
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
    }

    /// Adds the addresses of a `getserversResponse` to the matching list.
    /// Returns the list that was updated and how many addresses the packet carried.
    pub fn servers_response(
        &mut self,
        from: &NetAddress,
        data: &[u8],
        extended: bool,
    ) -> (ServerSource, usize) {
        let to_local = self.ping_source == ServerSource::Local && self.local.contains(from);
        let list = if to_local {
            &mut self.local
        } else {
            &mut self.global
        };

        if list.awaiting_response() {
            list.set_awaiting_response(false);
            list.clear();
            self.global_overflow.clear();
            self.dedup.reset();
        }

        let servers = parse_server_list(data, extended);
        let mut remaining = servers.iter();
        for address in remaining.by_ref() {
            if list.is_full() {
                if !to_local && self.global_overflow.len() < MAX_GLOBAL_SERVERS {
                    self.global_overflow.push(*address);
                }
                break;
            }
            if self.dedup.contains(address) {
                continue;
            }
            self.dedup.insert(*address);
            list.push(*address);
        }
        if !to_local {
            for address in remaining {
                if self.global_overflow.len() >= MAX_GLOBAL_SERVERS {
                    break;
                }
                self.global_overflow.push(*address);
            }
        }

        log::info!(
            "getserversResponse:{:3} servers parsed (total {})",
            servers.len(),
            list.len() + self.global_overflow.len()
        );
        let source = if to_local {
            ServerSource::Local
        } else {
            ServerSource::Global
        };
        (source, servers.len())
    }

    /// Handles an `infoResponse`: completes a ping, or records a new local server.
    pub fn server_info_packet(&mut self, from: &NetAddress, info: &str, now_ms: u64) {
        let protocol = atoi(info_value(info, "protocol"));
        if protocol != PROTOCOL_VERSION && protocol != NEW_PROTOCOL_VERSION {
            log::debug!("Different protocol info packet: {}", info);
            return;
        }

        // Loopback answers stand in for the local server's IP address.
        let address = match from {
            NetAddress::Loopback => {
                NetAddress::Ip(SocketAddr::from((Ipv4Addr::LOCALHOST, PORT_SERVER)))
            }
            other => *other,
        };

        let mut answered = self
            .pings
            .answer(from, info, now_ms)
            .map(|request| (request.info.clone(), request.time));
        if answered.is_none() && matches!(from, NetAddress::Loopback) {
            answered = self
                .pings
                .answer(&address, info, now_ms)
                .map(|request| (request.info.clone(), request.time));
        }
        if let Some((ping_info, time)) = answered {
            self.set_server_info_by_address(&address, Some(&ping_info), time as i32);
            return;
        }

        if matches!(from, NetAddress::Loopback) || self.ping_source != ServerSource::Local {
            return;
        }
        if self.local.contains(from) {
            return;
        }
        if !self.local.push(*from) {
            log::debug!("MAX_OTHER_SERVERS hit, dropping infoResponse");
            return;
        }
        log::info!("{}: {}", from, info_value(info, "hostname"));
    }

    /// Applies info to the entry for `address` in every list.
    pub fn set_server_info_by_address(
        &mut self,
        address: &NetAddress,
        info: Option<&str>,
        ping: i32,
    ) {
        self.local.update_by_address(address, info, ping);
        self.global.update_by_address(address, info, ping);
        self.favorites.update_by_address(address, info, ping);
    }

    pub fn ping(
        &mut self,
        transport: &mut dyn Transport,
        address: NetAddress,
        now_ms: u64,
    ) -> io::Result<()> {
        self.pings.start(address, now_ms);
        self.set_server_info_by_address(&address, None, 0);
        send_text(transport, &address, INFO_REQUEST)
    }

    /// Address and ping of slot `n`; 0 while waiting, 999 once timed out.
    /// A finished ping is copied to the list entries; a timed out one marks
    /// them with ping 0.
    pub fn get_ping(&mut self, n: usize, now_ms: u64) -> Option<(NetAddress, u32)> {
        let (address, time) = self.pings.result(n, now_ms, self.max_ping)?;
        let answered = self.pings.slot(n).map_or(0, |p| p.time);
        if answered != 0 {
            let info = self.pings.info(n).to_string();
            self.set_server_info_by_address(&address, Some(&info), answered as i32);
        } else if time != 0 {
            self.set_server_info_by_address(&address, None, 0);
        }
        Some((address, time))
    }

    pub fn get_ping_info(&self, n: usize) -> &str {
        self.pings.info(n)
    }

    pub fn clear_ping(&mut self, n: usize) {
        self.pings.clear(n);
    }

    pub fn ping_queue_count(&self) -> usize {
        self.pings.queue_count()
    }

    /// Keeps the ping pool busy with visible servers of `source` that have no
    /// ping yet, and collects finished pings. True while work remains.
    pub fn update_visible_pings(
        &mut self,
        transport: &mut dyn Transport,
        source: ServerSource,
        now_ms: u64,
    ) -> io::Result<bool> {
        self.ping_source = source;
        let mut status = false;
        let mut slots = self.pings.queue_count();

        if slots < MAX_PINGREQUESTS {
            let list = match source {
                ServerSource::Local => &mut self.local,
                ServerSource::Global => &mut self.global,
                ServerSource::Favorites => &mut self.favorites,
            };
            for entry in list.entries_mut().iter_mut().filter(|e| e.visible) {
                if entry.ping == -1 {
                    if slots >= MAX_PINGREQUESTS {
                        break;
                    }
                    if self.pings.contains(&entry.address) {
                        continue;
                    }
                    status = true;
                    if self.pings.start_in_empty(entry.address, now_ms).is_some() {
                        send_text(transport, &entry.address, INFO_REQUEST)?;
                        slots += 1;
                    }
                } else if entry.ping == 0 && source == ServerSource::Global {
                    // Replace a lost server with one that did not fit the list.
                    if let Some(address) = self.global_overflow.pop() {
                        entry.reinit(address);
                    }
                }
            }
        }

        if slots > 0 {
            status = true;
        }

        let occupied: Vec<usize> = self.pings.occupied().collect();
        for n in occupied {
            match self.get_ping(n, now_ms) {
                Some((_, time)) if time != 0 => {
                    self.clear_ping(n);
                    status = true;
                }
                _ => {}
            }
        }

        Ok(status)
    }

    /// Returns the cached status string for `address` once it has arrived,
    /// sending `getstatus` as needed.
    pub fn server_status(
        &mut self,
        transport: &mut dyn Transport,
        address: NetAddress,
        now_ms: u64,
    ) -> io::Result<Option<String>> {
        match self.statuses.poll(address, now_ms) {
            StatusPoll::Retrieved(text) => Ok(Some(text)),
            StatusPoll::Send => {
                send_text(transport, &address, "getstatus")?;
                Ok(None)
            }
            StatusPoll::Waiting => Ok(None),
        }
    }

    /// Sends `getstatus` and reports the response when it arrives.
    pub fn request_status(
        &mut self,
        transport: &mut dyn Transport,
        address: NetAddress,
        now_ms: u64,
    ) -> io::Result<()> {
        send_text(transport, &address, "getstatus")?;
        self.statuses.request_print(address, now_ms);
        Ok(())
    }

    pub fn forget_status(&mut self, address: &NetAddress) {
        self.statuses.forget(address);
    }

    pub fn reset_status(&mut self) {
        self.statuses.reset();
    }

    pub fn status_response(
        &mut self,
        from: &NetAddress,
        body: &str,
        now_ms: u64,
    ) -> Option<ServerStatusReport> {
        self.statuses.response(from, body, now_ms)
    }
}
