mod commands;
mod demo;
mod handshake;
mod packet;
mod state;

pub use commands::{CommandOverflow, ReliableCommandQueue};
pub use state::{ConnectionState, DisconnectReason, SessionEvent};

use std::collections::VecDeque;
use std::io;
use std::mem;

use crate::config::SessionConfig;
use crate::demo::{DemoPlayer, DemoRecorder};
use crate::discovery::{ServerDiscovery, ServerSource};
use crate::error::SessionError;
use crate::msg::Message;
use crate::net::{NetAddress, Netchan, Transport, is_connectionless};
use crate::parse::{ClientState, MessageParser, ParsedEvents, WireParser};
use crate::protocol::{
    CONNECTED_PACKET_INTERVAL_MS, DISCONNECT_PACKETS, MAX_TIMEOUT_COUNT, PACKET_BACKUP, clc,
};

/// The client side of one server connection, plus demo and server browser
/// state. Driven by `frame` with the caller's millisecond clock.
pub struct ConnectionSession<T: Transport> {
    config: SessionConfig,
    transport: T,
    parser: Box<dyn MessageParser>,
    state: ConnectionState,

    server_address: Option<NetAddress>,
    server_name: String,
    challenge: i32,
    compat: bool,
    connect_time: Option<u64>,
    connect_packet_count: u32,
    netchan: Option<Netchan>,

    commands: ReliableCommandQueue,
    client: ClientState,
    recorder: Option<DemoRecorder>,
    player: Option<DemoPlayer>,
    discovery: ServerDiscovery,
    ping_sweep: Option<ServerSource>,

    rcon_address: Option<NetAddress>,
    server_message: String,
    update_server: Option<NetAddress>,
    motd_challenge: String,
    motd: String,

    realtime: u64,
    last_packet_time: u64,
    last_packet_sent: Option<u64>,
    timeout_count: u32,
    disconnecting: bool,
    backlog: VecDeque<(Vec<u8>, NetAddress)>,
    events: Vec<SessionEvent>,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self::with_parser(config, transport, Box::new(WireParser))
    }

    pub fn with_parser(
        config: SessionConfig,
        transport: T,
        parser: Box<dyn MessageParser>,
    ) -> Self {
        let discovery = ServerDiscovery::new(&config);
        Self {
            config,
            transport,
            parser,
            state: ConnectionState::Disconnected,
            server_address: None,
            server_name: String::new(),
            challenge: 0,
            compat: false,
            connect_time: None,
            connect_packet_count: 0,
            netchan: None,
            commands: ReliableCommandQueue::new(),
            client: ClientState::default(),
            recorder: None,
            player: None,
            discovery,
            ping_sweep: None,
            rcon_address: None,
            server_message: String::new(),
            update_server: None,
            motd_challenge: String::new(),
            motd: String::new(),
            realtime: 0,
            last_packet_time: 0,
            last_packet_sent: None,
            timeout_count: 0,
            disconnecting: false,
            backlog: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server_address(&self) -> Option<&NetAddress> {
        self.server_address.as_ref()
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn challenge(&self) -> i32 {
        self.challenge
    }

    pub fn is_compat(&self) -> bool {
        self.compat
    }

    pub fn connect_packet_count(&self) -> u32 {
        self.connect_packet_count
    }

    pub fn netchan(&self) -> Option<&Netchan> {
        self.netchan.as_ref()
    }

    pub fn commands(&self) -> &ReliableCommandQueue {
        &self.commands
    }

    pub fn client(&self) -> &ClientState {
        &self.client
    }

    pub fn discovery(&self) -> &ServerDiscovery {
        &self.discovery
    }

    pub fn discovery_mut(&mut self) -> &mut ServerDiscovery {
        &mut self.discovery
    }

    /// Last text a server or rcon target printed to us.
    pub fn server_message(&self) -> &str {
        &self.server_message
    }

    pub fn motd(&self) -> &str {
        &self.motd
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_some()
    }

    pub fn recorder(&self) -> Option<&DemoRecorder> {
        self.recorder.as_ref()
    }

    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        mem::take(&mut self.events)
    }

    /// Runs one tick: network input, demo playback, timeouts, resends,
    /// the outgoing packet and ping housekeeping.
    pub fn frame(&mut self, now_ms: u64) -> Result<(), SessionError> {
        self.realtime = now_ms;

        self.process_network()?;

        if self.player.is_some() {
            self.read_demo_message();
        }

        self.check_timeout();
        self.check_for_resend()?;

        if self.ready_to_send() {
            self.write_packet()?;
        }

        self.update_ping_sweep()?;
        Ok(())
    }

    fn process_network(&mut self) -> Result<(), SessionError> {
        let mut sequenced_handled = false;
        if let Some((data, from)) = self.backlog.pop_front() {
            self.packet_event(&from, &data)?;
            sequenced_handled = true;
        }

        while let Some((data, from)) = self.transport.recv()? {
            let sequenced = data.len() >= 5 && !is_connectionless(&data);
            if sequenced && sequenced_handled {
                if self.backlog.len() >= PACKET_BACKUP {
                    log::debug!("{}: dropping sequenced packet, backlog full", from);
                    continue;
                }
                self.backlog.push_back((data, from));
                continue;
            }
            self.packet_event(&from, &data)?;
            sequenced_handled |= sequenced;
        }
        Ok(())
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        log::debug!("state {} -> {}", self.state, state);
        self.events.push(SessionEvent::StateChanged {
            from: self.state,
            to: state,
        });
        self.state = state;
    }

    /// Queues a reliable command for the server. Without a server address the
    /// command is dropped. Overflowing the queue drops the connection.
    pub fn add_reliable_command(
        &mut self,
        text: &str,
        is_disconnect: bool,
    ) -> Result<(), SessionError> {
        if self.server_address.is_none() {
            return Ok(());
        }

        match self.commands.push(text, is_disconnect) {
            Ok(_) => Ok(()),
            Err(overflow) => {
                if !self.disconnecting {
                    log::warn!("{}", overflow);
                    self.drop_connection("Client command overflow");
                }
                Err(SessionError::CommandOverflow)
            }
        }
    }

    pub fn send_command(&mut self, text: &str) -> Result<(), SessionError> {
        self.add_reliable_command(text, false)
    }

    fn check_timeout(&mut self) {
        let timeout_ms = self.config.timeout_secs.saturating_mul(1000);
        let watched = self.state.is_connected()
            && self.state != ConnectionState::Cinematic
            && self.player.is_none();

        if watched && self.realtime.saturating_sub(self.last_packet_time) > timeout_ms {
            self.timeout_count += 1;
            if self.timeout_count > MAX_TIMEOUT_COUNT {
                log::warn!("{}", DisconnectReason::TimedOut);
                self.disconnect_with(DisconnectReason::TimedOut);
            }
        } else {
            self.timeout_count = 0;
        }
    }

    fn ready_to_send(&self) -> bool {
        if !self.state.is_connected()
            || self.state == ConnectionState::Cinematic
            || self.player.is_some()
            || self.netchan.is_none()
        {
            return false;
        }

        let Some(sent) = self.last_packet_sent else {
            return true;
        };
        let elapsed = self.realtime.saturating_sub(sent);
        if self.state == ConnectionState::Connected {
            return elapsed >= CONNECTED_PACKET_INTERVAL_MS;
        }
        let rate = self.config.max_packets.clamp(15, 125) as u64;
        elapsed >= 1000 / rate
    }

    /// Sends the acknowledgements and every unacknowledged reliable command.
    fn write_packet(&mut self) -> Result<(), SessionError> {
        let Some(netchan) = self.netchan.as_mut() else {
            return Ok(());
        };

        let mut msg = Message::new();
        msg.write_long(self.client.server_id);
        msg.write_long(self.client.server_message_sequence);
        msg.write_long(self.client.server_command_sequence);
        for (sequence, command) in self.commands.pending() {
            msg.write_byte(clc::CLIENT_COMMAND);
            msg.write_long(sequence);
            msg.write_string(command);
        }
        msg.write_byte(clc::EOF);
        msg.check_overflow()?;

        let remote = *netchan.remote();
        let fragments = netchan.transmit(msg.as_bytes());
        for fragment in fragments {
            self.transport.send_to(&fragment, &remote)?;
        }
        self.last_packet_sent = Some(self.realtime);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.disconnect_with(DisconnectReason::Requested);
    }

    /// Tears the session down to `Disconnected`. Reentrant calls are ignored.
    fn disconnect_with(&mut self, reason: DisconnectReason) {
        if self.disconnecting {
            return;
        }
        self.disconnecting = true;

        if self.recorder.is_some() {
            if let Err(err) = self.stop_record() {
                log::warn!("Couldn't finish demo recording: {}", err);
            }
        }
        let was_playing = self.player.take().is_some();
        let was_live = self.state != ConnectionState::Disconnected;

        if self.state.is_connected() && self.state != ConnectionState::Cinematic && !was_playing {
            let _ = self.add_reliable_command("disconnect", true);
            for _ in 0..DISCONNECT_PACKETS {
                if let Err(err) = self.write_packet() {
                    log::debug!("disconnect packet not sent: {}", err);
                }
            }
        }

        self.commands.clear();
        self.client = ClientState::default();
        self.netchan = None;
        self.server_address = None;
        self.challenge = 0;
        self.compat = false;
        self.connect_time = None;
        self.connect_packet_count = 0;
        self.last_packet_sent = None;
        self.timeout_count = 0;
        self.backlog.clear();
        self.set_state(ConnectionState::Disconnected);

        if was_live {
            log::info!("{}", reason);
            self.events.push(SessionEvent::Disconnected { reason });
        }
        self.disconnecting = false;
    }

    /// Fatal error path: disconnects and keeps `message` as the reason.
    pub fn drop_connection(&mut self, message: &str) {
        log::warn!("{}", message);
        self.server_message = message.to_string();
        self.disconnect_with(DisconnectReason::Dropped(message.to_string()));
    }

    /// Called by a download collaborator once a file has been fetched.
    pub fn download_finished(&mut self, file: &str, checksum_ok: bool) -> Result<(), SessionError> {
        if checksum_ok {
            return Ok(());
        }
        let err = SessionError::ChecksumMismatch(file.to_string());
        self.drop_connection(&err.to_string());
        Err(err)
    }

    /// Parses one server message from the wire or a demo, then mirrors it into
    /// any recording. A parse failure drops the connection.
    fn handle_server_message(&mut self, payload: &[u8]) {
        let mut msg = Message::from_bytes(payload);
        let events = match self.parser.parse_server_message(&mut msg, &mut self.client) {
            Ok(events) => events,
            Err(err) => {
                self.drop_connection(&format!("Illegible server message: {}", err));
                return;
            }
        };

        self.commands.acknowledge(self.client.reliable_acknowledge);

        if events.contains(ParsedEvents::GAMESTATE) && self.state.is_connected() {
            self.set_state(ConnectionState::Primed);
        } else if events.contains(ParsedEvents::SNAPSHOT) && self.state == ConnectionState::Primed
        {
            self.set_state(ConnectionState::Active);
        }

        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        let reliable_sequence = self.commands.sequence();
        let written = if events.contains(ParsedEvents::GAMESTATE) {
            recorder.write_gamestate(&self.client, reliable_sequence, false)
        } else if events.intersects(ParsedEvents::SNAPSHOT | ParsedEvents::COMMAND) {
            recorder
                .write_snapshot(&self.client, reliable_sequence)
                .map(|_| ())
        } else {
            Ok(())
        };
        if let Err(err) = written {
            log::warn!("Demo write failed, stopping recording: {}", err);
            if let Err(err) = self.stop_record() {
                log::warn!("Couldn't finish demo recording: {}", err);
            }
        }
    }

    /// Keeps pinging visible servers of `source` from `frame` until every one
    /// has an answer or timed out.
    pub fn refresh_pings(&mut self, source: ServerSource) {
        self.ping_sweep = Some(source);
    }

    pub fn is_refreshing_pings(&self) -> bool {
        self.ping_sweep.is_some()
    }

    fn update_ping_sweep(&mut self) -> io::Result<()> {
        let Some(source) = self.ping_sweep else {
            return Ok(());
        };
        let busy = self
            .discovery
            .update_visible_pings(&mut self.transport, source, self.realtime)?;
        if !busy {
            log::debug!("ping sweep finished");
            self.ping_sweep = None;
        }
        Ok(())
    }
}
