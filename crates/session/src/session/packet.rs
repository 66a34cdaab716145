use std::io;

use super::{ConnectionSession, SessionEvent};
use crate::discovery::ServerSource;
use crate::error::SessionError;
use crate::net::{
    Args, NetAddress, Transport, command_line, info_value, is_connectionless, out_of_band,
    trailing_text,
};
use crate::protocol::PORT_SERVER;

const SERVERS_RESPONSE: &[u8] = b"getserversResponse";
const SERVERS_EXT_RESPONSE: &[u8] = b"getserversExtResponse";

impl<T: Transport> ConnectionSession<T> {
    /// Entry point for every datagram the transport delivers.
    pub(super) fn packet_event(
        &mut self,
        from: &NetAddress,
        data: &[u8],
    ) -> Result<(), SessionError> {
        if data.len() < 5 {
            log::debug!("{}: Runt packet", from);
            return Ok(());
        }

        if is_connectionless(data) {
            if self.connectionless_packet(from, data)? {
                self.last_packet_time = self.realtime;
            }
            return Ok(());
        }

        if !self.state.is_connected() || self.player.is_some() {
            return Ok(());
        }

        let Some(netchan) = self.netchan.as_mut() else {
            return Ok(());
        };
        if netchan.remote() != from {
            log::debug!("{}:sequenced packet without connection", from);
            return Ok(());
        }

        // out of order, duplicated, etc
        let Some(message) = netchan.process(data) else {
            return Ok(());
        };

        self.client.server_message_sequence = message.sequence;
        self.last_packet_time = self.realtime;
        self.handle_server_message(&message.payload);
        Ok(())
    }

    /// Dispatches an out of band command. Returns true when the packet came
    /// from the server and counts as traffic.
    fn connectionless_packet(
        &mut self,
        from: &NetAddress,
        data: &[u8],
    ) -> Result<bool, SessionError> {
        let body = &data[4..];
        if body.starts_with(SERVERS_EXT_RESPONSE) || body.starts_with(SERVERS_RESPONSE) {
            let extended = body.starts_with(SERVERS_EXT_RESPONSE);
            let (source, count) = self.discovery.servers_response(from, body, extended);
            self.events
                .push(SessionEvent::ServerListUpdated { source, count });
            return Ok(false);
        }

        let line = command_line(data);
        let args = Args::tokenize(&line);
        let command = args.command();
        log::debug!("CL packet {}: {}", from, line);

        if command.eq_ignore_ascii_case("challengeResponse") {
            return Ok(self.challenge_response(from, &args));
        }
        if command.eq_ignore_ascii_case("connectResponse") {
            return Ok(self.connect_response(from, &args));
        }
        if command.eq_ignore_ascii_case("infoResponse") {
            let info = trailing_text(data);
            self.discovery
                .server_info_packet(from, &info, self.realtime);
            return Ok(false);
        }
        if command.eq_ignore_ascii_case("statusResponse") {
            let body = trailing_text(data);
            if let Some(report) = self.discovery.status_response(from, &body, self.realtime) {
                self.events.push(SessionEvent::ServerStatus(report));
            }
            return Ok(false);
        }
        if command.eq_ignore_ascii_case("echo") {
            let from_server = self.server_address.as_ref() == Some(from);
            if from_server || self.rcon_address.as_ref() == Some(from) {
                if let Err(err) = self.transport.send_to(&out_of_band(args.argv(1)), from) {
                    log::warn!("Couldn't answer echo from {}: {}", from, err);
                }
            }
            return Ok(from_server);
        }
        if command.eq_ignore_ascii_case("keyAuthorize") {
            return Ok(false);
        }
        if command.eq_ignore_ascii_case("motd") {
            self.motd_packet(from, &args);
            return Ok(false);
        }
        if command.eq_ignore_ascii_case("print") {
            let from_server = self.server_address.as_ref() == Some(from);
            if from_server || self.rcon_address.as_ref() == Some(from) {
                let text = trailing_text(data);
                log::info!("{}", text.trim_end());
                self.server_message = text.clone();
                self.events.push(SessionEvent::ServerPrint(text));
            }
            return Ok(from_server);
        }

        log::debug!("Unknown connectionless packet command.");
        Ok(false)
    }

    fn motd_packet(&mut self, from: &NetAddress, args: &Args) {
        if self.update_server.as_ref() != Some(from) {
            return;
        }
        let info = args.argv(1);
        if info_value(info, "challenge") != self.motd_challenge {
            return;
        }
        self.motd = info_value(info, "motd").to_string();
        self.events.push(SessionEvent::Motd(self.motd.clone()));
    }

    fn resolve_server(&self, text: &str) -> Result<NetAddress, SessionError> {
        NetAddress::resolve(text, PORT_SERVER, self.config.family)
            .ok_or_else(|| SessionError::BadServerAddress(text.to_string()))
    }

    /// Broadcasts an info request on the local network.
    pub fn local_servers(&mut self) -> io::Result<()> {
        self.discovery.local_servers(&mut self.transport)
    }

    /// Asks master server `master` (0 for all) for its server list.
    pub fn global_servers(
        &mut self,
        master: usize,
        protocol: &str,
        keywords: &[String],
    ) -> Result<(), SessionError> {
        self.discovery
            .global_servers(&mut self.transport, master, protocol, keywords)
    }

    pub fn ping(&mut self, server: &str) -> Result<NetAddress, SessionError> {
        let address = self.resolve_server(server)?;
        self.discovery
            .ping(&mut self.transport, address, self.realtime)?;
        Ok(address)
    }

    /// Ping of slot `n` as of the last frame; 999 once it timed out.
    pub fn get_ping(&mut self, n: usize) -> Option<(NetAddress, u32)> {
        self.discovery.get_ping(n, self.realtime)
    }

    /// Status text of `server` once it has arrived, requesting it as needed.
    pub fn server_status(&mut self, server: &str) -> Result<Option<String>, SessionError> {
        let address = self.resolve_server(server)?;
        Ok(self
            .discovery
            .server_status(&mut self.transport, address, self.realtime)?)
    }

    /// Requests the status of `server`, reported as `SessionEvent::ServerStatus`.
    pub fn request_status(&mut self, server: &str) -> Result<NetAddress, SessionError> {
        let address = self.resolve_server(server)?;
        self.discovery
            .request_status(&mut self.transport, address, self.realtime)?;
        Ok(address)
    }

    pub fn add_favorite(&mut self, server: &str) -> Result<bool, SessionError> {
        let address = self.resolve_server(server)?;
        Ok(self.discovery.add_favorite(address))
    }

    pub fn server_list_len(&self, source: ServerSource) -> usize {
        self.discovery.list(source).len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{connected, remote, session};
    use super::super::{ConnectionState, DisconnectReason};
    use super::*;
    use crate::msg::Message;
    use crate::net::{MemoryTransport, NetSide, Netchan, out_of_band_data};
    use crate::config::SessionConfig;
    use crate::protocol::svc;

    fn stranger() -> NetAddress {
        NetAddress::Ip("198.51.100.9:27960".parse().unwrap())
    }

    /// Receives normally but fails every send.
    #[derive(Default)]
    struct SendFails {
        inbox: MemoryTransport,
    }

    impl Transport for SendFails {
        fn send_to(&mut self, _data: &[u8], _to: &NetAddress) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::HostUnreachable, "no route"))
        }

        fn recv(&mut self) -> io::Result<Option<(Vec<u8>, NetAddress)>> {
            self.inbox.recv()
        }
    }

    fn deliver(session: &mut ConnectionSession<MemoryTransport>, text: &str, from: NetAddress) {
        session.transport_mut().inject(out_of_band(text), from);
        session.frame(session.realtime + 1).unwrap();
    }

    #[test]
    fn hijacked_challenge_is_ignored() {
        let mut session = session();
        session.connect("203.0.113.5").unwrap();
        session.frame(0).unwrap();
        session.transport_mut().take_sent();
        let mine = session.challenge();

        let forged = format!("challengeResponse 99 {} 71", mine.wrapping_add(3));
        deliver(&mut session, &forged, stranger());
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert_eq!(session.server_address(), Some(&remote()));

        let genuine = format!("challengeResponse 99 {} 71", mine);
        deliver(&mut session, &genuine, remote());
        assert_eq!(session.state(), ConnectionState::Challenging);
        assert_eq!(session.challenge(), 99);

        let changes = session
            .poll_events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::StateChanged {
                        to: ConnectionState::Challenging,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(changes, 1);

        // The connect request goes out in the same frame.
        let sent = session.transport_mut().take_sent();
        assert_eq!(sent.len(), 1);
        assert!(command_line(&sent[0].0).starts_with("connect \""));

        deliver(&mut session, &genuine, remote());
        assert_eq!(session.challenge(), 99);
    }

    #[test]
    fn unknown_commands_and_runts_are_harmless() {
        let mut session = connected();
        deliver(&mut session, "fancyNewCommand 1 2 3", remote());
        session.transport_mut().inject(vec![0xff, 0xff], remote());
        session.frame(10).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn failed_echo_reply_keeps_the_frame_going() {
        let mut session = ConnectionSession::new(SessionConfig::default(), SendFails::default());
        session.server_address = Some(remote());
        let inbox = &mut session.transport_mut().inbox;
        inbox.inject(out_of_band("echo ping1"), remote());
        inbox.inject(out_of_band("print\nstill here\n"), remote());

        session.frame(5).unwrap();
        assert_eq!(session.server_message(), "still here\n");
        assert_eq!(session.last_packet_time, 5);
    }

    #[test]
    fn echo_only_reflects_to_known_peers() {
        let mut session = connected();
        session.transport_mut().take_sent();
        session.last_packet_sent = Some(u64::MAX / 2);

        deliver(&mut session, "echo ping1", stranger());
        assert!(session.transport().sent().is_empty());

        deliver(&mut session, "echo ping2", remote());
        let sent = session.transport_mut().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, remote());
        assert_eq!(command_line(&sent[0].0), "ping2");
    }

    #[test]
    fn print_from_strangers_is_dropped() {
        let mut session = connected();
        session
            .transport_mut()
            .inject(out_of_band("print\nServer is full.\n"), stranger());
        session.frame(1).unwrap();
        assert!(session.server_message().is_empty());

        session
            .transport_mut()
            .inject(out_of_band("print\nServer is full.\n"), remote());
        session.frame(2).unwrap();
        assert_eq!(session.server_message(), "Server is full.\n");
        assert!(
            session
                .poll_events()
                .contains(&SessionEvent::ServerPrint("Server is full.\n".into()))
        );
    }

    #[test]
    fn motd_needs_matching_challenge() {
        let mut session = session();
        session.update_server = Some(stranger());
        session.motd_challenge = "1234".into();

        deliver(&mut session, "motd \"\\challenge\\999\\motd\\nope\"", stranger());
        assert!(session.motd().is_empty());
        deliver(&mut session, "motd \"\\challenge\\1234\\motd\\hello\"", remote());
        assert!(session.motd().is_empty());
        deliver(&mut session, "motd \"\\challenge\\1234\\motd\\hello\"", stranger());
        assert_eq!(session.motd(), "hello");
    }

    #[test]
    fn server_list_response_is_reported() {
        let mut session = session();
        let mut payload = b"getserversResponse".to_vec();
        payload.extend_from_slice(&[b'\\', 1, 2, 3, 4, 0x6d, 0x38]);
        payload.extend_from_slice(b"\\EOT");
        session
            .transport_mut()
            .inject(out_of_band_data(&payload), stranger());
        session.frame(1).unwrap();

        let events = session.poll_events();
        assert!(events.contains(&SessionEvent::ServerListUpdated {
            source: ServerSource::Global,
            count: 1,
        }));
        assert_eq!(session.server_list_len(ServerSource::Global), 1);
    }

    #[test]
    fn sequenced_packets_from_strangers_are_ignored() {
        let mut session = connected();
        let mut server = Netchan::setup(NetSide::Server, remote(), 0, 7, false);
        let mut msg = Message::new();
        msg.write_long(0);
        msg.write_byte(svc::BAD);
        let packet = server.transmit(msg.as_bytes()).remove(0);

        session.transport_mut().inject(packet.clone(), stranger());
        session.frame(1).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);

        // svc_bad is illegible and drops the connection.
        session.transport_mut().inject(packet, remote());
        session.frame(2).unwrap();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.poll_events().iter().any(|e| matches!(
            e,
            SessionEvent::Disconnected {
                reason: DisconnectReason::Dropped(_)
            }
        )));
    }
}
