use super::{ConnectionSession, ConnectionState};
use crate::error::SessionError;
use crate::net::{
    AddressFamily, Args, NetAddress, NetSide, Netchan, Transport, atoi, out_of_band,
    remove_info_key, set_info_value,
};
use crate::protocol::{
    CLIENT_VERSION, MAX_INFO_STRING, MAX_USERINFO_LENGTH, NEW_PROTOCOL_VERSION, PORT_SERVER,
    PORT_UPDATE, PROTOCOL_VERSION,
};

/// Drops a `q3a:/` scheme, leading slashes and one trailing slash.
fn strip_server_text(text: &str) -> &str {
    let text = text.trim();
    let text = match text.get(..5) {
        Some(scheme) if scheme.eq_ignore_ascii_case("q3a:/") => &text[5..],
        _ => text,
    };
    let text = text.trim_start_matches('/');
    text.strip_suffix('/').unwrap_or(text)
}

impl<T: Transport> ConnectionSession<T> {
    /// Starts connecting to `server`. Local addresses skip the challenge
    /// request; remote ones get a fresh client challenge.
    pub fn connect(&mut self, server: &str) -> Result<NetAddress, SessionError> {
        let name = strip_server_text(server);
        if name.is_empty() {
            return Err(SessionError::BadServerAddress(server.to_string()));
        }

        let Some(address) = NetAddress::resolve(name, PORT_SERVER, self.config.family) else {
            log::warn!("Bad server address - {}", name);
            return Err(SessionError::BadServerAddress(name.to_string()));
        };

        self.server_message.clear();
        self.disconnect();

        self.server_name = name.to_string();
        self.server_address = Some(address);
        log::info!("{} resolved to {}", name, address);

        if address.is_local() {
            self.set_state(ConnectionState::Challenging);
        } else {
            self.challenge = rand::random();
            self.set_state(ConnectionState::Connecting);
        }

        self.connect_time = None;
        self.connect_packet_count = 0;
        Ok(address)
    }

    pub fn reconnect(&mut self) -> Result<NetAddress, SessionError> {
        if self.server_name.is_empty() {
            return Err(SessionError::NotConnected);
        }
        let server = self.server_name.clone();
        self.connect(&server)
    }

    /// Resends `getchallenge` or `connect` once per retransmit interval while
    /// the handshake is in progress.
    pub(super) fn check_for_resend(&mut self) -> Result<(), SessionError> {
        if self.player.is_some() {
            return Ok(());
        }
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Challenging
        ) {
            return Ok(());
        }
        if let Some(sent) = self.connect_time {
            if self.realtime.saturating_sub(sent) < self.config.retransmit_ms {
                return Ok(());
            }
        }
        let Some(server) = self.server_address else {
            return Ok(());
        };

        self.connect_time = Some(self.realtime);
        self.connect_packet_count += 1;

        let text = if self.state == ConnectionState::Connecting {
            format!("getchallenge {} {}", self.challenge, self.config.game_name)
        } else {
            let (info, fits) = self.connect_userinfo();
            if !fits {
                log::warn!("Oversize userinfo, you might not be able to join the server");
            }
            format!("connect \"{}\"", info)
        };

        log::debug!("{} #{} to {}", text, self.connect_packet_count, server);
        self.transport.send_to(&out_of_band(&text), &server)?;
        Ok(())
    }

    /// Userinfo for the `connect` request, and whether it fit without loss.
    fn connect_userinfo(&self) -> (String, bool) {
        let mut info = self.config.userinfo.clone();
        if info.len() > MAX_USERINFO_LENGTH - 64 {
            remove_info_key(&mut info, "xp_name");
            remove_info_key(&mut info, "xp_country");
        }

        let protocol = if self.compat {
            PROTOCOL_VERSION
        } else {
            NEW_PROTOCOL_VERSION
        };

        let mut fits = info.len() <= MAX_USERINFO_LENGTH;
        fits &= set_info_value(&mut info, "protocol", &protocol.to_string(), MAX_USERINFO_LENGTH);
        fits &= set_info_value(
            &mut info,
            "qport",
            &self.config.qport.to_string(),
            MAX_USERINFO_LENGTH,
        );
        fits &= set_info_value(
            &mut info,
            "challenge",
            &self.challenge.to_string(),
            MAX_USERINFO_LENGTH,
        );
        set_info_value(&mut info, "client", CLIENT_VERSION, MAX_USERINFO_LENGTH);
        (info, fits)
    }

    /// `challengeResponse <server challenge> <client challenge> <protocol>`
    pub(super) fn challenge_response(&mut self, from: &NetAddress, args: &Args) -> bool {
        if self.state != ConnectionState::Connecting {
            log::debug!("Unwanted challenge response received. Ignored.");
            return false;
        }

        let echoed = args.argv(2);
        let echo_matches = !echoed.is_empty() && atoi(echoed) == self.challenge;

        let mut compat = true;
        let version = args.argv(3);
        if !version.is_empty() {
            let version = atoi(version);
            if version == NEW_PROTOCOL_VERSION {
                compat = false;
            } else if version != PROTOCOL_VERSION {
                log::warn!(
                    "Server reports protocol version {}, we have {}. Trying legacy protocol {}.",
                    version,
                    NEW_PROTOCOL_VERSION,
                    PROTOCOL_VERSION
                );
            }
        }

        if compat {
            if self.server_address.as_ref() != Some(from) && !echo_matches {
                log::debug!("Challenge response received from unexpected source. Ignored.");
                return false;
            }
        } else if !echo_matches {
            log::info!("Bad challenge for challengeResponse. Ignored.");
            return false;
        }

        self.compat = compat;
        self.challenge = atoi(args.argv(1));
        self.set_state(ConnectionState::Challenging);
        self.connect_packet_count = 0;
        self.connect_time = None;

        // A proxy may hand the connection to another address.
        self.server_address = Some(*from);
        log::debug!("challengeResponse: {}", self.challenge);
        true
    }

    /// `connectResponse [challenge]` opens the sequenced channel.
    pub(super) fn connect_response(&mut self, from: &NetAddress, args: &Args) -> bool {
        if self.state.is_connected() {
            log::info!("Dup connect received. Ignored.");
            return false;
        }
        if self.state != ConnectionState::Challenging {
            log::info!("connectResponse packet while not connecting. Ignored.");
            return false;
        }
        if self.server_address.as_ref() != Some(from) {
            log::info!("connectResponse from wrong address. Ignored.");
            return false;
        }

        if !self.compat {
            let challenge = args.argv(1);
            if challenge.is_empty() {
                log::info!("Bad connectResponse received. Ignored.");
                return false;
            }
            if atoi(challenge) != self.challenge {
                log::info!("ConnectResponse with bad challenge received. Ignored.");
                return false;
            }
        }

        self.netchan = Some(Netchan::setup(
            NetSide::Client,
            *from,
            self.config.qport,
            self.challenge,
            self.compat,
        ));
        self.set_state(ConnectionState::Connected);
        self.last_packet_sent = None;
        self.events
            .push(super::SessionEvent::Connected { server: *from });
        log::info!("Connected to {}", from);
        true
    }

    /// Sends a remote console command to the connected server, or else to the
    /// configured rcon address.
    pub fn rcon(&mut self, password: &str, command: &str) -> Result<(), SessionError> {
        let connected = self
            .netchan
            .as_ref()
            .filter(|_| self.state.is_connected())
            .map(|netchan| *netchan.remote());

        let target = match connected {
            Some(remote) => remote,
            None => {
                let text = self
                    .config
                    .rcon_address
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .ok_or(SessionError::NoRconAddress)?;
                NetAddress::resolve(text, PORT_SERVER, AddressFamily::Any)
                    .ok_or_else(|| SessionError::BadServerAddress(text.to_string()))?
            }
        };
        self.rcon_address = Some(target);

        let text = if password.contains(' ') {
            format!("rcon \"{}\" {}", password, command)
        } else {
            format!("rcon {} {}", password, command)
        };
        self.transport.send_to(&out_of_band(&text), &target)?;
        Ok(())
    }

    /// Asks the update server for the message of the day.
    pub fn request_motd(&mut self) -> Result<(), SessionError> {
        let Some(name) = self
            .config
            .update_server
            .clone()
            .filter(|name| !name.trim().is_empty())
        else {
            return Ok(());
        };

        log::info!("Resolving {}", name);
        let Some(address) = NetAddress::resolve(&name, PORT_UPDATE, AddressFamily::V4) else {
            log::info!("Couldn't resolve address");
            return Err(SessionError::BadServerAddress(name));
        };
        log::info!("{} resolved to {}", name, address);
        self.update_server = Some(address);

        self.motd_challenge = rand::random::<i32>().to_string();
        let mut info = String::new();
        set_info_value(&mut info, "challenge", &self.motd_challenge, MAX_INFO_STRING);
        set_info_value(&mut info, "version", CLIENT_VERSION, MAX_INFO_STRING);

        let text = format!("getmotd \"{}\"\n", info);
        self.transport.send_to(&out_of_band(&text), &address)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::SessionEvent;
    use super::super::tests::{remote, session};
    use super::*;
    use crate::config::SessionConfig;
    use crate::net::{MemoryTransport, command_line, info_value};

    fn sent_lines(session: &mut ConnectionSession<MemoryTransport>) -> Vec<String> {
        session
            .transport_mut()
            .take_sent()
            .iter()
            .map(|(data, _)| command_line(data))
            .collect()
    }

    #[test]
    fn strips_scheme_and_slashes() {
        assert_eq!(strip_server_text("q3a://203.0.113.5/"), "203.0.113.5");
        assert_eq!(strip_server_text("Q3A:/host:27961"), "host:27961");
        assert_eq!(strip_server_text("//host"), "host");
        assert_eq!(strip_server_text("/"), "");
    }

    #[test]
    fn remote_connect_requests_a_challenge() {
        let mut session = session();
        let address = session.connect("203.0.113.5").unwrap();
        assert_eq!(address, remote());
        assert_eq!(session.state(), ConnectionState::Connecting);

        session.frame(0).unwrap();
        let challenge = session.challenge();
        assert_eq!(
            sent_lines(&mut session),
            vec![format!("getchallenge {} Quake3Arena", challenge)]
        );
        assert_eq!(session.connect_packet_count(), 1);
    }

    #[test]
    fn resend_waits_for_the_retransmit_interval() {
        let mut session = session();
        session.connect("203.0.113.5").unwrap();
        session.frame(100).unwrap();
        session.frame(3099).unwrap();
        session.frame(3100).unwrap();
        assert_eq!(sent_lines(&mut session).len(), 2);
        assert_eq!(session.connect_packet_count(), 2);
    }

    #[test]
    fn lan_connect_goes_straight_to_connect_request() {
        let mut session = session();
        session.connect("192.168.1.20:27961").unwrap();
        assert_eq!(session.state(), ConnectionState::Challenging);

        session.frame(0).unwrap();
        let lines = sent_lines(&mut session);
        assert_eq!(lines.len(), 1);
        let args = Args::tokenize(&lines[0]);
        assert_eq!(args.command(), "connect");
        let info = args.argv(1);
        assert_eq!(info_value(info, "protocol"), "71");
        assert_eq!(info_value(info, "challenge"), "0");
        assert_eq!(info_value(info, "name"), "UnnamedPlayer");
        assert_eq!(
            info_value(info, "qport"),
            session.config().qport.to_string()
        );
    }

    #[test]
    fn bad_address_keeps_session_idle() {
        let mut session = session();
        let err = session.connect("q3a:///").unwrap_err();
        assert!(matches!(err, SessionError::BadServerAddress(_)));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn legacy_response_from_server_needs_no_echo() {
        let mut session = session();
        session.connect("203.0.113.5").unwrap();

        assert!(session.challenge_response(&remote(), &Args::tokenize("challengeResponse 55")));
        assert!(session.is_compat());
        assert_eq!(session.challenge(), 55);
        assert_eq!(session.state(), ConnectionState::Challenging);
    }

    #[test]
    fn new_protocol_requires_the_echoed_challenge() {
        let mut session = session();
        session.connect("203.0.113.5").unwrap();
        let mine = session.challenge();

        let wrong = format!("challengeResponse 55 {} 71", mine.wrapping_add(1));
        assert!(!session.challenge_response(&remote(), &Args::tokenize(&wrong)));
        assert_eq!(session.state(), ConnectionState::Connecting);

        let right = format!("challengeResponse 55 {} 71", mine);
        assert!(session.challenge_response(&remote(), &Args::tokenize(&right)));
        assert!(!session.is_compat());
    }

    #[test]
    fn connect_response_checks_challenge_then_opens_channel() {
        let mut session = session();
        session.connect("203.0.113.5").unwrap();
        let mine = session.challenge();
        let response = format!("challengeResponse 4242 {} 71", mine);
        session.challenge_response(&remote(), &Args::tokenize(&response));
        session.poll_events();

        assert!(!session.connect_response(&remote(), &Args::tokenize("connectResponse")));
        assert!(!session.connect_response(&remote(), &Args::tokenize("connectResponse 1")));
        let stranger = NetAddress::Ip("198.51.100.9:27960".parse().unwrap());
        assert!(!session.connect_response(&stranger, &Args::tokenize("connectResponse 4242")));
        assert_eq!(session.state(), ConnectionState::Challenging);

        assert!(session.connect_response(&remote(), &Args::tokenize("connectResponse 4242")));
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.netchan().unwrap().remote(), &remote());
        assert!(session.poll_events().contains(&SessionEvent::Connected { server: remote() }));

        assert!(!session.connect_response(&remote(), &Args::tokenize("connectResponse 4242")));
    }

    #[test]
    fn rcon_needs_a_destination() {
        let mut session = session();
        assert!(matches!(
            session.rcon("secret", "status"),
            Err(SessionError::NoRconAddress)
        ));

        let mut session = ConnectionSession::new(
            SessionConfig {
                rcon_address: Some("203.0.113.5".into()),
                ..SessionConfig::default()
            },
            MemoryTransport::new(),
        );
        session.rcon("two words", "map q3dm17").unwrap();
        let sent = session.transport_mut().take_sent();
        assert_eq!(sent[0].1, remote());
        assert_eq!(command_line(&sent[0].0), "rcon \"two words\" map q3dm17");
    }

    #[test]
    fn motd_request_carries_a_challenge() {
        let mut session = ConnectionSession::new(
            SessionConfig {
                update_server: Some("203.0.113.7".into()),
                ..SessionConfig::default()
            },
            MemoryTransport::new(),
        );
        session.request_motd().unwrap();

        let sent = session.transport_mut().take_sent();
        assert_eq!(sent[0].1.port(), PORT_UPDATE);
        let args = Args::tokenize(&command_line(&sent[0].0));
        assert_eq!(args.command(), "getmotd");
        assert_eq!(info_value(args.argv(1), "challenge"), session.motd_challenge);
    }
}
