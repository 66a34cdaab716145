mod state;

pub use state::{
    CS_SERVERINFO, CS_SYSTEMINFO, ClientState, GameState, ServerCommandRing, Snapshot,
    SnapshotRing,
};

use bitflags::bitflags;

use crate::error::ParseError;
use crate::msg::{EntityState, Message, read_delta_entity, read_delta_playerstate};
use crate::protocol::{
    ENTITYNUM_END, GENTITYNUM_BITS, MAX_CONFIGSTRINGS, MAX_GENTITIES, MAX_MAP_AREA_BYTES, svc,
};

bitflags! {
    /// Message classes seen while parsing one server message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParsedEvents: u8 {
        const GAMESTATE = 1 << 0;
        const SNAPSHOT = 1 << 1;
        const COMMAND = 1 << 2;
    }
}

pub trait MessageParser {
    /// Parses one sequenced server message into `client`. The caller has already
    /// set `client.server_message_sequence` for this message.
    fn parse_server_message(
        &mut self,
        msg: &mut Message,
        client: &mut ClientState,
    ) -> Result<ParsedEvents, ParseError>;
}

#[derive(Debug, Default)]
pub struct WireParser;

impl MessageParser for WireParser {
    fn parse_server_message(
        &mut self,
        msg: &mut Message,
        client: &mut ClientState,
    ) -> Result<ParsedEvents, ParseError> {
        let mut events = ParsedEvents::empty();

        client.reliable_acknowledge = msg.read_long()?;

        loop {
            let cmd = msg.read_byte()?;
            match cmd {
                svc::EOF => break,
                svc::NOP => {}
                svc::SERVER_COMMAND => {
                    if parse_command_string(msg, client)? {
                        events |= ParsedEvents::COMMAND;
                    }
                }
                svc::GAMESTATE => {
                    parse_gamestate(msg, client)?;
                    events |= ParsedEvents::GAMESTATE;
                }
                svc::SNAPSHOT => {
                    if parse_snapshot(msg, client)? {
                        events |= ParsedEvents::SNAPSHOT;
                    }
                }
                svc::DOWNLOAD => return Err(ParseError::DownloadUnsupported),
                other => return Err(ParseError::IllegibleMessage(other)),
            }
        }

        Ok(events)
    }
}

fn parse_command_string(msg: &mut Message, client: &mut ClientState) -> Result<bool, ParseError> {
    let sequence = msg.read_long()?;
    let text = msg.read_string()?;

    if client.server_command_sequence >= sequence {
        return Ok(false);
    }

    client.server_command_sequence = sequence;
    client.server_commands.set(sequence, text);
    Ok(true)
}

fn parse_gamestate(msg: &mut Message, client: &mut ClientState) -> Result<(), ParseError> {
    client.clear_gamestate();
    client.server_command_sequence = msg.read_long()?;

    loop {
        let cmd = msg.read_byte()?;
        match cmd {
            svc::EOF => break,
            svc::CONFIGSTRING => {
                let index = msg.read_short()? as i32;
                if index < 0 || index as usize >= MAX_CONFIGSTRINGS {
                    return Err(ParseError::ConfigstringIndex(index));
                }
                let value = msg.read_big_string()?;
                client.game_state.set_configstring(index as usize, value);
            }
            svc::BASELINE => {
                let number = msg.read_bits(GENTITYNUM_BITS)?;
                if number as usize >= MAX_GENTITIES {
                    return Err(ParseError::BaselineNumber(number));
                }
                let null = EntityState::default();
                let baseline = read_delta_entity(msg, &null, number)?
                    .unwrap_or(EntityState::with_number(number));
                client.set_baseline(baseline);
            }
            other => return Err(ParseError::BadGamestateCommand(other)),
        }
    }

    client.client_num = msg.read_long()?;
    client.checksum_feed = msg.read_long()?;
    client.update_server_id();
    Ok(())
}

/// Returns true when a valid snapshot was stored.
fn parse_snapshot(msg: &mut Message, client: &mut ClientState) -> Result<bool, ParseError> {
    let mut snap = Snapshot {
        server_command_num: client.server_command_sequence,
        server_time: msg.read_long()?,
        message_num: client.server_message_sequence,
        ..Snapshot::default()
    };

    let delta = msg.read_byte()?;
    snap.delta_num = if delta == 0 {
        -1
    } else {
        snap.message_num.wrapping_sub(delta as i32)
    };
    snap.snap_flags = msg.read_byte()?;

    let old = if snap.delta_num <= 0 {
        snap.valid = true;
        None
    } else {
        match client.snapshots.get(snap.delta_num) {
            Some(old) => {
                snap.valid = true;
                Some(old.clone())
            }
            None => {
                log::warn!(
                    "Delta from invalid frame {} for message {}",
                    snap.delta_num,
                    snap.message_num
                );
                None
            }
        }
    };

    let area_bytes = msg.read_byte()?;
    if area_bytes as usize > MAX_MAP_AREA_BYTES {
        return Err(ParseError::AreaMask(area_bytes));
    }
    snap.area_mask = msg.read_data(area_bytes as usize)?;

    snap.player_state = read_delta_playerstate(msg, old.as_ref().map(|o| &o.player_state))?;
    snap.entities = parse_packet_entities(msg, client, old.as_ref())?;

    if !snap.valid {
        return Ok(false);
    }

    client.snapshots.push(snap.clone());
    client.snap = snap;
    client.new_snapshots = true;
    Ok(true)
}

fn parse_packet_entities(
    msg: &mut Message,
    client: &ClientState,
    old: Option<&Snapshot>,
) -> Result<Vec<EntityState>, ParseError> {
    let old_entities: &[EntityState] = old.map(|o| o.entities.as_slice()).unwrap_or_default();
    let mut old_iter = old_entities.iter().peekable();
    let mut entities = Vec::new();

    loop {
        let number = msg.read_bits(GENTITYNUM_BITS)?;
        if number == ENTITYNUM_END {
            break;
        }

        while let Some(unchanged) = old_iter.next_if(|o| o.number < number) {
            entities.push(*unchanged);
        }

        let from = match old_iter.next_if(|o| o.number == number) {
            Some(previous) => *previous,
            None => client.baseline(number),
        };
        if let Some(entity) = read_delta_entity(msg, &from, number)? {
            entities.push(entity);
        }
    }

    entities.extend(old_iter.copied());
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::msg::{PlayerState, write_delta_entity, write_delta_playerstate};

    fn gamestate_message() -> Message {
        let mut msg = Message::new();
        msg.write_long(0);
        msg.write_byte(svc::GAMESTATE);
        msg.write_long(12);
        msg.write_byte(svc::CONFIGSTRING);
        msg.write_short(0);
        msg.write_big_string("\\mapname\\q3dm6");
        msg.write_byte(svc::CONFIGSTRING);
        msg.write_short(1);
        msg.write_big_string("\\sv_serverid\\99");
        let baseline = EntityState {
            number: 40,
            e_type: 3,
            ..EntityState::default()
        };
        msg.write_byte(svc::BASELINE);
        write_delta_entity(&mut msg, &EntityState::default(), Some(&baseline), true);
        msg.write_byte(svc::EOF);
        msg.write_long(2);
        msg.write_long(0x5eed);
        msg.write_byte(svc::EOF);
        msg
    }

    fn snapshot_message(
        delta: u8,
        entities: &[(Option<&EntityState>, Option<&EntityState>)],
    ) -> Message {
        let mut msg = Message::new();
        msg.write_long(0);
        msg.write_byte(svc::SNAPSHOT);
        msg.write_long(1000);
        msg.write_byte(delta);
        msg.write_byte(0);
        msg.write_byte(1);
        msg.write_byte(0xff);
        write_delta_playerstate(&mut msg, None, &PlayerState::default());
        for (from, to) in entities {
            let from = from.copied().unwrap_or_default();
            write_delta_entity(&mut msg, &from, *to, true);
        }
        msg.write_bits(ENTITYNUM_END, GENTITYNUM_BITS);
        msg.write_byte(svc::EOF);
        msg
    }

    #[test]
    fn gamestate_fills_client_state() {
        let mut client = ClientState::default();
        let mut msg = Message::from_bytes(gamestate_message().as_bytes());

        let events = WireParser.parse_server_message(&mut msg, &mut client).unwrap();
        assert_eq!(events, ParsedEvents::GAMESTATE);
        assert_eq!(client.server_command_sequence, 12);
        assert_eq!(client.game_state.configstring(0), "\\mapname\\q3dm6");
        assert_eq!(client.baseline(40).e_type, 3);
        assert_eq!(client.client_num, 2);
        assert_eq!(client.checksum_feed, 0x5eed);
        assert_eq!(client.server_id, 99);
    }

    #[test]
    fn stale_server_commands_are_ignored() {
        let mut client = ClientState::default();
        client.server_command_sequence = 5;

        let mut msg = Message::new();
        msg.write_long(0);
        msg.write_byte(svc::SERVER_COMMAND);
        msg.write_long(5);
        msg.write_string("print old");
        msg.write_byte(svc::SERVER_COMMAND);
        msg.write_long(6);
        msg.write_string("print new");
        msg.write_byte(svc::EOF);

        let mut msg = Message::from_bytes(msg.as_bytes());
        let events = WireParser.parse_server_message(&mut msg, &mut client).unwrap();
        assert_eq!(events, ParsedEvents::COMMAND);
        assert_eq!(client.server_command_sequence, 6);
        assert_eq!(client.server_commands.get(6), "print new");
    }

    #[test]
    fn delta_snapshot_merges_entities() {
        let mut client = ClientState::default();
        let a = EntityState {
            number: 3,
            origin: Vec3::new(1.0, 1.0, 1.0),
            ..EntityState::default()
        };
        let b = EntityState::with_number(8);
        let c = EntityState {
            number: 12,
            frame: 4,
            ..EntityState::default()
        };

        client.server_message_sequence = 10;
        let first = snapshot_message(0, &[(None, Some(&a)), (None, Some(&b))]);
        let mut msg = Message::from_bytes(first.as_bytes());
        let events = WireParser.parse_server_message(&mut msg, &mut client).unwrap();
        assert!(events.contains(ParsedEvents::SNAPSHOT));
        assert_eq!(client.snap.entities.len(), 2);

        let mut moved = a;
        moved.origin.x = 5.0;
        client.server_message_sequence = 11;
        let second = snapshot_message(
            1,
            &[(Some(&a), Some(&moved)), (Some(&b), None), (None, Some(&c))],
        );
        let mut msg = Message::from_bytes(second.as_bytes());
        WireParser.parse_server_message(&mut msg, &mut client).unwrap();

        assert_eq!(client.snap.entities, vec![moved, c]);
        assert_eq!(client.snap.delta_num, 10);
    }

    #[test]
    fn delta_from_missing_frame_is_invalid() {
        let mut client = ClientState::default();
        client.server_message_sequence = 40;
        let msg = snapshot_message(3, &[]);
        let mut msg = Message::from_bytes(msg.as_bytes());

        let events = WireParser.parse_server_message(&mut msg, &mut client).unwrap();
        assert!(!events.contains(ParsedEvents::SNAPSHOT));
        assert!(!client.snap.valid);
    }

    #[test]
    fn delta_at_sequence_floor_does_not_overflow() {
        let mut client = ClientState::default();
        client.server_message_sequence = i32::MIN;
        let msg = snapshot_message(1, &[]);
        let mut msg = Message::from_bytes(msg.as_bytes());

        let events = WireParser.parse_server_message(&mut msg, &mut client).unwrap();
        assert!(!events.contains(ParsedEvents::SNAPSHOT));
        assert_eq!(client.snap.message_num, 0);
    }

    #[test]
    fn unknown_op_is_illegible() {
        let mut msg = Message::new();
        msg.write_long(0);
        msg.write_byte(42);
        let mut msg = Message::from_bytes(msg.as_bytes());
        let err = WireParser
            .parse_server_message(&mut msg, &mut ClientState::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::IllegibleMessage(42)));
    }
}
