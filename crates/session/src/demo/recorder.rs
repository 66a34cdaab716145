use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::file::DemoWriter;
use super::names::{append_suffix, final_record_path};
use crate::error::DemoError;
use crate::msg::{EntityState, Message, write_delta_entity, write_delta_playerstate};
use crate::parse::{ClientState, Snapshot};
use crate::protocol::{ENTITYNUM_END, GENTITYNUM_BITS, MAX_RELIABLE_COMMANDS, svc};

/// The last snapshot written to the file, the base for the next delta.
#[derive(Debug, Clone)]
pub struct DemoStreamState {
    pub saved_snapshot: Snapshot,
}

impl DemoStreamState {
    pub fn saved_entities(&self) -> &[EntityState] {
        &self.saved_snapshot.entities
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NotRecording,
    Saved(PathBuf),
    /// No usable final name; the temp file was left in place.
    KeptTemp(PathBuf),
}

#[derive(Debug)]
pub struct DemoRecorder {
    writer: DemoWriter<BufWriter<File>>,
    base: PathBuf,
    explicit_name: bool,
    message_sequence: i32,
    command_sequence: i32,
    delta_num: u8,
    stream: Option<DemoStreamState>,
}

impl DemoRecorder {
    /// Opens `<base>.tmp` for writing. Nothing is written yet.
    pub fn create(base: PathBuf, explicit_name: bool) -> Result<Self, DemoError> {
        let temp = append_suffix(&base, ".tmp");
        if let Some(parent) = temp.parent() {
            fs::create_dir_all(parent).map_err(|source| DemoError::Create {
                path: temp.clone(),
                source,
            })?;
        }
        let file = File::create(&temp).map_err(|source| DemoError::Create {
            path: temp.clone(),
            source,
        })?;

        log::info!("recording to {}.", base.display());

        Ok(Self {
            writer: DemoWriter::new(BufWriter::new(file)),
            base,
            explicit_name,
            message_sequence: 0,
            command_sequence: 0,
            delta_num: 0,
            stream: None,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn temp_path(&self) -> PathBuf {
        append_suffix(&self.base, ".tmp")
    }

    pub fn message_sequence(&self) -> i32 {
        self.message_sequence
    }

    pub fn command_sequence(&self) -> i32 {
        self.command_sequence
    }

    pub fn delta_num(&self) -> u8 {
        self.delta_num
    }

    pub fn stream_state(&self) -> Option<&DemoStreamState> {
        self.stream.as_ref()
    }

    /// Commands up to `sequence` are treated as already in the file.
    pub fn sync_command_sequence(&mut self, sequence: i32) {
        self.command_sequence = sequence;
    }

    fn write_server_commands(&mut self, msg: &mut Message, client: &ClientState) {
        let server_sequence = client.server_command_sequence;
        if self.command_sequence < server_sequence {
            let window = MAX_RELIABLE_COMMANDS as i32;
            if i64::from(server_sequence) - i64::from(self.command_sequence) > i64::from(window) {
                self.command_sequence = server_sequence.saturating_sub(window);
            }
            for sequence in self.command_sequence + 1..=server_sequence {
                msg.write_byte(svc::SERVER_COMMAND);
                msg.write_long(sequence);
                msg.write_string(client.server_commands.get(sequence));
            }
        }
        self.command_sequence = server_sequence;
    }

    /// Serializes the whole gamestate so playback can start from this point.
    pub fn write_gamestate(
        &mut self,
        client: &ClientState,
        reliable_sequence: i32,
        initial: bool,
    ) -> Result<(), DemoError> {
        let mut msg = Message::new();
        msg.write_long(reliable_sequence);

        if initial {
            self.message_sequence = 1;
            self.command_sequence = client.server_command_sequence;
        } else {
            self.write_server_commands(&mut msg, client);
        }

        self.delta_num = 0;

        msg.write_byte(svc::GAMESTATE);
        msg.write_long(client.server_command_sequence);

        for (index, value) in client.game_state.configstrings() {
            msg.write_byte(svc::CONFIGSTRING);
            msg.write_short(index as i16);
            msg.write_big_string(value);
        }

        let null = EntityState::default();
        for baseline in client.baselines() {
            msg.write_byte(svc::BASELINE);
            write_delta_entity(&mut msg, &null, Some(baseline), true);
        }

        msg.write_byte(svc::EOF);
        msg.write_long(client.client_num);
        msg.write_long(client.checksum_feed);
        msg.write_byte(svc::EOF);
        msg.check_overflow()?;

        self.writer
            .write_record(self.message_sequence - 1, msg.as_bytes())?;
        Ok(())
    }

    /// Writes the current snapshot as a delta against the last one written.
    /// Returns false when there is no valid snapshot to write.
    pub fn write_snapshot(
        &mut self,
        client: &ClientState,
        reliable_sequence: i32,
    ) -> Result<bool, DemoError> {
        let snap = &client.snap;
        if !snap.valid {
            return Ok(false);
        }

        let mut msg = Message::new();
        msg.write_long(reliable_sequence);
        self.write_server_commands(&mut msg, client);

        let old = match self.delta_num {
            0 => None,
            _ => self.stream.as_ref().map(|s| &s.saved_snapshot),
        };

        msg.write_byte(svc::SNAPSHOT);
        msg.write_long(snap.server_time);
        msg.write_byte(self.delta_num);
        msg.write_byte(snap.snap_flags);
        msg.write_byte(snap.area_mask.len() as u8);
        msg.write_data(&snap.area_mask);

        write_delta_playerstate(&mut msg, old.map(|o| &o.player_state), &snap.player_state);
        emit_packet_entities(
            &mut msg,
            client,
            old.map(|o| o.entities.as_slice()),
            &snap.entities,
        );

        msg.write_byte(svc::EOF);
        msg.check_overflow()?;

        self.writer.write_record(self.message_sequence, msg.as_bytes())?;

        self.stream = Some(DemoStreamState {
            saved_snapshot: snap.clone(),
        });
        self.message_sequence += 1;
        self.delta_num = 1;
        Ok(true)
    }

    /// Writes the end marker, closes the file and moves it to its final name.
    pub fn finish(self, protocol: i32) -> Result<StopOutcome, DemoError> {
        let temp = self.temp_path();
        drop(self.writer.finish()?);

        let Some(path) = final_record_path(&self.base, protocol, self.explicit_name) else {
            log::warn!(
                "No free demo name for {}, kept {}",
                self.base.display(),
                temp.display()
            );
            return Ok(StopOutcome::KeptTemp(temp));
        };

        if self.explicit_name && path.exists() {
            if let Err(err) = fs::remove_file(&path) {
                log::warn!("Couldn't remove {}: {}", path.display(), err);
            }
        }
        if let Err(err) = fs::rename(&temp, &path) {
            log::warn!("Couldn't rename {} to {}: {}", temp.display(), path.display(), err);
            return Ok(StopOutcome::KeptTemp(temp));
        }
        Ok(StopOutcome::Saved(path))
    }
}

/// Entity-number merge walk of `from` against `to`, ended by the reserved number.
pub fn emit_packet_entities(
    msg: &mut Message,
    client: &ClientState,
    from: Option<&[EntityState]>,
    to: &[EntityState],
) {
    let from = from.unwrap_or_default();
    let (mut old_index, mut new_index) = (0, 0);

    loop {
        match (from.get(old_index), to.get(new_index)) {
            (None, None) => break,
            (Some(old), Some(new)) if old.number == new.number => {
                write_delta_entity(msg, old, Some(new), false);
                old_index += 1;
                new_index += 1;
            }
            (Some(old), Some(new)) if old.number < new.number => {
                write_delta_entity(msg, old, None, true);
                old_index += 1;
            }
            (Some(old), None) => {
                write_delta_entity(msg, old, None, true);
                old_index += 1;
            }
            (_, Some(new)) => {
                write_delta_entity(msg, &client.baseline(new.number), Some(new), true);
                new_index += 1;
            }
        }
    }

    msg.write_bits(ENTITYNUM_END, GENTITYNUM_BITS);
}
