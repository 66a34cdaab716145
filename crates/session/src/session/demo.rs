use std::path::PathBuf;

use chrono::Local;

use super::{ConnectionSession, ConnectionState, DisconnectReason, SessionEvent};
use crate::demo::{DemoPlayer, DemoRecorder, StopOutcome, record_base};
use crate::error::{DemoError, SessionError};
use crate::net::Transport;
use crate::protocol::{NEW_PROTOCOL_VERSION, PROTOCOL_VERSION};

impl<T: Transport> ConnectionSession<T> {
    /// Starts recording the current level. Returns the base path of the demo,
    /// without extension.
    pub fn record(&mut self, name: Option<&str>) -> Result<PathBuf, SessionError> {
        if self.recorder.is_some() {
            log::info!("Already recording.");
            return Err(SessionError::AlreadyRecording);
        }
        if self.state != ConnectionState::Active {
            log::info!("You must be in a level to record.");
            return Err(SessionError::NotInLevel);
        }

        let (base, explicit) = record_base(&self.config.demo_dir, name, &Local::now());
        let mut recorder = DemoRecorder::create(base, explicit)?;
        recorder.write_gamestate(&self.client, self.commands.sequence(), true)?;

        let base = recorder.base().to_path_buf();
        self.recorder = Some(recorder);
        Ok(base)
    }

    pub fn stop_record(&mut self) -> Result<StopOutcome, SessionError> {
        let Some(recorder) = self.recorder.take() else {
            log::info!("Not recording a demo.");
            return Ok(StopOutcome::NotRecording);
        };

        let protocol = if self.compat || self.player.is_some() {
            PROTOCOL_VERSION
        } else {
            NEW_PROTOCOL_VERSION
        };
        let outcome = recorder.finish(protocol)?;
        log::info!("Stopped demo recording.");
        Ok(outcome)
    }

    /// Opens a demo and replays it up to its first gamestate. A demo that
    /// can't be opened leaves the session untouched.
    pub fn play_demo(&mut self, name: &str) -> Result<(), SessionError> {
        let player = DemoPlayer::open(&self.config.demo_dir, name)?;

        self.disconnect();

        self.compat = player.is_legacy();
        self.server_name = name.to_string();
        self.player = Some(player);
        self.last_packet_time = self.realtime;
        self.set_state(ConnectionState::Connected);

        while self.state == ConnectionState::Connected && self.player.is_some() {
            self.read_demo_message();
        }
        Ok(())
    }

    /// Feeds the next demo record through the live parser. The end of the
    /// file finishes playback.
    pub(super) fn read_demo_message(&mut self) {
        let Some(player) = self.player.as_mut() else {
            return;
        };

        let record = match player.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.demo_completed();
                return;
            }
            Err(err @ DemoError::Oversized(_)) => {
                self.drop_connection(&format!("CL_ReadDemoMessage: {}", err));
                return;
            }
            Err(err) => {
                log::warn!("Demo read failed: {}", err);
                self.demo_completed();
                return;
            }
        };

        player.count_frame(self.realtime);
        self.client.server_message_sequence = record.sequence;
        self.last_packet_time = self.realtime;

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.sync_command_sequence(self.client.server_command_sequence);
        }

        self.handle_server_message(&record.payload);
    }

    fn demo_completed(&mut self) {
        let timedemo = if self.config.timedemo {
            self.player
                .as_ref()
                .and_then(|player| player.timedemo_summary(self.realtime))
        } else {
            None
        };
        if let Some(summary) = &timedemo {
            log::info!("{}", summary);
        }

        self.disconnect_with(DisconnectReason::DemoCompleted);
        self.events.push(SessionEvent::DemoCompleted {
            next_demo: self.config.next_demo.clone(),
            timedemo,
        });
    }
}
