use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::file::{DemoReader, DemoRecord};
use super::names::open_demo;
use crate::error::DemoError;
use crate::protocol::NEW_PROTOCOL_VERSION;

#[derive(Debug)]
pub struct DemoPlayer {
    reader: DemoReader<BufReader<File>>,
    path: PathBuf,
    protocol: i32,
    frames: u32,
    started_ms: Option<u64>,
}

impl DemoPlayer {
    pub fn open(demo_dir: &Path, name: &str) -> Result<Self, DemoError> {
        let (file, path, protocol) = open_demo(demo_dir, name)?;
        Ok(Self {
            reader: DemoReader::new(BufReader::new(file)),
            path,
            protocol,
            frames: 0,
            started_ms: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn protocol(&self) -> i32 {
        self.protocol
    }

    /// Demos older than the current protocol use the legacy channel rules.
    pub fn is_legacy(&self) -> bool {
        self.protocol < NEW_PROTOCOL_VERSION
    }

    pub fn next_record(&mut self) -> Result<Option<DemoRecord>, DemoError> {
        self.reader.next_record()
    }

    pub fn count_frame(&mut self, now_ms: u64) {
        self.started_ms.get_or_insert(now_ms);
        self.frames += 1;
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn timedemo_summary(&self, now_ms: u64) -> Option<String> {
        let elapsed = now_ms.saturating_sub(self.started_ms?);
        if elapsed == 0 {
            return None;
        }
        let seconds = elapsed as f64 / 1000.0;
        let precision = if elapsed > 10_000 { 1 } else { 2 };
        Some(format!(
            "{} frames, {:.*} seconds: {:.1} fps",
            self.frames,
            precision,
            seconds,
            self.frames as f64 / seconds
        ))
    }
}
