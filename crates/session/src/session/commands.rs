use crate::protocol::{MAX_RELIABLE_COMMANDS, MAX_STRING_CHARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("reliable command overflow with {unacknowledged} unacknowledged commands")]
pub struct CommandOverflow {
    pub unacknowledged: i32,
}

/// Outgoing reliable text commands, addressed by `sequence & (CAPACITY - 1)`.
#[derive(Debug)]
pub struct ReliableCommandQueue {
    commands: Vec<String>,
    sequence: i32,
    acknowledge: i32,
}

impl Default for ReliableCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliableCommandQueue {
    pub const CAPACITY: i32 = MAX_RELIABLE_COMMANDS as i32;

    pub fn new() -> Self {
        Self {
            commands: vec![String::new(); MAX_RELIABLE_COMMANDS],
            sequence: 0,
            acknowledge: 0,
        }
    }

    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub fn acknowledged(&self) -> i32 {
        self.acknowledge
    }

    pub fn unacknowledged(&self) -> i32 {
        self.sequence - self.acknowledge
    }

    /// A disconnect command may use one slot beyond capacity.
    pub fn push(&mut self, text: &str, is_disconnect: bool) -> Result<i32, CommandOverflow> {
        let unacknowledged = self.unacknowledged();
        let full = if is_disconnect {
            unacknowledged > Self::CAPACITY
        } else {
            unacknowledged >= Self::CAPACITY
        };
        if full {
            return Err(CommandOverflow { unacknowledged });
        }

        self.sequence += 1;
        let slot = Self::slot(self.sequence);
        self.commands[slot] = truncate(text, MAX_STRING_CHARS - 1).to_string();
        Ok(self.sequence)
    }

    /// Applies the peer's acknowledgement. One that fell out of the window
    /// is treated as acknowledging everything.
    pub fn acknowledge(&mut self, acknowledge: i32) {
        if acknowledge < self.sequence - Self::CAPACITY {
            self.acknowledge = self.sequence;
        } else if acknowledge > self.acknowledge && acknowledge <= self.sequence {
            self.acknowledge = acknowledge;
        }
    }

    pub fn get(&self, sequence: i32) -> &str {
        &self.commands[Self::slot(sequence)]
    }

    /// Commands the peer has not acknowledged yet, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = (i32, &str)> {
        (self.acknowledge + 1..=self.sequence).map(|seq| (seq, self.get(seq)))
    }

    pub fn clear(&mut self) {
        for slot in &mut self.commands {
            slot.clear();
        }
        self.sequence = 0;
        self.acknowledge = 0;
    }

    fn slot(sequence: i32) -> usize {
        sequence as usize & (MAX_RELIABLE_COMMANDS - 1)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
