mod entity;
mod player;

pub use entity::{ENTITY_FIELD_BITS, EntityState, read_delta_entity, write_delta_entity};
pub use player::{MAX_STATS, PlayerState, read_delta_playerstate, write_delta_playerstate};

use crate::error::MessageError;
use crate::protocol::{BIG_INFO_STRING, MAX_MSGLEN, MAX_STRING_CHARS};

/// Bit-packed message buffer, least significant bit first.
#[derive(Debug, Clone, Default)]
pub struct Message {
    data: Vec<u8>,
    bits_written: usize,
    bits_read: usize,
    overflowed: bool,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            bits_written: bytes.len() * 8,
            bits_read: 0,
            overflowed: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn check_overflow(&self) -> Result<(), MessageError> {
        if self.overflowed {
            return Err(MessageError::Overflow(MAX_MSGLEN));
        }
        Ok(())
    }

    pub fn remaining_bits(&self) -> usize {
        self.bits_written.saturating_sub(self.bits_read)
    }

    pub fn write_bits(&mut self, value: u32, bits: u32) {
        if self.overflowed || self.bits_written + bits as usize > MAX_MSGLEN * 8 {
            self.overflowed = true;
            return;
        }
        for i in 0..bits {
            let byte = self.bits_written / 8;
            if byte == self.data.len() {
                self.data.push(0);
            }
            if (value >> i) & 1 != 0 {
                self.data[byte] |= 1 << (self.bits_written % 8);
            }
            self.bits_written += 1;
        }
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u32, MessageError> {
        if self.bits_read + bits as usize > self.bits_written {
            return Err(MessageError::ReadPastEnd {
                read: self.bits_read + bits as usize,
                size: self.bits_written,
            });
        }
        let mut value = 0u32;
        for i in 0..bits {
            let bit = (self.data[self.bits_read / 8] >> (self.bits_read % 8)) & 1;
            value |= (bit as u32) << i;
            self.bits_read += 1;
        }
        Ok(value)
    }

    pub fn write_byte(&mut self, value: u8) {
        self.write_bits(value as u32, 8);
    }

    pub fn write_short(&mut self, value: i16) {
        self.write_bits(value as u16 as u32, 16);
    }

    pub fn write_long(&mut self, value: i32) {
        self.write_bits(value as u32, 32);
    }

    pub fn write_float(&mut self, value: f32) {
        self.write_bits(value.to_bits(), 32);
    }

    pub fn write_data(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_byte(byte);
        }
    }

    pub fn write_string(&mut self, text: &str) {
        self.write_terminated(text, MAX_STRING_CHARS);
    }

    pub fn write_big_string(&mut self, text: &str) {
        self.write_terminated(text, BIG_INFO_STRING);
    }

    fn write_terminated(&mut self, text: &str, limit: usize) {
        for &byte in text.as_bytes().iter().take(limit - 1) {
            self.write_byte(if byte > 127 { b'.' } else { byte });
        }
        self.write_byte(0);
    }

    pub fn read_byte(&mut self) -> Result<u8, MessageError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_short(&mut self) -> Result<i16, MessageError> {
        Ok(self.read_bits(16)? as u16 as i16)
    }

    pub fn read_long(&mut self) -> Result<i32, MessageError> {
        Ok(self.read_bits(32)? as i32)
    }

    pub fn read_float(&mut self) -> Result<f32, MessageError> {
        Ok(f32::from_bits(self.read_bits(32)?))
    }

    pub fn read_data(&mut self, len: usize) -> Result<Vec<u8>, MessageError> {
        (0..len).map(|_| self.read_byte()).collect()
    }

    pub fn read_string(&mut self) -> Result<String, MessageError> {
        self.read_terminated(MAX_STRING_CHARS)
    }

    pub fn read_big_string(&mut self) -> Result<String, MessageError> {
        self.read_terminated(BIG_INFO_STRING)
    }

    fn read_terminated(&mut self, limit: usize) -> Result<String, MessageError> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == 0 {
                break;
            }
            if bytes.len() < limit - 1 {
                bytes.push(byte);
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
