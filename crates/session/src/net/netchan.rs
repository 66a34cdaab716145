use super::address::NetAddress;
use crate::protocol::{FRAGMENT_BIT, FRAGMENT_SIZE, MAX_MSGLEN, netchan_checksum};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetSide {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetchanMessage {
    pub sequence: i32,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct Netchan {
    side: NetSide,
    remote: NetAddress,
    qport: u16,
    challenge: i32,
    compat: bool,
    incoming_sequence: i32,
    outgoing_sequence: i32,
    dropped: i32,
    fragment_sequence: i32,
    fragment_buffer: Vec<u8>,
}

impl Netchan {
    pub fn setup(
        side: NetSide,
        remote: NetAddress,
        qport: u16,
        challenge: i32,
        compat: bool,
    ) -> Self {
        Self {
            side,
            remote,
            qport,
            challenge,
            compat,
            incoming_sequence: 0,
            outgoing_sequence: 1,
            dropped: 0,
            fragment_sequence: 0,
            fragment_buffer: Vec::new(),
        }
    }

    pub fn remote(&self) -> &NetAddress {
        &self.remote
    }

    pub fn incoming_sequence(&self) -> i32 {
        self.incoming_sequence
    }

    pub fn outgoing_sequence(&self) -> i32 {
        self.outgoing_sequence
    }

    pub fn dropped(&self) -> i32 {
        self.dropped
    }

    pub fn is_compat(&self) -> bool {
        self.compat
    }

    /// Validates a sequenced packet. Out of order, duplicated and malformed
    /// packets yield `None`, as does a fragment that does not finish a message.
    pub fn process(&mut self, data: &[u8]) -> Option<NetchanMessage> {
        let mut reader = HeaderReader { data, offset: 0 };

        let raw = reader.long()? as u32;
        let fragmented = raw & FRAGMENT_BIT != 0;
        let sequence = (raw & !FRAGMENT_BIT) as i32;

        if self.side == NetSide::Server {
            reader.short()?;
        }

        if !self.compat {
            let checksum = reader.long()?;
            if checksum != netchan_checksum(self.challenge, sequence) {
                log::warn!("{}: bad netchan checksum on sequence {}", self.remote, sequence);
                return None;
            }
        }

        let (fragment_start, fragment_length) = if fragmented {
            (reader.short()? as usize, reader.short()? as usize)
        } else {
            (0, 0)
        };

        if sequence <= self.incoming_sequence {
            log::debug!(
                "{}: out of order packet {} at {}",
                self.remote,
                sequence,
                self.incoming_sequence
            );
            return None;
        }

        self.dropped = sequence - (self.incoming_sequence + 1);
        if self.dropped > 0 {
            log::debug!(
                "{}: dropped {} packets at {}",
                self.remote,
                self.dropped,
                sequence
            );
        }

        if fragmented {
            if sequence != self.fragment_sequence {
                self.fragment_sequence = sequence;
                self.fragment_buffer.clear();
            }

            if fragment_start != self.fragment_buffer.len() {
                log::debug!("{}: dropped a message fragment at {}", self.remote, sequence);
                return None;
            }

            let body = reader.rest();
            if fragment_length > body.len()
                || self.fragment_buffer.len() + fragment_length > MAX_MSGLEN
            {
                log::warn!("{}: illegal fragment length", self.remote);
                return None;
            }

            self.fragment_buffer.extend_from_slice(&body[..fragment_length]);

            if fragment_length == FRAGMENT_SIZE {
                return None;
            }

            self.incoming_sequence = sequence;
            return Some(NetchanMessage {
                sequence,
                payload: std::mem::take(&mut self.fragment_buffer),
            });
        }

        self.incoming_sequence = sequence;
        Some(NetchanMessage {
            sequence,
            payload: reader.rest().to_vec(),
        })
    }

    /// Frames a message for sending, splitting it into fragments when it is too large
    /// for one datagram. The outgoing sequence advances once per message.
    pub fn transmit(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        let sequence = self.outgoing_sequence;
        self.outgoing_sequence += 1;

        if payload.len() < FRAGMENT_SIZE {
            let mut packet = self.header(sequence, false);
            packet.extend_from_slice(payload);
            return vec![packet];
        }

        let mut packets = Vec::new();
        let mut start = 0;
        loop {
            let length = FRAGMENT_SIZE.min(payload.len() - start);
            let mut packet = self.header(sequence, true);
            packet.extend_from_slice(&(start as u16).to_le_bytes());
            packet.extend_from_slice(&(length as u16).to_le_bytes());
            packet.extend_from_slice(&payload[start..start + length]);
            packets.push(packet);

            start += length;
            if length < FRAGMENT_SIZE {
                break;
            }
        }
        packets
    }

    fn header(&self, sequence: i32, fragmented: bool) -> Vec<u8> {
        let mut header = Vec::with_capacity(16);
        let raw = if fragmented {
            sequence as u32 | FRAGMENT_BIT
        } else {
            sequence as u32
        };
        header.extend_from_slice(&raw.to_le_bytes());
        if self.side == NetSide::Client {
            header.extend_from_slice(&self.qport.to_le_bytes());
        }
        if !self.compat {
            header.extend_from_slice(&netchan_checksum(self.challenge, sequence).to_le_bytes());
        }
        header
    }
}

struct HeaderReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> HeaderReader<'a> {
    fn long(&mut self) -> Option<i32> {
        let bytes = self.data.get(self.offset..self.offset + 4)?;
        self.offset += 4;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn short(&mut self) -> Option<u16> {
        let bytes = self.data.get(self.offset..self.offset + 2)?;
        self.offset += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}
