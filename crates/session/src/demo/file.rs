use std::io::{self, Read, Write};

use crate::error::DemoError;
use crate::protocol::MAX_MSGLEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoRecord {
    pub sequence: i32,
    pub payload: Vec<u8>,
}

/// Writes `sequence | length | payload` records, little-endian.
#[derive(Debug)]
pub struct DemoWriter<W: Write> {
    inner: W,
}

impl<W: Write> DemoWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, sequence: i32, payload: &[u8]) -> io::Result<()> {
        self.inner.write_all(&sequence.to_le_bytes())?;
        self.inner.write_all(&(payload.len() as i32).to_le_bytes())?;
        self.inner.write_all(payload)
    }

    /// Appends the end-of-stream marker and hands back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(&(-1i32).to_le_bytes())?;
        self.inner.write_all(&(-1i32).to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[derive(Debug)]
pub struct DemoReader<R: Read> {
    inner: R,
}

impl<R: Read> DemoReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next record, or `None` at the end marker or on any short read.
    pub fn next_record(&mut self) -> Result<Option<DemoRecord>, DemoError> {
        let Some(sequence) = self.read_i32() else {
            return Ok(None);
        };
        let Some(length) = self.read_i32() else {
            return Ok(None);
        };

        if length == -1 {
            return Ok(None);
        }
        if length as i64 > MAX_MSGLEN as i64 {
            return Err(DemoError::Oversized(length));
        }
        if length < 0 {
            log::warn!("Demo message has negative length {}", length);
            return Ok(None);
        }

        let mut payload = vec![0u8; length as usize];
        if self.inner.read_exact(&mut payload).is_err() {
            log::info!("Demo file was truncated.");
            return Ok(None);
        }

        Ok(Some(DemoRecord { sequence, payload }))
    }

    fn read_i32(&mut self) -> Option<i32> {
        let mut bytes = [0u8; 4];
        self.inner.read_exact(&mut bytes).ok()?;
        Some(i32::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn records_then_end_marker() {
        let mut writer = DemoWriter::new(Vec::new());
        writer.write_record(0, b"gamestate").unwrap();
        writer.write_record(1, b"snap").unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(&bytes[..4], &0i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &9i32.to_le_bytes());
        assert_eq!(&bytes[bytes.len() - 8..], &[0xff; 8]);

        let mut reader = DemoReader::new(Cursor::new(bytes));
        assert_eq!(reader.next_record().unwrap().unwrap().payload, b"gamestate");
        assert_eq!(reader.next_record().unwrap().unwrap().sequence, 1);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn truncated_payload_ends_stream() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5i32.to_le_bytes());
        bytes.extend_from_slice(&100i32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);

        let mut reader = DemoReader::new(Cursor::new(bytes));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn short_header_ends_stream() {
        let mut reader = DemoReader::new(Cursor::new(vec![1u8, 0, 0, 0, 7]));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn oversized_length_is_an_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&(MAX_MSGLEN as i32 + 1).to_le_bytes());

        let mut reader = DemoReader::new(Cursor::new(bytes));
        assert!(matches!(reader.next_record(), Err(DemoError::Oversized(_))));
    }
}
