use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("read past end of message ({read} of {size} bits)")]
    ReadPastEnd { read: usize, size: usize },
    #[error("message overflowed {0} bytes")]
    Overflow(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("illegible server message: op {0}")]
    IllegibleMessage(u8),
    #[error("configstring index {0} out of range")]
    ConfigstringIndex(i32),
    #[error("baseline number {0} out of range")]
    BaselineNumber(u32),
    #[error("bad gamestate command byte {0}")]
    BadGamestateCommand(u8),
    #[error("area mask of {0} bytes is too large")]
    AreaMask(u8),
    #[error("downloads are not handled by this client")]
    DownloadUnsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("demo i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("couldn't open {0}")]
    NotFound(String),
    #[error("couldn't open {path} for recording: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("demo message length {0} exceeds maximum")]
    Oversized(i32),
    #[error(transparent)]
    Message(#[from] MessageError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("bad server address: {0}")]
    BadServerAddress(String),
    #[error("not connected to a server")]
    NotConnected,
    #[error("client command overflow")]
    CommandOverflow,
    #[error("Already recording.")]
    AlreadyRecording,
    #[error("You must be in a level to record.")]
    NotInLevel,
    #[error("Incorrect checksum for file: {0}")]
    ChecksumMismatch(String),
    #[error("bad master server number {0}")]
    BadMasterNumber(usize),
    #[error("no rcon destination set")]
    NoRconAddress,
    #[error(transparent)]
    Demo(#[from] DemoError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("transport failed: {0}")]
    Io(#[from] io::Error),
}
