use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "dimension mismatch: expected {expected_bits} bits / {expected_rounds} rounds, \
         got {actual_bits} bits / {actual_rounds} rounds"
    )]
    DimensionMismatch {
        expected_bits: u64,
        expected_rounds: u64,
        actual_bits: u64,
        actual_rounds: u64,
    },

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("truncated input: {0}")]
    TruncatedInput(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("ring data is corrupted: {0}")]
    CorruptedData(#[source] io::Error),

    #[error("IO: {0}")]
    Io(#[from] io::Error),
}

impl RingError {
    /// Maps a failed stream read. EOF means the stream ended before the declared
    /// section was complete; anything else is wrapped with its cause.
    pub(crate) fn from_read(err: io::Error, section: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            RingError::TruncatedInput(format!("stream ended while reading {section}"))
        } else {
            RingError::CorruptedData(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, RingError>;
