use thiserror::Error;

/// Everything that can go wrong between reading a log and producing interval data.  All variants
/// are fatal to the analysis; there is no partial result.  Line numbers are 1-based and refer to
/// the log file.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot find 'STATS: ON' in the log")]
    MissingStreamStart,

    #[error("Cannot find 'STATS: OFF' in the log (truncated or still running?)")]
    MissingStreamEnd,

    #[error("Line {line}: malformed record: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Line {line}: machine {machine} is out of range, there are {machine_count} machines")]
    MachineIndexOutOfRange {
        line: usize,
        machine: usize,
        machine_count: usize,
    },

    #[error("Line {line}: timestamp {timestamp} precedes earlier timestamp {previous}")]
    NonMonotonicTimestamp {
        line: usize,
        timestamp: u64,
        previous: u64,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Error {
    Error::MalformedRecord {
        line,
        reason: reason.into(),
    }
}
