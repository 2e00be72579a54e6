use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditLedgerError {
    #[error("Failed to put {key} to world state: {reason}")]
    WriteError { key: String, reason: String },

    #[error("Range scan failed: {0}")]
    ReadError(String),

    #[error("Value under {key} is not a valid access record: {source}")]
    DecodeError {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode access record: {0}")]
    EncodeError(#[source] serde_json::Error),

    #[error("WAL corruption detected at LSN {lsn}")]
    WalCorruption { lsn: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, AuditLedgerError>;

impl AuditLedgerError {
    /// Wrap any failure from a storage layer as a rejected write of `key`.
    pub fn write(key: &str, reason: impl std::fmt::Display) -> Self {
        AuditLedgerError::WriteError {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
