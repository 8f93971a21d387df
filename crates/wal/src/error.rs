//! WAL-local error type, convertible into [`contextd_core::ContextdError`].

use thiserror::Error;

/// Result alias for WAL operations.
pub type WalResult<T> = std::result::Result<T, WalError>;

/// Errors raised by the write-ahead log.
#[derive(Debug, Error)]
pub enum WalError {
    /// The WAL root path failed the absolute / no-traversal check.
    #[error("unsafe WAL path: {0}")]
    UnsafePath(String),

    /// `Operation` was not in the `{add, delete}` whitelist.
    #[error("unknown WAL operation: {0}")]
    UnknownOperation(String),

    /// Entry exceeded the document count or byte-size limit.
    #[error("oversized WAL entry: {0}")]
    Oversized(String),

    /// HMAC verification failed on load; entry was dropped.
    #[error("checksum mismatch for entry {0}")]
    ChecksumMismatch(String),

    /// The on-disk HMAC key had the wrong length.
    #[error("HMAC key file has invalid length")]
    InvalidKeyLength,

    /// Entry referenced by id was not found (e.g. `mark_synced` on an
    /// unknown id).
    #[error("WAL entry not found: {0}")]
    EntryNotFound(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `bincode` encode/decode failure.
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl From<WalError> for contextd_core::ContextdError {
    fn from(e: WalError) -> Self {
        match &e {
            WalError::ChecksumMismatch(_) | WalError::InvalidKeyLength => {
                contextd_core::ContextdError::Integrity(e.to_string())
            }
            WalError::Oversized(_) => contextd_core::ContextdError::OversizedInput(e.to_string()),
            WalError::UnknownOperation(_) | WalError::UnsafePath(_) => {
                contextd_core::ContextdError::Integrity(e.to_string())
            }
            WalError::EntryNotFound(_) => contextd_core::ContextdError::Integrity(e.to_string()),
            WalError::Io(io) => contextd_core::ContextdError::Io(std::io::Error::new(
                io.kind(),
                io.to_string(),
            )),
            WalError::Encoding(_) => contextd_core::ContextdError::Serialization(e.to_string()),
        }
    }
}
