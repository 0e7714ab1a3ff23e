//! Common error types for MCQR
//!
//! Store-local errors (`RecordNotFound`, `StoreCorrupt`) abort the mutation in
//! progress and leave the dataset untouched. Remote errors never undo a local
//! mutation that already committed.

use serde::Serialize;
use thiserror::Error;

/// Common result type for MCQR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the store, tracker, synchronizer and coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Backing medium cannot be read or written at all
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No record carries the requested identifier
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Identifier uniqueness violated in the backing store
    #[error("Store corrupt: {0}")]
    StoreCorrupt(String),

    /// Transport failure before the remote answered
    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    /// Credentials rejected by the remote
    #[error("Remote rejected credentials: {0}")]
    RemoteAuthFailure(String),

    /// Target resource does not exist on the remote
    #[error("Remote resource missing: {0}")]
    RemoteResourceMissing(String),

    /// Remote content changed since the version token was read
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Remote did not answer within the configured timeout
    #[error("Remote timed out: {0}")]
    RemoteTimeout(String),

    /// Conditional write was sent but its outcome is unknown
    #[error("Push unconfirmed: {0}")]
    PushUnconfirmed(String),

    /// Remote answered with an unexpected status
    #[error("Remote rejected request (HTTP {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// Missing credential, path or malformed configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Serializable discriminant of [`Error`], used in API bodies and sync reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StoreUnavailable,
    RecordNotFound,
    StoreCorrupt,
    RemoteUnreachable,
    RemoteAuthFailure,
    RemoteResourceMissing,
    VersionConflict,
    RemoteTimeout,
    PushUnconfirmed,
    RemoteRejected,
    Configuration,
    InvalidInput,
    Database,
    Io,
    Csv,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Error::RecordNotFound(_) => ErrorKind::RecordNotFound,
            Error::StoreCorrupt(_) => ErrorKind::StoreCorrupt,
            Error::RemoteUnreachable(_) => ErrorKind::RemoteUnreachable,
            Error::RemoteAuthFailure(_) => ErrorKind::RemoteAuthFailure,
            Error::RemoteResourceMissing(_) => ErrorKind::RemoteResourceMissing,
            Error::VersionConflict(_) => ErrorKind::VersionConflict,
            Error::RemoteTimeout(_) => ErrorKind::RemoteTimeout,
            Error::PushUnconfirmed(_) => ErrorKind::PushUnconfirmed,
            Error::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Database(_) => ErrorKind::Database,
            Error::Io(_) => ErrorKind::Io,
            Error::Csv(_) => ErrorKind::Csv,
        }
    }

    /// True when the caller can re-read, re-apply and push again
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::VersionConflict(_) | Error::PushUnconfirmed(_))
    }

    /// True for failures raised by the remote adapter
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnreachable(_)
                | Error::RemoteAuthFailure(_)
                | Error::RemoteResourceMissing(_)
                | Error::VersionConflict(_)
                | Error::RemoteTimeout(_)
                | Error::PushUnconfirmed(_)
                | Error::RemoteRejected { .. }
        )
    }
}
