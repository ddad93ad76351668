//! Sync Error Types
//!
//! Only conditions that abort a whole cycle are errors here. Failures of a
//! single package are recorded as [`ItemError`] values in the executor's
//! outcome map instead.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No cursor has been committed yet; the mirror needs a bootstrap.
    #[display("no committed cursor")]
    MissingState,
    /// The cursor file exists but cannot be understood.
    #[display("corrupt cursor file: {_0}")]
    CorruptState(#[error(not(source))] String),
    /// Another cycle holds the mirror lock.
    #[display("mirror is locked by another process: {}", _0.display())]
    Locked(#[error(not(source))] PathBuf),
    /// The local storage tree failed in a way that affects the whole cycle.
    #[display("storage failure")]
    Storage,
    /// The changelog or root listing could not be read.
    #[display("feed failure")]
    Feed,
    /// Publishing failed while publishing was required to succeed.
    #[display("publish failure")]
    Publish,
}

impl ErrorKind {
    /// Returns `true` if running the cycle again later might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Locked(_) | Self::Feed | Self::Publish => true,
            Self::MissingState | Self::CorruptState(_) | Self::Storage => false,
        }
    }
}

/// Why a single package could not be brought up to date.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// The package's index document could not be fetched or stored.
    #[display("fetch failed: {_0}")]
    Fetch(#[error(not(source))] String),
    /// The package's directory could not be removed.
    #[display("remove failed: {_0}")]
    Remove(#[error(not(source))] String),
}
