//! Feed Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A feed error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote end could not be reached or the request failed in flight.
    #[display("transport error: {_0}")]
    Transport(#[error(not(source))] String),
    /// The remote end answered with a non-success status.
    #[display("unexpected status {status} from {url}")]
    Status {
        url: String,
        status: u16,
    },
    /// The changelog endpoint answered with an XML-RPC fault.
    #[display("feed fault {code}: {message}")]
    Fault {
        code: i64,
        message: String,
    },
    /// The response could not be decoded into the expected shape.
    #[display("malformed feed response: {_0}")]
    Decode(#[error(not(source))] String),
    /// A package name that cannot be mirrored safely.
    #[display("invalid package name: {_0:?}")]
    InvalidPackage(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing is retried inline; a retryable failure is simply picked up
    /// again by the next scheduled cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Fault { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::InvalidPackage(_) => false,
        }
    }

    /// Returns `true` if the remote end says the document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 410, .. })
    }
}
