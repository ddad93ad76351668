//! Publish Error Types

use derive_more::{Display, Error};

/// A publish error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for publish operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The repository service could not be reached.
    #[display("publisher unreachable: {_0}")]
    Transport(#[error(not(source))] String),
    /// The repository service answered with a non-success status.
    #[display("publisher rejected the request with status {status}")]
    Rejected { status: u16 },
}

impl ErrorKind {
    /// Returns `true` if resubmitting the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status } => *status == 429 || *status >= 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Transport("timed out".into()), true)]
    #[case(ErrorKind::Rejected { status: 502 }, true)]
    #[case(ErrorKind::Rejected { status: 422 }, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}
