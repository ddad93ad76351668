//! Top-level Error Types

use derive_more::{Display, Error};

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for commands.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the mirror")]
    Storage,
    #[display("could not reach the package index")]
    Feed,
    #[display("sync cycle failed")]
    Sync,
    #[display("could not write output")]
    Output,
}
