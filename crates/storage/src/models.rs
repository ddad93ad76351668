//! Storage models.

use std::path::PathBuf;

/// File metadata returned by storage backends.
///
/// Used for listing the mirror tree (which packages are present locally)
/// and for walking it when exporting a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self { path: path.into(), size }
    }
}
