//! Storage backend trait and implementations.
//!
//! [`StorageBackend`] is the only way the synchronisation engine touches the
//! mirror tree. [`LocalBackend`] is the real thing; `MockBackend` keeps
//! everything in memory for tests.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for the mirror's storage tree.
///
/// # Path Handling
/// All paths are relative to the mirror root and are validated with
/// [`validate_path`](crate::validate_path) by every implementation before use.
///
/// # Idempotence
/// A sync cycle may be replayed after a crash, so [`write`](Self::write)
/// always overwrites and callers treat
/// [`NotFound`](crate::error::ErrorKind::NotFound) from
/// [`delete_tree`](Self::delete_tree) as "already done".
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use idxsync_storage::{backend::StorageBackend, error::Result};
///
/// async fn index_of(backend: &dyn StorageBackend, package: &str) -> Result<Option<Vec<u8>>> {
///     let path = Path::new("simple").join(package).join("index.html");
///     match backend.exists(&path).await? {
///         true => Ok(Some(backend.read(&path).await?)),
///         false => Ok(None),
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files under an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream metadata for every file under an optional prefix.
    ///
    /// The prefix is component-based: `simple/numpy` matches
    /// `simple/numpy/index.html` but not `simple/numpy-financial/index.html`.
    /// A prefix that does not exist yields an empty stream, not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use idxsync_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("simple")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, creating or replacing the file.
    ///
    /// # Notes
    /// - Implementations create parent directories as needed.
    /// - Readers never observe a partially written file: the new content
    ///   replaces the old one in a single step.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a directory and everything beneath it.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if nothing
    /// exists at `path`.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use idxsync_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// backend.delete_tree(Path::new("simple/abandoned-package")).await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn delete_tree(&self, path: &Path) -> Result<()>;
}
