//! Local filesystem storage backend.
//!
//! Files live under a configured root directory and are accessed through
//! `tokio::fs`.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

/// Suffix for the temporary sibling a write goes to before being renamed
/// over the destination.
const PARTIAL_SUFFIX: &str = ".partial";

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// All paths are relative to the configured root directory. Entries whose
/// name starts with a dot (lock files, in-flight partial writes) are
/// invisible to listings.
///
/// # Examples
///
/// ```no_run
/// use idxsync_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/srv/pypi_mirror")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend, creating the root directory if
    /// it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    /// Root directory of the mirror.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: &Metadata) -> FileInfo {
        FileInfo::new(path, metadata.len())
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn partial_path(abs_path: &Path) -> Result<PathBuf> {
        let Some(file_name) = abs_path.file_name() else {
            exn::bail!(ErrorKind::InvalidPath(abs_path.to_path_buf()));
        };
        let mut partial = OsString::from(".");
        partial.push(file_name);
        partial.push(PARTIAL_SUFFIX);
        Ok(abs_path.with_file_name(partial))
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name().is_some_and(|name| name.as_encoded_bytes().starts_with(b"."))
    }

    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        if Self::is_hidden(&path) {
            return Ok(WalkEntry::Skip);
        }
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            // A directory is worth descending into if it is on the way to
            // the prefix or already beneath it.
            let on_the_way = prefix.is_none_or(|pfx| pfx.starts_with(&relative) || relative.starts_with(pfx));
            return Ok(if on_the_way { WalkEntry::Descend(path) } else { WalkEntry::Skip });
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, &metadata)));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![self.root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A missing directory lists as empty.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        let partial = Self::partial_path(&abs_path)?;
        fs::write(&partial, data).await.map_err(|e| Self::map_io_error(e, path))?;
        if let Err(e) = fs::rename(&partial, &abs_path).await {
            tracing::warn!(backend = %self.name, path = %path.display(), error = %e, "Discarding partial write");
            _ = fs::remove_file(&partial).await;
            exn::bail!(Self::map_io_error(e, path));
        }
        Ok(())
    }

    async fn delete_tree(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::symlink_metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        let removed = match metadata.is_dir() {
            true => fs::remove_dir_all(&abs_path).await,
            false => fs::remove_file(&abs_path).await,
        };
        removed.map_err(|e| Self::map_io_error(e, path))?;
        tracing::trace!(backend = %self.name, path = %path.display(), "Deleted tree");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("local", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("local", "relative/path").is_err());
        assert!(LocalBackend::new("local", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("pypi_mirror");
        LocalBackend::new("local", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_absolute_path() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("simple/requests/index.html");
        assert_eq!(backend.absolute_path(Path::new("simple/requests/index.html")).unwrap(), expected);
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("simple/requests/index.html"), b"<html/>").await.unwrap();
        let data = backend.read(Path::new("simple/requests/index.html")).await.unwrap();
        assert_eq!(data, b"<html/>");
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_partial() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("last_serial.txt"), b"Last Serial: 1").await.unwrap();
        backend.write(Path::new("last_serial.txt"), b"Last Serial: 2").await.unwrap();
        assert_eq!(backend.read(Path::new("last_serial.txt")).await.unwrap(), b"Last Serial: 2");
        assert!(!temp_dir.path().join(".last_serial.txt.partial").exists());
    }

    #[tokio::test]
    async fn test_exists() {
        let (_temp_dir, backend) = backend();
        assert!(!backend.exists(Path::new("index.html")).await.unwrap());
        backend.write(Path::new("index.html"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("index.html")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_tree() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("simple/gone/index.html"), b"a").await.unwrap();
        backend.write(Path::new("simple/gone/extra/file"), b"b").await.unwrap();
        backend.write(Path::new("simple/kept/index.html"), b"c").await.unwrap();
        backend.delete_tree(Path::new("simple/gone")).await.unwrap();
        assert!(!backend.exists(Path::new("simple/gone")).await.unwrap());
        assert!(backend.exists(Path::new("simple/kept/index.html")).await.unwrap());
        // Second removal reports the absence, callers decide it's fine.
        let err = backend.delete_tree(Path::new("simple/gone")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_skips_hidden_entries() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("index.html"), b"root").await.unwrap();
        std::fs::write(temp_dir.path().join(".idxsync.lock"), b"").unwrap();
        std::fs::write(temp_dir.path().join(".index.html.partial"), b"torn").unwrap();
        let files = backend.list(None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("index.html"));
        assert_eq!(files[0].size, 4);
    }

    #[tokio::test]
    async fn test_list_with_prefix_is_component_based() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("index.html"), b"root").await.unwrap();
        backend.write(Path::new("simple/numpy/index.html"), b"a").await.unwrap();
        backend.write(Path::new("simple/numpy-financial/index.html"), b"b").await.unwrap();
        let all = backend.list(Some(Path::new("simple"))).await.unwrap();
        assert_eq!(all.len(), 2);
        let numpy = backend.list(Some(Path::new("simple/numpy"))).await.unwrap();
        assert_eq!(numpy.len(), 1);
        assert_eq!(numpy[0].path, PathBuf::from("simple/numpy/index.html"));
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let (_temp_dir, backend) = backend();
        let files = backend.list(Some(Path::new("simple"))).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete_tree(Path::new("simple/../..")).await.is_err());
    }
}
