//! Exclusive guard over a mirror root.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = ".idxsync.lock";

/// Advisory lock held for the duration of a cycle.
///
/// Only one cycle may run against a mirror root at a time; the lock is
/// released when the guard is dropped (or the process exits).
#[derive(Debug)]
pub struct MirrorLock {
    file: File,
    path: PathBuf,
}
impl MirrorLock {
    /// Take the lock without waiting.
    ///
    /// Fails with [`Locked`](ErrorKind::Locked) if another process holds it.
    pub fn acquire(mirror_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(mirror_root).or_raise(|| ErrorKind::Storage)?;
        let path = mirror_root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .or_raise(|| ErrorKind::Storage)?;
        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                exn::bail!(ErrorKind::Locked(path));
            }
            return Err(e).or_raise(|| ErrorKind::Storage);
        }
        tracing::debug!(path = %path.display(), "Acquired mirror lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl Drop for MirrorLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not release mirror lock");
        }
    }
}
