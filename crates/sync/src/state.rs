//! Persisted cursor and the locally mirrored package set.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::StreamExt;
use idxsync_feed::{PackageId, Serial};
use idxsync_storage::BackendHandle;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::instrument;

/// Root listing, relative to the mirror root.
pub const ROOT_INDEX: &str = "index.html";
/// Directory holding one subdirectory per package.
pub const PACKAGES_DIR: &str = "simple";
pub const CURSOR_FILE: &str = "last_serial.txt";
const CURSOR_LABEL: &str = "Last Serial";

/// Directory owned by `package`.
pub fn package_dir(package: &PackageId) -> PathBuf {
    Path::new(PACKAGES_DIR).join(package.as_str())
}

/// Index document of `package`.
pub fn package_index(package: &PackageId) -> PathBuf {
    package_dir(package).join(ROOT_INDEX)
}

fn parse_cursor(contents: &str) -> Result<Serial> {
    let value = match contents.split_once(':') {
        Some((_label, value)) => value,
        None => contents,
    };
    value.trim().parse::<Serial>().or_raise(|| ErrorKind::CorruptState(format!("unreadable cursor {:?}", contents.trim())))
}

/// Access to everything the mirror persists about itself.
///
/// The cursor is the only state written separately; the set of mirrored
/// packages is always derived from the storage tree.
#[derive(Clone)]
pub struct MirrorStateStore {
    backend: BackendHandle,
}
impl MirrorStateStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    /// Last committed cursor.
    ///
    /// Fails with [`MissingState`](ErrorKind::MissingState) when nothing has
    /// been committed yet.
    #[instrument(level = "debug", skip(self))]
    pub async fn load(&self) -> Result<Serial> {
        let contents = match self.backend.read(Path::new(CURSOR_FILE)).await {
            Ok(contents) => contents,
            Err(e) if e.is_not_found() => exn::bail!(ErrorKind::MissingState),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
        };
        parse_cursor(&String::from_utf8_lossy(&contents))
    }

    /// Durably record `cursor`, replacing any previous value.
    #[instrument(level = "debug", skip(self))]
    pub async fn commit(&self, cursor: Serial) -> Result<()> {
        let line = format!("{CURSOR_LABEL}: {cursor}\n");
        self.backend.write(Path::new(CURSOR_FILE), line.as_bytes()).await.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(cursor, "Committed cursor");
        Ok(())
    }

    /// Packages with an index document under [`PACKAGES_DIR`].
    #[instrument(level = "debug", skip(self))]
    pub async fn list_local_packages(&self) -> Result<BTreeSet<PackageId>> {
        let mut packages = BTreeSet::new();
        let mut entries = self.backend.list_stream(Some(Path::new(PACKAGES_DIR)));
        while let Some(entry) = entries.next().await {
            let info = entry.or_raise(|| ErrorKind::Storage)?;
            let components: Vec<Component> = info.path.components().collect();
            let [_, Component::Normal(name), Component::Normal(file)] = components.as_slice() else {
                continue;
            };
            if *file != ROOT_INDEX {
                continue;
            }
            match name.to_str().map(PackageId::new) {
                Some(Ok(package)) => {
                    packages.insert(package);
                },
                _ => tracing::warn!(path = %info.path.display(), "Ignoring unusable package directory"),
            }
        }
        Ok(packages)
    }

    /// Current root listing, if one has been written.
    pub async fn read_root_listing(&self) -> Result<Option<Vec<u8>>> {
        match self.backend.read(Path::new(ROOT_INDEX)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).or_raise(|| ErrorKind::Storage),
        }
    }

    /// Replace the root listing unless it already holds exactly `contents`.
    ///
    /// Returns `true` if the file was written.
    pub async fn write_root_listing(&self, contents: &[u8]) -> Result<bool> {
        if self.read_root_listing().await?.as_deref() == Some(contents) {
            return Ok(false);
        }
        self.backend.write(Path::new(ROOT_INDEX), contents).await.or_raise(|| ErrorKind::Storage)?;
        Ok(true)
    }

    /// `true` if a cursor has been committed and the root listing exists;
    /// otherwise the mirror must be bootstrapped.
    pub async fn is_initialized(&self) -> Result<bool> {
        for path in [CURSOR_FILE, ROOT_INDEX] {
            match self.backend.exists(Path::new(path)).await {
                Ok(true) => {},
                Ok(false) => return Ok(false),
                Err(e) if e.is_not_found() => return Ok(false),
                Err(e) => return Err(e).or_raise(|| ErrorKind::Storage),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idxsync_storage::backend::{LocalBackend, MockBackend};
    use rstest::rstest;
    use std::sync::Arc;

    fn store(files: &[(&str, &str)]) -> MirrorStateStore {
        MirrorStateStore::new(Arc::new(MockBackend::with_files(files.iter().copied())))
    }

    #[rstest]
    #[case("Last Serial: 25000123", 25_000_123)]
    #[case("Last Serial: 7\n", 7)]
    #[case("Last Serial:42", 42)]
    #[case("  99 ", 99)]
    fn test_parse_cursor(#[case] contents: &str, #[case] expected: Serial) {
        assert_eq!(parse_cursor(contents).unwrap(), expected);
    }

    #[rstest]
    #[case("Last Serial: ")]
    #[case("Last Serial: -1")]
    #[case("garbage")]
    fn test_parse_corrupt_cursor(#[case] contents: &str) {
        let err = parse_cursor(contents).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_missing_cursor() {
        let err = store(&[]).load().await.unwrap_err();
        assert_eq!(*err, ErrorKind::MissingState);
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStateStore::new(Arc::new(LocalBackend::new("mirror", dir.path()).unwrap()));
        store.commit(100).await.unwrap();
        store.commit(103).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 103);
        let on_disk = std::fs::read_to_string(dir.path().join(CURSOR_FILE)).unwrap();
        assert_eq!(on_disk, "Last Serial: 103\n");
    }

    #[tokio::test]
    async fn test_list_local_packages() {
        let store = store(&[
            ("index.html", "root"),
            ("simple/pkgA/index.html", "a"),
            ("simple/pkgB/index.html", "b"),
            ("simple/pkgB/extra.json", "{}"),
            ("simple/partial/notes.txt", "no index"),
            ("simple/stray.html", "x"),
        ]);
        let packages = store.list_local_packages().await.unwrap();
        let names: Vec<&str> = packages.iter().map(PackageId::as_str).collect();
        assert_eq!(names, ["pkgA", "pkgB"]);
    }

    #[tokio::test]
    async fn test_root_listing_only_written_when_changed() {
        let store = store(&[]);
        assert_eq!(store.read_root_listing().await.unwrap(), None);
        assert!(store.write_root_listing(b"<a>x</a>").await.unwrap());
        assert!(!store.write_root_listing(b"<a>x</a>").await.unwrap());
        assert!(store.write_root_listing(b"<a>y</a>").await.unwrap());
        assert_eq!(store.read_root_listing().await.unwrap().as_deref(), Some(&b"<a>y</a>"[..]));
    }

    #[tokio::test]
    async fn test_initialized_needs_cursor_and_root() {
        assert!(!store(&[]).is_initialized().await.unwrap());
        assert!(!store(&[("last_serial.txt", "Last Serial: 1")]).is_initialized().await.unwrap());
        assert!(!store(&[("index.html", "root")]).is_initialized().await.unwrap());
        let ready = store(&[("last_serial.txt", "Last Serial: 1"), ("index.html", "root")]);
        assert!(ready.is_initialized().await.unwrap());
    }

    #[test]
    fn test_layout() {
        let package = PackageId::new("numpy").unwrap();
        assert_eq!(package_dir(&package), PathBuf::from("simple/numpy"));
        assert_eq!(package_index(&package), PathBuf::from("simple/numpy/index.html"));
    }
}
