//! Applying a diff to the storage tree.

use crate::classify::SyncDiff;
use crate::error::ItemError;
use crate::state::{package_dir, package_index};
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use idxsync_feed::{FetcherHandle, PackageId, SimpleIndex};
use idxsync_storage::BackendHandle;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use tracing::instrument;

/// What was done to a package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Its index document was fetched and written.
    Downloaded,
    /// Its directory was deleted.
    Removed,
    /// It was due for removal but was not present locally.
    AlreadyAbsent,
}

pub type Outcome = Result<Action, ItemError>;

/// Result of applying a diff, keyed by package.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcomes(BTreeMap<PackageId, Outcome>);
impl Outcomes {
    pub fn get(&self, package: &PackageId) -> Option<&Outcome> {
        self.0.get(package)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageId, &Outcome)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Packages whose index document is now present locally.
    pub fn downloaded(&self) -> impl Iterator<Item = &PackageId> {
        self.0.iter().filter(|(_, o)| matches!(o, Ok(Action::Downloaded))).map(|(p, _)| p)
    }

    /// Packages that are now absent locally, including those that already were.
    pub fn removed(&self) -> impl Iterator<Item = &PackageId> {
        self.0.iter().filter(|(_, o)| matches!(o, Ok(Action::Removed | Action::AlreadyAbsent))).map(|(p, _)| p)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PackageId, &ItemError)> {
        self.0.iter().filter_map(|(p, o)| o.as_ref().err().map(|e| (p, e)))
    }
}
impl Extend<(PackageId, Outcome)> for Outcomes {
    fn extend<T: IntoIterator<Item = (PackageId, Outcome)>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}
impl FromIterator<(PackageId, Outcome)> for Outcomes {
    fn from_iter<T: IntoIterator<Item = (PackageId, Outcome)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

type Work<'a> = Pin<Box<dyn Future<Output = (PackageId, Outcome)> + Send + 'a>>;

/// Applies diffs with a bounded number of operations in flight.
///
/// Every operation touches only its own package's directory, so downloads
/// and removals share one pool and complete in any order. A failed item is
/// recorded and never stops the rest of the batch.
pub struct Executor {
    backend: BackendHandle,
    fetcher: FetcherHandle,
    index: SimpleIndex,
    workers: usize,
}
impl Executor {
    pub fn new(backend: BackendHandle, fetcher: FetcherHandle, index: SimpleIndex, workers: usize) -> Self {
        Self { backend, fetcher, index, workers: workers.max(1) }
    }

    /// Apply `diff`, waiting for every item to finish.
    #[instrument(skip_all, fields(downloads = diff.to_download.len(), removals = diff.to_remove.len()))]
    pub async fn apply(&self, diff: &SyncDiff) -> Outcomes {
        self.apply_stream(diff).collect::<Outcomes>().await
    }

    /// Stream per-package outcomes as they complete.
    pub fn apply_stream<'a>(&'a self, diff: &'a SyncDiff) -> impl Stream<Item = (PackageId, Outcome)> + Send + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let mut pending: VecDeque<Work<'a>> = diff
                .to_remove
                .iter()
                .map(|package| Box::pin(self.remove(package)) as Work<'a>)
                .chain(diff.to_download.iter().map(|package| Box::pin(self.download(package)) as Work<'a>))
                .collect();
            let mut processing = FuturesUnordered::new();
            processing.extend(pending.drain(..self.workers.min(pending.len())));
            while let Some(outcome) = processing.next().await {
                yield outcome;
                // Pop-n-push, but FIFO instead of LIFO.
                if let Some(next) = pending.pop_front() {
                    processing.push(next);
                }
            }
        })
    }

    async fn download(&self, package: &PackageId) -> (PackageId, Outcome) {
        let url = self.index.package_url(package);
        let outcome = match self.fetcher.fetch(&url).await {
            Ok(body) => match self.backend.write(&package_index(package), &body).await {
                Ok(()) => {
                    tracing::debug!(%package, bytes = body.len(), "Downloaded package index");
                    Ok(Action::Downloaded)
                },
                Err(e) => Err(ItemError::Fetch(e.to_string())),
            },
            Err(e) => Err(ItemError::Fetch(e.to_string())),
        };
        if let Err(e) = &outcome {
            tracing::warn!(%package, %url, error = %e, "Could not download package index");
        }
        (package.clone(), outcome)
    }

    async fn remove(&self, package: &PackageId) -> (PackageId, Outcome) {
        let outcome = match self.backend.delete_tree(&package_dir(package)).await {
            Ok(()) => {
                tracing::debug!(%package, "Removed package");
                Ok(Action::Removed)
            },
            Err(e) if e.is_not_found() => Ok(Action::AlreadyAbsent),
            Err(e) => {
                tracing::warn!(%package, error = %e, "Could not remove package");
                Err(ItemError::Remove(e.to_string()))
            },
        };
        (package.clone(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use idxsync_feed::mock::MockFetcher;
    use idxsync_feed::{ChangelogEvent, EventKind};
    use idxsync_storage::StorageBackend;
    use idxsync_storage::backend::MockBackend;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    const INDEX: &str = "https://pypi.org/simple/";

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name).unwrap()
    }

    fn diff(download: &[&str], remove: &[&str]) -> SyncDiff {
        SyncDiff {
            to_download: download.iter().map(|n| pkg(n)).collect(),
            to_remove: remove.iter().map(|n| pkg(n)).collect(),
            watermark: None,
        }
    }

    fn executor(backend: &Arc<MockBackend>, fetcher: MockFetcher, workers: usize) -> Executor {
        Executor::new(backend.clone(), Arc::new(fetcher), SimpleIndex::new(INDEX), workers)
    }

    fn fetcher(names: &[&str]) -> MockFetcher {
        MockFetcher::with_documents(names.iter().map(|n| (format!("{INDEX}{n}/"), format!("<html>{n}</html>"))))
    }

    #[tokio::test]
    async fn test_downloads_and_removals() {
        let backend = Arc::new(MockBackend::with_files([
            ("simple/old/index.html", "old"),
            ("simple/old/extra", "x"),
            ("simple/kept/index.html", "kept"),
        ]));
        let outcomes = executor(&backend, fetcher(&["new"]), 4).apply(&diff(&["new"], &["old", "never"])).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.get(&pkg("new")), Some(&Ok(Action::Downloaded)));
        assert_eq!(outcomes.get(&pkg("old")), Some(&Ok(Action::Removed)));
        assert_eq!(outcomes.get(&pkg("never")), Some(&Ok(Action::AlreadyAbsent)));
        assert_eq!(
            backend.paths().await,
            [PathBuf::from("simple/kept/index.html"), PathBuf::from("simple/new/index.html")]
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_batch() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = fetcher(&["a", "b", "c"]).failing(format!("{INDEX}b/"));
        let outcomes = executor(&backend, fetcher, 1).apply(&diff(&["a", "b", "c"], &[])).await;
        assert_eq!(outcomes.downloaded().count(), 2);
        let failures: Vec<_> = outcomes.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, &pkg("b"));
        assert!(matches!(failures[0].1, ItemError::Fetch(_)));
        assert!(!backend.paths().await.contains(&PathBuf::from("simple/b/index.html")));
    }

    #[tokio::test]
    async fn test_missing_remote_document_is_a_fetch_failure() {
        let backend = Arc::new(MockBackend::default());
        let outcomes = executor(&backend, MockFetcher::default(), 2).apply(&diff(&["ghost"], &[])).await;
        assert!(matches!(outcomes.get(&pkg("ghost")), Some(Err(ItemError::Fetch(_)))));
    }

    #[tokio::test]
    async fn test_applying_twice_is_idempotent() {
        let backend = Arc::new(MockBackend::with_files([("simple/gone/index.html", "x")]));
        let diff = diff(&["a", "b"], &["gone"]);
        let executor = executor(&backend, fetcher(&["a", "b"]), 3);
        executor.apply(&diff).await;
        let once = backend.paths().await;
        let first = backend.read(Path::new("simple/a/index.html")).await.unwrap();
        let outcomes = executor.apply(&diff).await;
        assert_eq!(backend.paths().await, once);
        assert_eq!(backend.read(Path::new("simple/a/index.html")).await.unwrap(), first);
        assert_eq!(outcomes.get(&pkg("gone")), Some(&Ok(Action::AlreadyAbsent)));
        assert_eq!(outcomes.failures().count(), 0);
    }

    #[tokio::test]
    async fn test_rename_runs_both_sides() {
        let backend = Arc::new(MockBackend::with_files([("simple/pkgE/index.html", "e")]));
        let diff = classify(&[ChangelogEvent::new(pkg("pkgD"), EventKind::Renamed { from: pkg("pkgE") }, 9)]);
        let outcomes = executor(&backend, fetcher(&["pkgD"]), 2).apply(&diff).await;
        assert_eq!(outcomes.removed().collect::<Vec<_>>(), [&pkg("pkgE")]);
        assert_eq!(outcomes.downloaded().collect::<Vec<_>>(), [&pkg("pkgD")]);
        assert_eq!(backend.paths().await, [PathBuf::from("simple/pkgD/index.html")]);
    }

    #[tokio::test]
    async fn test_single_worker_runs_in_queue_order() {
        let backend = Arc::new(MockBackend::with_files([("simple/x/index.html", "x")]));
        let executor = executor(&backend, fetcher(&["a", "b", "c"]), 1);
        let diff = diff(&["c", "a", "b"], &["y", "x"]);
        let order: Vec<String> = executor.apply_stream(&diff).map(|(p, _)| p.to_string()).collect().await;
        assert_eq!(order, ["x", "y", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_diff() {
        let backend = Arc::new(MockBackend::default());
        let fetcher = MockFetcher::default();
        let executor = executor(&backend, fetcher, 4);
        assert!(executor.apply(&SyncDiff::default()).await.is_empty());
    }
}
