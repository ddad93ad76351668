//! One synchronisation cycle, start to finish.
//!
//! A cycle is either a bootstrap (no committed cursor or no root listing:
//! diff the full remote listing against local storage) or an incremental
//! pass (fold changelog events since the cursor into a diff). Both end the
//! same way: apply the diff, derive metadata for what changed, hand it to
//! the publisher, and commit the cursor last.

use crate::classify::{DiffClassifier, SyncDiff};
use crate::error::{ErrorKind, Result};
use crate::executor::{Executor, Outcomes};
use crate::lock::MirrorLock;
use crate::state::{MirrorStateStore, ROOT_INDEX, package_dir, package_index};
use derive_more::Display;
use exn::ResultExt;
use futures::StreamExt;
use idxsync_digest::{HashAlgorithm, artifact_path};
use idxsync_feed::{FeedHandle, FetcherHandle, PackageId, Serial, SimpleIndex, pages, parse_root_listing};
use idxsync_publish::PublisherHandle;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::pin::pin;
use tracing::instrument;

/// Where the mirror is in its lifecycle.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum MirrorPhase {
    /// Not yet known to hold a usable cursor and root listing.
    Uninitialized,
    Bootstrapping,
    /// Up to date as of the last committed cursor.
    Steady,
    Syncing,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CycleKind {
    #[display("bootstrap")]
    Bootstrap,
    #[display("incremental")]
    Incremental,
}

/// Knobs for a cycle.
#[derive(Clone, Copy, Debug)]
pub struct SyncOptions {
    /// Concurrent fetch/remove/digest operations.
    pub workers: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Keep the old cursor if the publisher rejects anything.
    pub require_publish: bool,
    /// Publish metadata for bootstrap downloads too.
    pub publish_bootstrap: bool,
}
impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            hash_algorithm: HashAlgorithm::default(),
            require_publish: false,
            publish_bootstrap: false,
        }
    }
}

/// What a cycle did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleSummary {
    pub kind: CycleKind,
    /// Cursor the cycle started from; `None` for a bootstrap.
    pub previous: Option<Serial>,
    /// Cursor recorded at the end of the cycle.
    pub committed: Serial,
    /// Packages queued because the root listing names them but they are
    /// missing locally.
    pub reconciled: usize,
    /// Packages queued for removal because they are mirrored locally but
    /// the root listing no longer names them.
    pub pruned: usize,
    pub root_changed: bool,
    /// Artifact additions handed to the publisher.
    pub published: usize,
    /// Artifact removals handed to the publisher.
    pub unpublished: usize,
    pub publish_failed: bool,
    pub outcomes: Outcomes,
}
impl CycleSummary {
    pub fn downloaded(&self) -> usize {
        self.outcomes.downloaded().count()
    }

    pub fn removed(&self) -> usize {
        self.outcomes.removed().count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.failures().count()
    }
}

#[derive(Debug, Default)]
struct PublishReport {
    added: usize,
    removed: usize,
    failed: bool,
}

/// Sequences the sync components and owns the cursor commit.
pub struct Orchestrator {
    store: MirrorStateStore,
    feed: FeedHandle,
    fetcher: FetcherHandle,
    publisher: PublisherHandle,
    index: SimpleIndex,
    executor: Executor,
    options: SyncOptions,
    phase: MirrorPhase,
}
impl Orchestrator {
    pub fn new(
        store: MirrorStateStore,
        feed: FeedHandle,
        fetcher: FetcherHandle,
        publisher: PublisherHandle,
        index: SimpleIndex,
        options: SyncOptions,
    ) -> Self {
        let executor = Executor::new(store.backend().clone(), fetcher.clone(), index.clone(), options.workers);
        Self {
            store,
            feed,
            fetcher,
            publisher,
            index,
            executor,
            options,
            phase: MirrorPhase::Uninitialized,
        }
    }

    pub fn phase(&self) -> MirrorPhase {
        self.phase
    }

    fn transition(&mut self, to: MirrorPhase) {
        if self.phase != to {
            tracing::debug!(from = %self.phase, %to, "Mirror phase change");
            self.phase = to;
        }
    }

    /// Run one cycle. The caller proves exclusive access by holding `lock`.
    ///
    /// Only cycle-fatal conditions are errors: an unreadable cursor, an
    /// unreachable feed, storage failures outside a single package, and a
    /// publish failure when publishing is required. Per-package failures
    /// are reported in the summary and retried on a later cycle.
    #[instrument(skip_all, fields(lock = %lock.path().display()))]
    pub async fn run(&mut self, lock: &MirrorLock) -> Result<CycleSummary> {
        if self.phase == MirrorPhase::Uninitialized && self.store.is_initialized().await? {
            self.transition(MirrorPhase::Steady);
        }
        let summary = match self.phase {
            MirrorPhase::Steady => {
                let cursor = self.store.load().await?;
                self.transition(MirrorPhase::Syncing);
                let result = self.incremental(cursor).await;
                self.transition(MirrorPhase::Steady);
                result?
            },
            _ => {
                self.transition(MirrorPhase::Bootstrapping);
                let result = self.bootstrap().await;
                self.transition(if result.is_ok() { MirrorPhase::Steady } else { MirrorPhase::Uninitialized });
                result?
            },
        };
        tracing::info!(
            kind = %summary.kind,
            cursor = summary.committed,
            downloaded = summary.downloaded(),
            removed = summary.removed(),
            reconciled = summary.reconciled,
            pruned = summary.pruned,
            failed = summary.failed(),
            published = summary.published,
            unpublished = summary.unpublished,
            "Sync cycle complete"
        );
        Ok(summary)
    }

    /// Mirror everything the remote root listing names that is missing
    /// locally, then commit the head read before the listing.
    async fn bootstrap(&self) -> Result<CycleSummary> {
        tracing::info!("Bootstrapping mirror");
        // Head first: anything that lands while the listing is read gets
        // replayed by the next incremental cycle.
        let head = self.feed.head().await.or_raise(|| ErrorKind::Feed)?;
        let root = self.fetcher.fetch(self.index.root_url()).await.or_raise(|| ErrorKind::Feed)?;
        let remote = parse_root_listing(&root);
        let local = self.store.list_local_packages().await?;
        let diff = SyncDiff {
            to_download: remote.difference(&local).cloned().collect(),
            to_remove: BTreeSet::new(),
            watermark: Some(head),
        };
        tracing::info!(remote = remote.len(), local = local.len(), pending = diff.to_download.len(), "Diffed root listing");

        let outcomes = self.executor.apply(&diff).await;
        let root_changed = self.store.write_root_listing(&root).await?;
        let report = if self.options.publish_bootstrap {
            self.publish(&outcomes, root_changed).await
        } else {
            PublishReport::default()
        };
        if report.failed && self.options.require_publish {
            exn::bail!(ErrorKind::Publish);
        }
        self.store.commit(head).await?;
        Ok(CycleSummary {
            kind: CycleKind::Bootstrap,
            previous: None,
            committed: head,
            reconciled: 0,
            pruned: 0,
            root_changed,
            published: report.added,
            unpublished: report.removed,
            publish_failed: report.failed,
            outcomes,
        })
    }

    async fn incremental(&self, cursor: Serial) -> Result<CycleSummary> {
        let head = self.feed.head().await.or_raise(|| ErrorKind::Feed)?;
        let mut diff = self.collect_diff(cursor, head).await?;

        // Always re-check the root listing. It is also what lets packages
        // that failed on an earlier cycle be picked up again.
        let root = match self.fetcher.fetch(self.index.root_url()).await {
            Ok(root) => Some(root),
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch root listing; skipping reconciliation");
                None
            },
        };
        let (reconciled, pruned) = match &root {
            Some(root) => self.reconcile(root, &mut diff).await?,
            None => (0, 0),
        };

        let outcomes = self.executor.apply(&diff).await;
        let root_changed = match &root {
            Some(root) => self.store.write_root_listing(root).await?,
            None => false,
        };
        let report = self.publish(&outcomes, root_changed).await;
        if report.failed && self.options.require_publish {
            exn::bail!(ErrorKind::Publish);
        }

        let committed = diff.watermark.map_or(head, |w| w.max(head)).max(cursor);
        if committed != cursor {
            self.store.commit(committed).await?;
        }
        Ok(CycleSummary {
            kind: CycleKind::Incremental,
            previous: Some(cursor),
            committed,
            reconciled,
            pruned,
            root_changed,
            published: report.added,
            unpublished: report.removed,
            publish_failed: report.failed,
            outcomes,
        })
    }

    /// Page through the changelog from `cursor` to `head` and fold every
    /// event into a diff.
    #[instrument(level = "debug", skip(self))]
    async fn collect_diff(&self, cursor: Serial, head: Serial) -> Result<SyncDiff> {
        if head < cursor {
            tracing::warn!(cursor, head, "Remote head is behind the committed cursor");
        }
        let mut classifier = DiffClassifier::new();
        let mut pages = pin!(pages(&*self.feed, cursor, head));
        while let Some(page) = pages.next().await {
            let page = page.or_raise(|| ErrorKind::Feed)?;
            classifier.extend(&page.events);
            if let Some(last) = page.last_cursor {
                classifier.advance(last);
            }
        }
        let diff = classifier.finish();
        tracing::info!(
            from = cursor,
            to = ?diff.watermark,
            download = diff.to_download.len(),
            remove = diff.to_remove.len(),
            "Classified changelog"
        );
        Ok(diff)
    }

    /// Bring the diff in line with the remote listing: queue packages it
    /// names that storage lacks, and remove packages it no longer names.
    ///
    /// The changelog decides first: nothing it queued is moved between sets.
    /// An empty listing never prunes anything.
    async fn reconcile(&self, root: &[u8], diff: &mut SyncDiff) -> Result<(usize, usize)> {
        let remote = parse_root_listing(root);
        let local = self.store.list_local_packages().await?;
        let untouched = |p: &&PackageId| !diff.to_remove.contains(*p) && !diff.to_download.contains(*p);
        let missing: Vec<PackageId> = remote.difference(&local).filter(untouched).cloned().collect();
        let stale: Vec<PackageId> = match remote.is_empty() {
            true => {
                tracing::warn!(local = local.len(), "Root listing names no packages; not pruning");
                Vec::new()
            },
            false => local.difference(&remote).filter(untouched).cloned().collect(),
        };
        if !missing.is_empty() {
            tracing::info!(packages = missing.len(), "Queueing packages missing locally");
        }
        if !stale.is_empty() {
            tracing::info!(packages = stale.len(), "Queueing packages no longer listed remotely");
        }
        let counts = (missing.len(), stale.len());
        diff.to_download.extend(missing);
        diff.to_remove.extend(stale);
        Ok(counts)
    }

    /// Derive metadata for everything written this cycle and hand it, along
    /// with removals, to the publisher. Failures are logged, not raised.
    async fn publish(&self, outcomes: &Outcomes, root_changed: bool) -> PublishReport {
        let mut paths: Vec<PathBuf> = outcomes.downloaded().map(package_index).collect();
        if root_changed {
            paths.push(PathBuf::from(ROOT_INDEX));
        }
        let artifacts =
            idxsync_digest::derive(self.store.backend(), paths, self.options.hash_algorithm, self.options.workers)
                .await;
        let removals: Vec<String> = outcomes.removed().map(|p| artifact_path(package_dir(p))).collect();

        let mut report = PublishReport::default();
        if !artifacts.is_empty() {
            match self.publisher.submit_add(&artifacts).await {
                Ok(()) => report.added = artifacts.len(),
                Err(e) => {
                    tracing::error!(publisher = self.publisher.name(), error = %e, "Publishing additions failed");
                    report.failed = true;
                },
            }
        }
        if !removals.is_empty() {
            match self.publisher.submit_remove(&removals).await {
                Ok(()) => report.removed = removals.len(),
                Err(e) => {
                    tracing::error!(publisher = self.publisher.name(), error = %e, "Publishing removals failed");
                    report.failed = true;
                },
            }
        }
        report
    }
}
