//! Folding changelog events into a diff.

use idxsync_feed::{ChangelogEvent, EventKind, PackageId, Serial};
use std::collections::BTreeSet;

/// The minimal set of actions that brings the mirror up to a watermark.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncDiff {
    pub to_download: BTreeSet<PackageId>,
    pub to_remove: BTreeSet<PackageId>,
    /// Cursor of the last event folded in, `None` if there were none.
    pub watermark: Option<Serial>,
}
impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.to_download.is_empty() && self.to_remove.is_empty()
    }

    /// Number of packages touched.
    pub fn len(&self) -> usize {
        self.to_download.len() + self.to_remove.len()
    }
}

/// Incremental classifier; feed it pages as they arrive.
///
/// Each event first clears whatever an earlier event in the window decided
/// for its package, then files the package according to its own kind. A
/// rename additionally files the old name for removal, so the outcome for a
/// package is decided by the last event that mentions it.
#[derive(Debug, Default)]
pub struct DiffClassifier {
    diff: SyncDiff,
}
impl DiffClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &ChangelogEvent) {
        let diff = &mut self.diff;
        diff.to_download.remove(&event.package);
        diff.to_remove.remove(&event.package);
        match &event.kind {
            EventKind::Removed => {
                diff.to_remove.insert(event.package.clone());
            },
            EventKind::Renamed { from } if *from != event.package => {
                diff.to_download.remove(from);
                diff.to_remove.insert(from.clone());
                diff.to_download.insert(event.package.clone());
            },
            EventKind::Created
            | EventKind::Added
            | EventKind::Updated
            | EventKind::DocUpdate
            | EventKind::Renamed { .. } => {
                diff.to_download.insert(event.package.clone());
            },
        }
        diff.watermark = Some(event.cursor);
    }

    pub fn extend<'a>(&mut self, events: impl IntoIterator<Item = &'a ChangelogEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Move the watermark past rows that produced no event.
    pub fn advance(&mut self, cursor: Serial) {
        if self.diff.watermark.is_none_or(|w| w < cursor) {
            self.diff.watermark = Some(cursor);
        }
    }

    pub fn finish(self) -> SyncDiff {
        self.diff
    }
}

/// Classify a complete, cursor-ordered sequence of events.
pub fn classify<'a>(events: impl IntoIterator<Item = &'a ChangelogEvent>) -> SyncDiff {
    let mut classifier = DiffClassifier::new();
    classifier.extend(events);
    classifier.finish()
}
