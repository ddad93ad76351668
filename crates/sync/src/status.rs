//! How far behind the remote changelog the mirror is.

use crate::error::{ErrorKind, Result};
use crate::state::MirrorStateStore;
use exn::ResultExt;
use futures::StreamExt;
use idxsync_feed::{ChangelogFeed, PackageId, Serial, pages};
use std::collections::BTreeSet;
use std::fmt;
use std::pin::pin;
use tracing::instrument;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorStatus {
    /// Committed cursor; `None` if the mirror was never bootstrapped.
    pub cursor: Option<Serial>,
    pub head: Serial,
    /// Changelog events between the cursor and head. Only counted for an
    /// initialised mirror.
    pub pending_events: Option<usize>,
    /// Distinct packages those events touch.
    pub pending_packages: Option<usize>,
}
impl MirrorStatus {
    /// Serials between the cursor and head.
    pub fn lag(&self) -> Serial {
        self.head.saturating_sub(self.cursor.unwrap_or(0))
    }
}
impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cursor {
            Some(cursor) => writeln!(f, "local cursor:     {cursor}")?,
            None => writeln!(f, "local cursor:     (none, bootstrap required)")?,
        }
        writeln!(f, "remote head:      {}", self.head)?;
        writeln!(f, "lag:              {}", self.lag())?;
        if let (Some(events), Some(packages)) = (self.pending_events, self.pending_packages) {
            writeln!(f, "pending events:   {events}")?;
            writeln!(f, "pending packages: {packages}")?;
        }
        Ok(())
    }
}

/// Compare the committed cursor with the remote head, counting the events
/// still to be applied.
#[instrument(skip_all)]
pub async fn mirror_status<F: ChangelogFeed + ?Sized>(store: &MirrorStateStore, feed: &F) -> Result<MirrorStatus> {
    let cursor = match store.load().await {
        Ok(cursor) => Some(cursor),
        Err(e) if *e == ErrorKind::MissingState => None,
        Err(e) => return Err(e),
    };
    let head = feed.head().await.or_raise(|| ErrorKind::Feed)?;
    let Some(from) = cursor else {
        return Ok(MirrorStatus { cursor, head, pending_events: None, pending_packages: None });
    };
    let mut events = 0;
    let mut packages: BTreeSet<PackageId> = BTreeSet::new();
    let mut stream = pin!(pages(feed, from, head));
    while let Some(page) = stream.next().await {
        let page = page.or_raise(|| ErrorKind::Feed)?;
        events += page.events.len();
        packages.extend(page.events.into_iter().map(|e| e.package));
    }
    Ok(MirrorStatus {
        cursor,
        head,
        pending_events: Some(events),
        pending_packages: Some(packages.len()),
    })
}
