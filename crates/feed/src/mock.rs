//! In-memory feed and fetcher for testing.

use crate::changelog::ChangelogFeed;
use crate::error::{ErrorKind, Result};
use crate::event::{ChangelogEvent, Page, Serial};
use crate::fetch::IndexFetcher;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Feed-side page limit used when a test does not pick one.
const DEFAULT_PAGE_SIZE: usize = 50_000;

/// Changelog feed serving a fixed list of events.
///
/// Pages are cut exactly like the real feed: everything strictly after the
/// requested cursor, at most `page_size` events.
pub struct MockFeed {
    events: Vec<ChangelogEvent>,
    head: Option<Serial>,
    page_size: usize,
    fail_after: Option<usize>,
    requests: Mutex<Vec<Serial>>,
}
impl MockFeed {
    /// Events must be supplied in ascending cursor order.
    pub fn new(events: impl IntoIterator<Item = ChangelogEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            head: None,
            page_size: DEFAULT_PAGE_SIZE,
            fail_after: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Report `head` regardless of the events held.
    pub fn with_head(mut self, head: Serial) -> Self {
        self.head = Some(head);
        self
    }

    /// Serve `pages` page requests, then fail every request after that.
    pub fn failing_after(mut self, pages: usize) -> Self {
        self.fail_after = Some(pages);
        self
    }

    /// Cursors passed to [`page_since`](ChangelogFeed::page_since), in order.
    pub async fn page_requests(&self) -> Vec<Serial> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ChangelogFeed for MockFeed {
    async fn head(&self) -> Result<Serial> {
        Ok(self.head.unwrap_or_else(|| self.events.last().map_or(0, |e| e.cursor)))
    }

    async fn page_since(&self, cursor: Serial) -> Result<Page> {
        let mut requests = self.requests.lock().await;
        if self.fail_after.is_some_and(|n| requests.len() >= n) {
            requests.push(cursor);
            exn::bail!(ErrorKind::Transport("mock feed unavailable".to_string()));
        }
        requests.push(cursor);
        let events: Vec<ChangelogEvent> =
            self.events.iter().filter(|e| e.cursor > cursor).take(self.page_size).cloned().collect();
        let last_cursor = events.last().map(|e| e.cursor);
        Ok(Page { events, last_cursor })
    }
}

/// Fetcher serving fixed documents by URL.
///
/// Unknown URLs answer 404; URLs marked with [`failing`](Self::failing)
/// answer with a transport error.
#[derive(Default)]
pub struct MockFetcher {
    documents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    requests: Mutex<Vec<String>>,
}
impl MockFetcher {
    pub fn with_documents(documents: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        Self {
            documents: documents.into_iter().map(|(url, body)| (url.into(), body.into())).collect(),
            ..Self::default()
        }
    }

    pub fn with_document(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(url.into(), body.into());
        self
    }

    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    /// URLs requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl IndexFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().await.push(url.to_string());
        if self.failing.contains(url) {
            exn::bail!(ErrorKind::Transport(url.to_string()));
        }
        match self.documents.get(url) {
            Some(body) => Ok(body.clone()),
            None => exn::bail!(ErrorKind::Status { url: url.to_string(), status: 404 }),
        }
    }
}
