//! Changelog client contract and paging.

use crate::error::{ErrorKind, Result};
use crate::event::{Page, Serial};
use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use std::sync::Arc;

pub type FeedHandle = Arc<dyn ChangelogFeed + Send + Sync>;

/// Read-only access to the remote changelog.
#[async_trait]
pub trait ChangelogFeed: Send + Sync {
    /// Serial of the most recent event.
    async fn head(&self) -> Result<Serial>;

    /// Events strictly after `cursor`, at most one feed-defined page of them,
    /// in ascending cursor order.
    async fn page_since(&self, cursor: Serial) -> Result<Page>;
}

/// Stream pages from `from` up to `head`.
///
/// Requests are strictly sequential: each one starts at the last cursor of
/// the previous page. The stream ends when a page reaches `head` or when
/// the feed returns an empty page (exhausted, even if short of `head`). A
/// transport error is yielded once and ends the stream.
pub fn pages<'a, F>(feed: &'a F, from: Serial, head: Serial) -> impl Stream<Item = Result<Page>> + Send + 'a
where
    F: ChangelogFeed + ?Sized,
{
    stream!({
        let mut cursor = from;
        while cursor < head {
            let page = match feed.page_since(cursor).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let Some(last) = page.last_cursor else {
                tracing::debug!(cursor, head, "Feed exhausted before reaching head");
                break;
            };
            if last <= cursor {
                yield Err(exn::Exn::from(ErrorKind::Decode(format!(
                    "page after {cursor} ended at {last}; the feed is not moving forward"
                ))));
                return;
            }
            tracing::debug!(from = cursor, to = last, events = page.events.len(), "Fetched changelog page");
            cursor = last;
            yield Ok(page);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangelogEvent, EventKind};
    use crate::mock::MockFeed;
    use crate::package::PackageId;
    use futures::TryStreamExt;

    fn feed(serials: impl IntoIterator<Item = Serial>, page_size: usize) -> MockFeed {
        let events = serials
            .into_iter()
            .map(|s| ChangelogEvent::new(PackageId::new(format!("pkg{s}")).unwrap(), EventKind::Updated, s));
        MockFeed::new(events).with_page_size(page_size)
    }

    #[tokio::test]
    async fn test_pages_until_head() {
        let feed = feed(1..=7, 3);
        let pages: Vec<Page> = pages(&feed, 0, 7).try_collect().await.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages.last().unwrap().last_cursor, Some(7));
        assert_eq!(feed.page_requests().await, vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_stops_once_head_is_reached() {
        let feed = feed(1..=10, 2);
        let pages: Vec<Page> = pages(&feed, 0, 3).try_collect().await.unwrap();
        // The second page overshoots head; nothing is requested after it.
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].last_cursor, Some(4));
    }

    #[tokio::test]
    async fn test_empty_page_ends_stream() {
        let feed = feed(1..=2, 5);
        let pages: Vec<Page> = pages(&feed, 0, 10).try_collect().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(feed.page_requests().await, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_nothing_requested_when_up_to_date() {
        let feed = feed(1..=2, 5);
        let pages: Vec<Page> = pages(&feed, 2, 2).try_collect().await.unwrap();
        assert!(pages.is_empty());
        assert!(feed.page_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let feed = feed(1..=4, 2).failing_after(1);
        let results: Vec<Result<Page>> = futures::StreamExt::collect(pages(&feed, 0, 4)).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(&**results[1].as_ref().unwrap_err(), ErrorKind::Transport(_)));
    }
}
