//! Remote side of the mirror.
//!
//! Two things are read from the package index:
//!
//! - the **changelog**, an append-only log of package events addressed by a
//!   monotonically increasing serial, served page by page
//!   ([`ChangelogFeed`], [`pages`]);
//! - the **simple index** itself: a root listing linking every package and
//!   one document per package ([`IndexFetcher`], [`SimpleIndex`]).
//!
//! Loose feed rows are decoded into [`ChangelogEvent`]s here so that nothing
//! downstream deals with free-text actions.

mod changelog;
mod consts;
pub mod error;
mod event;
mod fetch;
mod listing;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod package;
mod xmlrpc;

pub use crate::changelog::{ChangelogFeed, FeedHandle, pages};
pub use crate::event::{ChangelogEvent, EventKind, Page, RawChange, Serial};
pub use crate::fetch::{FetcherHandle, HttpFetcher, IndexFetcher, SimpleIndex, http_client};
pub use crate::listing::parse_root_listing;
pub use crate::package::PackageId;
pub use crate::xmlrpc::XmlRpcFeed;
