//! Fetching index documents over HTTP.

use crate::error::{ErrorKind, Result};
use crate::package::PackageId;
use async_trait::async_trait;
use exn::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub type FetcherHandle = Arc<dyn IndexFetcher + Send + Sync>;

/// Retrieves raw index documents.
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    /// Fetch the document at `url`.
    ///
    /// Fails with [`Transport`](ErrorKind::Transport) when the remote end is
    /// unreachable and [`Status`](ErrorKind::Status) for non-2xx answers.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Location of the simple index: the root listing and one document per
/// package beneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleIndex {
    base: String,
}
impl SimpleIndex {
    /// `base` is the root listing URL; a trailing `/` is added if missing.
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }

    pub fn root_url(&self) -> &str {
        &self.base
    }

    /// Per-package document URL, with the name percent-encoded as a single
    /// path segment.
    pub fn package_url(&self, package: &PackageId) -> String {
        let mut url = match reqwest::Url::parse(&self.base) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => return format!("{}{}/", self.base, package),
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(package.as_str()).push("");
        }
        url.into()
    }
}

/// Build the HTTP client shared by the fetcher and the changelog feed.
pub fn http_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .or_raise(|| ErrorKind::Transport("could not build HTTP client".to_string()))
}

/// [`IndexFetcher`] backed by a [`reqwest::Client`].
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http: reqwest::Client,
}
impl HttpFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IndexFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await.or_raise(|| ErrorKind::Transport(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status { url: url.to_string(), status: status.as_u16() });
        }
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport(url.to_string()))?;
        Ok(body.to_vec())
    }
}
