use crate::ArtifactPublisher;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use idxsync_digest::ArtifactMetadata;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, Serialize)]
struct AddPayload<'a> {
    artifacts: Vec<AddArtifact<'a>>,
}

#[derive(Debug, Serialize)]
struct AddArtifact<'a> {
    info: ArtifactInfo<'a>,
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct ArtifactInfo<'a> {
    length: u64,
    hashes: BTreeMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
struct RemovePayload<'a> {
    artifacts: &'a [String],
}

impl<'a> AddPayload<'a> {
    fn new(artifacts: &'a [ArtifactMetadata]) -> Self {
        let artifacts = artifacts
            .iter()
            .map(|a| AddArtifact {
                info: ArtifactInfo {
                    length: a.length,
                    hashes: BTreeMap::from([(a.hash_algorithm.tag(), a.hash.as_str())]),
                },
                path: &a.path,
            })
            .collect();
        Self { artifacts }
    }
}

/// Publisher for the Repository Service for TUF artifacts API.
///
/// Additions go to `POST {base}/artifacts`, removals to
/// `POST {base}/artifacts/delete`. Additions are sent in chunks of at most
/// `batch_size` artifacts; a failed chunk fails the submission, although
/// chunks already accepted stay accepted.
#[derive(Clone, Debug)]
pub struct RstufPublisher {
    http: reqwest::Client,
    add_url: String,
    delete_url: String,
    batch_size: usize,
}
impl RstufPublisher {
    pub fn new(http: reqwest::Client, base_url: &str, batch_size: usize) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            http,
            add_url: format!("{base}/artifacts"),
            delete_url: format!("{base}/artifacts/delete"),
            batch_size: batch_size.max(1),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, payload: &T) -> Result<()> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(url, status = status.as_u16(), body = %body, "Publisher rejected request");
            exn::bail!(ErrorKind::Rejected { status: status.as_u16() });
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactPublisher for RstufPublisher {
    fn name(&self) -> &str {
        "rstuf"
    }

    #[instrument(skip_all, fields(artifacts = artifacts.len()))]
    async fn submit_add(&self, artifacts: &[ArtifactMetadata]) -> Result<()> {
        for chunk in artifacts.chunks(self.batch_size) {
            self.post(&self.add_url, &AddPayload::new(chunk)).await?;
            tracing::info!(artifacts = chunk.len(), "Published artifact additions");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(paths = paths.len()))]
    async fn submit_remove(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.post(&self.delete_url, &RemovePayload { artifacts: paths }).await?;
        tracing::info!(paths = paths.len(), "Published artifact removals");
        Ok(())
    }
}
