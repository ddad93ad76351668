//! Recording publisher for testing.

use crate::ArtifactPublisher;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use idxsync_digest::ArtifactMetadata;
use tokio::sync::Mutex;

/// Publisher that remembers every submission.
///
/// When built with [`rejecting`](Self::rejecting) every submission is still
/// recorded but answered with [`ErrorKind::Rejected`].
#[derive(Default)]
pub struct RecordingPublisher {
    reject_with: Option<u16>,
    added: Mutex<Vec<Vec<ArtifactMetadata>>>,
    removed: Mutex<Vec<Vec<String>>>,
}
impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(status: u16) -> Self {
        Self { reject_with: Some(status), ..Self::default() }
    }

    /// Each `submit_add` call, in order.
    pub async fn added(&self) -> Vec<Vec<ArtifactMetadata>> {
        self.added.lock().await.clone()
    }

    /// Each `submit_remove` call, in order.
    pub async fn removed(&self) -> Vec<Vec<String>> {
        self.removed.lock().await.clone()
    }

    fn outcome(&self) -> Result<()> {
        match self.reject_with {
            Some(status) => exn::bail!(ErrorKind::Rejected { status }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn submit_add(&self, artifacts: &[ArtifactMetadata]) -> Result<()> {
        self.added.lock().await.push(artifacts.to_vec());
        self.outcome()
    }

    async fn submit_remove(&self, paths: &[String]) -> Result<()> {
        self.removed.lock().await.push(paths.to_vec());
        self.outcome()
    }
}
