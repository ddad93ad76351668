//! Downstream hand-off of artifact metadata.
//!
//! After every cycle the mirror tells a TUF repository service which index
//! documents were added or changed (with their length and digest) and which
//! were removed. The service signs new metadata from that; the mirror never
//! does any signing itself.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod rstuf;

pub use crate::rstuf::RstufPublisher;

use crate::error::Result;
use async_trait::async_trait;
use idxsync_digest::ArtifactMetadata;
use std::sync::Arc;

pub type PublisherHandle = Arc<dyn ArtifactPublisher + Send + Sync>;

/// Receiver of artifact metadata.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Announce new or changed artifacts.
    async fn submit_add(&self, artifacts: &[ArtifactMetadata]) -> Result<()>;

    /// Announce removed artifacts by path.
    async fn submit_remove(&self, paths: &[String]) -> Result<()>;
}

/// Publisher used when no repository service is configured; accepts
/// everything and only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledPublisher;

#[async_trait]
impl ArtifactPublisher for DisabledPublisher {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn submit_add(&self, artifacts: &[ArtifactMetadata]) -> Result<()> {
        tracing::debug!(artifacts = artifacts.len(), "No publisher configured; dropping additions");
        Ok(())
    }

    async fn submit_remove(&self, paths: &[String]) -> Result<()> {
        tracing::debug!(paths = paths.len(), "No publisher configured; dropping removals");
        Ok(())
    }
}
