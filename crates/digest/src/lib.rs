//! Content-addressed metadata for mirrored index documents.
//!
//! Every index document touched by a sync cycle is described by an
//! [`ArtifactMetadata`] record (path, length, digest) before it is handed to
//! the downstream publisher. The digest always travels with the tag of the
//! algorithm that produced it so consumers never have to assume one.

pub mod error;

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use futures::StreamExt;
use idxsync_storage::{BackendHandle, FileInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;

/// A supported digest algorithm, identified by its tag.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256, the algorithm TUF metadata is normally keyed by.
    #[default]
    #[display("sha256")]
    #[serde(rename = "sha256", alias = "SHA-256", alias = "sha-256")]
    Sha256,
    /// BLAKE3, 256-bit output.
    #[display("blake3")]
    #[serde(rename = "blake3", alias = "BLAKE3")]
    Blake3,
}
impl HashAlgorithm {
    /// The tag recorded alongside every digest.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Lowercase hex digest of `data`.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}
impl FromStr for HashAlgorithm {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => exn::bail!(ErrorKind::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Path, length and digest of one mirrored file.
///
/// Computed fresh every cycle for every path the cycle touched; never cached
/// because the content may have changed since.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Path relative to the mirror root, always `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub length: u64,
    pub hash_algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub hash: String,
}
impl ArtifactMetadata {
    /// Describe `data` as the content stored at `path`.
    pub fn compute(path: impl AsRef<Path>, data: &[u8], algorithm: HashAlgorithm) -> Self {
        Self {
            path: artifact_path(path),
            length: data.len() as u64,
            hash_algorithm: algorithm,
            hash: algorithm.digest(data),
        }
    }
}

/// Render a relative storage path the way the publisher expects it:
/// `/`-separated regardless of platform.
pub fn artifact_path(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive metadata for every path in `paths`, reading up to `concurrency`
/// files at a time.
///
/// A path that cannot be read is logged and left out of the result; the
/// output is sorted by path.
#[instrument(skip_all, fields(backend = backend.name(), algorithm = %algorithm))]
pub async fn derive<P: Into<PathBuf>>(
    backend: &BackendHandle,
    paths: impl IntoIterator<Item = P>,
    algorithm: HashAlgorithm,
    concurrency: usize,
) -> Vec<ArtifactMetadata> {
    let mut artifacts: Vec<ArtifactMetadata> = futures::stream::iter(paths.into_iter().map(Into::into))
        .map(|path: PathBuf| async move {
            match backend.read(&path).await {
                Ok(data) => Some(ArtifactMetadata::compute(&path, &data, algorithm)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not read artifact; leaving it out of metadata");
                    None
                },
            }
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(std::future::ready)
        .collect()
        .await;
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    artifacts
}

/// Derive metadata for every file in the backend.
///
/// Listing errors for individual entries are logged and skipped, matching
/// the per-path omission of [`derive`].
#[instrument(skip_all, fields(backend = backend.name(), algorithm = %algorithm))]
pub async fn derive_all(backend: &BackendHandle, algorithm: HashAlgorithm, concurrency: usize) -> Vec<ArtifactMetadata> {
    let files: Vec<FileInfo> = backend
        .list_stream(None)
        .filter_map(|entry| {
            std::future::ready(match entry {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unlistable entry");
                    None
                },
            })
        })
        .collect()
        .await;
    let bytes: u64 = files.iter().map(|info| info.size).sum();
    tracing::debug!(files = files.len(), bytes, "Discovered mirror files");
    derive(backend, files.into_iter().map(|info| info.path), algorithm, concurrency).await
}

/// Sum of `length` across `artifacts`.
pub fn total_length(artifacts: &[ArtifactMetadata]) -> u64 {
    artifacts.iter().map(|a| a.length).sum()
}
