//! Layered configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults ([`Config::default`]);
//! 2. a configuration file (TOML, YAML or JSON, picked by extension), either
//!    given explicitly or `config.toml` in the platform config directory;
//! 3. environment variables prefixed `IDXSYNC_`, with `__` separating nested
//!    keys (`IDXSYNC_PUBLISHER__URL`);
//! 4. command-line [`Overrides`].
//!
//! The merged result is validated and normalised before it is handed out.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use idxsync_digest::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "IDXSYNC_";
const DEFAULT_MIRROR_ROOT: &str = "pypi_mirror";
const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";
const DEFAULT_CHANGELOG_URL: &str = "https://pypi.org/pypi";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Everything a sync cycle needs to know.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the mirrored tree. Absolute once loaded.
    pub mirror_root: PathBuf,
    /// Root of the simple index. Always ends in `/` once loaded.
    pub index_url: String,
    /// XML-RPC endpoint serving the changelog.
    pub changelog_url: String,
    /// Upper bound on concurrent fetch/remove/digest operations.
    pub workers: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Repository service to notify; `None` disables publishing.
    pub publisher: Option<PublisherConfig>,
    /// Refuse to advance the cursor when publishing fails.
    pub require_publish: bool,
    /// Also publish metadata for documents fetched during bootstrap.
    pub publish_bootstrap: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirror_root: PathBuf::from(DEFAULT_MIRROR_ROOT),
            index_url: DEFAULT_INDEX_URL.to_string(),
            changelog_url: DEFAULT_CHANGELOG_URL.to_string(),
            workers: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            hash_algorithm: HashAlgorithm::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: concat!("idxsync/", env!("CARGO_PKG_VERSION")).to_string(),
            publisher: None,
            require_publish: false,
            publish_bootstrap: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Base URL of the repository service API, e.g. `http://rstuf/api/v1`.
    pub url: String,
    /// Maximum artifacts per addition request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
}

impl Config {
    /// Default location of the configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "idxsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load, merge and validate every configuration layer.
    ///
    /// An explicitly given `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(path) if !path.is_file() => {
                exn::bail!(ErrorKind::Load(format!("config file {} does not exist", path.display())));
            },
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "Reading configuration file");
            figment = merge_file(figment, path)?;
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()
            .or_raise(|| ErrorKind::Load("could not merge configuration sources".to_string()))?;
        config.validated()
    }

    /// Check invariants and normalise paths and URLs.
    pub fn validated(mut self) -> Result<Self> {
        if self.workers == 0 {
            exn::bail!(ErrorKind::Invalid("workers must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("timeout_secs must be at least 1".to_string()));
        }
        check_url("index_url", &self.index_url)?;
        check_url("changelog_url", &self.changelog_url)?;
        if let Some(publisher) = &self.publisher {
            check_url("publisher.url", &publisher.url)?;
            if publisher.batch_size == 0 {
                exn::bail!(ErrorKind::Invalid("publisher.batch_size must be at least 1".to_string()));
            }
        }
        if !self.index_url.ends_with('/') {
            self.index_url.push('/');
        }
        if self.mirror_root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("mirror_root must not be empty".to_string()));
        }
        if self.mirror_root.is_relative() {
            let cwd = std::env::current_dir()
                .or_raise(|| ErrorKind::Invalid("cannot resolve relative mirror_root".to_string()))?;
            self.mirror_root = cwd.join(&self.mirror_root);
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let figment = match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Load(format!("unsupported config file format: {}", path.display()))),
    };
    Ok(figment)
}

fn check_url(field: &str, url: &str) -> Result<()> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => exn::bail!(ErrorKind::Invalid(format!("{field} is not an http(s) URL: {url:?}"))),
    }
}
