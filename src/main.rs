mod cli;
mod error;
mod logging;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use idxsync_config::Config;
use idxsync_digest::ArtifactMetadata;
use idxsync_feed::{FeedHandle, FetcherHandle, HttpFetcher, SimpleIndex, XmlRpcFeed, http_client};
use idxsync_publish::{DisabledPublisher, PublisherHandle, RstufPublisher};
use idxsync_storage::BackendHandle;
use idxsync_storage::backend::LocalBackend;
use idxsync_sync::{CURSOR_FILE, MirrorLock, MirrorStateStore, Orchestrator, SyncOptions, mirror_status};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref(), &cli.overrides()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(?config, "Loaded configuration");
    match cli.command {
        Command::Sync => sync(&config).await,
        Command::Status => status(&config).await,
        Command::Manifest { output } => manifest(&config, output.as_deref()).await,
    }
}

fn open_mirror(config: &Config) -> Result<BackendHandle> {
    let backend = LocalBackend::new("mirror", &config.mirror_root).or_raise(|| ErrorKind::Storage)?;
    Ok(Arc::new(backend))
}

async fn sync(config: &Config) -> Result<()> {
    let lock = MirrorLock::acquire(&config.mirror_root).or_raise(|| ErrorKind::Sync)?;
    let store = MirrorStateStore::new(open_mirror(config)?);
    let http = http_client(config.timeout(), &config.user_agent).or_raise(|| ErrorKind::Feed)?;
    let feed: FeedHandle = Arc::new(XmlRpcFeed::new(http.clone(), &config.changelog_url));
    let fetcher: FetcherHandle = Arc::new(HttpFetcher::new(http.clone()));
    let publisher: PublisherHandle = match &config.publisher {
        Some(publisher) => Arc::new(RstufPublisher::new(http, &publisher.url, publisher.batch_size)),
        None => Arc::new(DisabledPublisher),
    };
    let options = SyncOptions {
        workers: config.workers,
        hash_algorithm: config.hash_algorithm,
        require_publish: config.require_publish,
        publish_bootstrap: config.publish_bootstrap,
    };
    let index = SimpleIndex::new(&config.index_url);
    let mut orchestrator = Orchestrator::new(store, feed, fetcher, publisher, index, options);
    let summary = orchestrator.run(&lock).await.or_raise(|| ErrorKind::Sync)?;
    println!(
        "{} cycle committed serial {}: {} downloaded, {} removed, {} failed",
        summary.kind,
        summary.committed,
        summary.downloaded(),
        summary.removed(),
        summary.failed(),
    );
    for (package, error) in summary.outcomes.failures() {
        println!("  {package}: {error}");
    }
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let store = MirrorStateStore::new(open_mirror(config)?);
    let http = http_client(config.timeout(), &config.user_agent).or_raise(|| ErrorKind::Feed)?;
    let feed = XmlRpcFeed::new(http, &config.changelog_url);
    let status = mirror_status(&store, &feed).await.or_raise(|| ErrorKind::Sync)?;
    print!("{status}");
    Ok(())
}

async fn manifest(config: &Config, output: Option<&Path>) -> Result<()> {
    let backend = open_mirror(config)?;
    let artifacts: Vec<ArtifactMetadata> = idxsync_digest::derive_all(&backend, config.hash_algorithm, config.workers)
        .await
        .into_iter()
        .filter(|artifact| artifact.path != CURSOR_FILE)
        .collect();
    tracing::info!(
        artifacts = artifacts.len(),
        bytes = idxsync_digest::total_length(&artifacts),
        "Derived mirror manifest"
    );
    let json = serde_json::to_vec_pretty(&artifacts).or_raise(|| ErrorKind::Output)?;
    match output {
        Some(path) => tokio::fs::write(path, json).await.or_raise(|| ErrorKind::Output)?,
        None => println!("{}", String::from_utf8_lossy(&json)),
    }
    Ok(())
}
