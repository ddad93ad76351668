use clap::{ArgAction, Parser, Subcommand};
use idxsync_config::Overrides;
use idxsync_digest::HashAlgorithm;
use std::path::PathBuf;

/// Keep a local mirror of a package simple index in sync with its changelog.
#[derive(Parser, Debug)]
#[command(name = "idxsync", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, global = true, env = "IDXSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// More logging; repeat for even more
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Directory holding the mirror
    #[arg(long, global = true)]
    pub mirror_root: Option<PathBuf>,

    /// Root URL of the simple index
    #[arg(long, global = true)]
    pub index_url: Option<String>,

    /// XML-RPC endpoint serving the changelog
    #[arg(long, global = true)]
    pub changelog_url: Option<String>,

    /// Concurrent downloads, removals and digests
    #[arg(long, short = 'j', global = true)]
    pub workers: Option<usize>,

    /// Digest algorithm for artifact metadata (sha256 or blake3)
    #[arg(long, global = true, value_parser = parse_algorithm)]
    pub hash_algorithm: Option<HashAlgorithm>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run one sync cycle (bootstrapping the mirror if needed)
    Sync,
    /// Compare the committed cursor with the remote changelog
    Status,
    /// Write metadata for every mirrored file as JSON
    Manifest {
        /// Output file; standard output if omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            mirror_root: self.mirror_root.clone(),
            index_url: self.index_url.clone(),
            changelog_url: self.changelog_url.clone(),
            workers: self.workers,
            hash_algorithm: self.hash_algorithm,
        }
    }
}

fn parse_algorithm(tag: &str) -> Result<HashAlgorithm, String> {
    tag.parse::<HashAlgorithm>().map_err(|e: idxsync_digest::error::Error| e.to_string())
}
