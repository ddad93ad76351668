use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise everything logs at `warn` and this
/// program's own crates at `info`, `debug` (`-v`) or `trace` (`-vv`).
pub fn init(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // Target directives match by prefix, so this covers every `idxsync_*` crate.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("warn,idxsync={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(verbose > 0).with_writer(std::io::stderr).init();
}
