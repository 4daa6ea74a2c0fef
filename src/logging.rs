// src/logging.rs
use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber for the command line tools.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` selects `debug` over
/// `info` for this crate and `warn` for everything else.
pub fn init(verbose: bool) {
    let default = if verbose { "warn,decoder_core=debug" } else { "warn,decoder_core=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
