use tracing_subscriber::{EnvFilter, fmt};

/// Install the process-wide subscriber. Logs go to stderr so that record and
/// message output on stdout can be piped.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with an explicit fallback directive when `RUST_LOG` is unset.
pub fn init_with_default(directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
