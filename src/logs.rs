use std::io;

use tracing_subscriber::EnvFilter;

/// Send log output to stderr, filtered by `RUST_LOG` when it is set.
///
/// Without `RUST_LOG` only warnings are shown, or nothing at all in
/// very-quiet mode.
pub fn init(very_quiet: bool) -> io::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if very_quiet => EnvFilter::new("off"),
        Err(_) => EnvFilter::new("warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(io::Error::other)
}
