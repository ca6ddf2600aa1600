//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Setup the tracing subscriber for the daemon
///
/// `RUST_LOG` takes precedence over the configured default level.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
            crate::Error::Config(format!("invalid log filter '{}': {}", default_level, e))
        })?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    Ok(())
}
