//! Sets up the global `tracing` subscriber.

use std::{fs::OpenOptions, io, path::Path, sync::Arc};

use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

/// The filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Install a subscriber that writes to stderr and, optionally, to a debug log file.
///
/// The stderr output is filtered by the `RUST_LOG` environment variable,
/// falling back to [DEFAULT_LOG_FILTER]. The log file, if any, receives
/// everything at `debug` level and above, including the balance changes made
/// by each operation.
///
/// # Errors
/// Returns an error if the log file cannot be opened for appending.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), io::Error> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(env_filter);

    let debug_log = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(filter::LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    // Ignore the error if a subscriber was already installed, e.g. by a test harness.
    let _ = tracing_subscriber::registry()
        .with(stderr_log)
        .with(debug_log)
        .try_init();

    Ok(())
}
