//! Diagnostic logging.
//!
//! A TUI owns the terminal, so log output has to go somewhere else.  The
//! runtime logs through `tracing`; [`log_to_file`] routes it to a file.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `tapioca_core=debug`.
pub const LOG_FILTER_ENV: &str = "TAPIOCA_LOG";

const DEFAULT_FILTER: &str = "info";

/// Send `tracing` output to a file, opened in append mode.
///
/// The filter comes from `TAPIOCA_LOG` (default `info`).  Returns
/// `Ok(false)` when a global subscriber was already installed, in which case
/// that subscriber keeps receiving events.
///
/// # Example
///
/// ```no_run
/// tapioca_core::log_to_file("debug.log").unwrap();
/// tracing::info!("visible in debug.log");
/// ```
pub fn log_to_file(path: impl AsRef<Path>) -> io::Result<bool> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(path = %path.as_ref().display(), "logging to file");
    }
    Ok(installed)
}
