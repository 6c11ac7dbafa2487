//! Log file setup for the binary.
//!
//! stdout belongs to the dashboard output, so records go to a file under the
//! user's state directory instead of the terminal.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Environment variable consulted when `--log-filter` is absent
pub const LOG_FILTER_ENV: &str = "PANEDECK_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

static TELEMETRY_GUARD: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("no state or home directory to keep the log file in")]
    NoStateDir,

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Install the global subscriber writing to the log file. Returns the log
/// file path. Later calls return the path chosen by the first one.
pub fn initialise(filter: Option<&str>) -> Result<PathBuf, TelemetryError> {
    if let Some(path) = TELEMETRY_GUARD.get() {
        return Ok(path.clone());
    }

    let path = log_path()?;
    install_subscriber(&resolve_filter(filter), &path)?;
    Ok(TELEMETRY_GUARD.get_or_init(|| path).clone())
}

/// `--log-filter` wins over the environment, which wins over the default.
fn resolve_filter(flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var(LOG_FILTER_ENV).ok())
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

fn log_path() -> Result<PathBuf, TelemetryError> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
        .ok_or(TelemetryError::NoStateDir)?;
    Ok(base.join("panedeck").join("panedeck.log"))
}

fn open_log_file(path: &Path) -> Result<File, TelemetryError> {
    let log_file_error = |source| TelemetryError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(log_file_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_file_error)
}

fn install_subscriber(filter: &str, path: &Path) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let file = open_log_file(path)?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .finish();

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
