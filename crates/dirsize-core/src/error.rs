//! Error types shared by the collector and the exporter binary.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A directory entry was an empty string (e.g. `"/var/log::/tmp"`).
    #[error("directory list contains an empty entry")]
    EmptyDirectory,

    #[error("metrics path must start with '/', got {0:?}")]
    InvalidMetricsPath(String),

    /// A flag or environment variable held a value that could not be used.
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to create metric: {0}")]
    Metric(#[from] prometheus::Error),
}

/// Failure to measure a single directory during one collection pass.
///
/// These never escape the collector: they are logged and the affected
/// directory keeps whatever value it had before.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("directory does not exist")]
    NotFound,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("unexpected output from `{program}`: {output:?}")]
    Parse { program: String, output: String },

    #[error("measurement did not finish within {0:?}")]
    Timeout(Duration),

    #[error("measurement cancelled")]
    Cancelled,

    /// A measurement abandoned by an earlier pass has not returned yet.
    #[error("previous measurement timed out and is still running")]
    StillRunning,

    #[error("failed to spawn measurement worker: {0}")]
    Spawn(#[source] io::Error),

    /// The worker thread went away without reporting (it panicked).
    #[error("measurement worker exited without a result")]
    WorkerLost,
}
