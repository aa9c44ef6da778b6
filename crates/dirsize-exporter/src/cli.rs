//! Command-line interface and configuration resolution.
//!
//! Flags are parsed by clap; environment variables are applied afterwards and
//! take precedence over flags when set to a non-empty value.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use dirsize_core::ConfigError;
use dirsize_core::collector::DEFAULT_MEASURE_TIMEOUT;

use crate::server::{DEFAULT_METRICS_PATH, DEFAULT_METRICS_PORT, ServerConfig};

pub const ENV_DIRECTORIES: &str = "DIRECTORIES";
pub const ENV_METRICS_PORT: &str = "METRICS_PORT";
pub const ENV_METRICS_PATH: &str = "METRICS_PATH";
pub const ENV_MEASURE_TIMEOUT: &str = "MEASURE_TIMEOUT";

#[derive(Parser, Debug)]
#[command(
    name = "prom-dirsize-exporter",
    about = "Prometheus directory size exporter",
    long_about = "Prometheus directory size exporter is a tool that exports the size of directories to Prometheus."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Starts the prometheus exporter.
    #[command(
        after_help = "Example:\n  prom-dirsize-exporter serve --metrics-port 8080 --metrics-path /metrics --directories /var/log:/var/tmp"
    )]
    Serve(ServeArgs),
    /// Print the version number.
    Version,
}

/// How directory sizes are measured.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Native filesystem walk.
    #[default]
    Walk,
    /// External `du -s -B1`.
    Du,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// The port where the metrics server will listen.
    #[arg(short = 'p', long, default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// The path where the metrics will be exposed.
    #[arg(short = 'm', long, default_value = DEFAULT_METRICS_PATH)]
    pub metrics_path: String,

    /// A colon separated list of directories to monitor.
    #[arg(short, long, default_value = "")]
    pub directories: OsString,

    /// Maximum seconds a single scrape may spend measuring directories.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_MEASURE_TIMEOUT.as_secs())]
    pub measure_timeout: u64,

    /// How directory sizes are measured.
    #[arg(long, value_enum, default_value_t = Strategy::Walk)]
    pub strategy: Strategy,
}

/// Fully resolved `serve` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub directories: Vec<PathBuf>,
    pub measure_timeout: Duration,
    pub strategy: Strategy,
    pub server: ServerConfig,
}

impl ServeArgs {
    /// Applies environment overrides (looked up through `env`) and validates.
    ///
    /// Empty environment values are ignored, matching an unset variable.
    pub fn resolve<F>(self, env: F) -> Result<ServeConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|v| !v.is_empty());

        let directories = match lookup(ENV_DIRECTORIES) {
            Some(value) => split_directories(value.as_ref()),
            None => split_directories(&self.directories),
        };

        let metrics_port = match lookup(ENV_METRICS_PORT) {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: ENV_METRICS_PORT,
                    value: value.clone(),
                    reason: e.to_string(),
                })?,
            None => self.metrics_port,
        };

        let metrics_path = lookup(ENV_METRICS_PATH).unwrap_or(self.metrics_path);

        let timeout_secs = match lookup(ENV_MEASURE_TIMEOUT) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: ENV_MEASURE_TIMEOUT,
                    value: value.clone(),
                    reason: e.to_string(),
                })?,
            None => self.measure_timeout,
        };
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "measure timeout",
                value: timeout_secs.to_string(),
                reason: "must be at least one second".to_string(),
            });
        }

        let server = ServerConfig {
            port: metrics_port,
            metrics_path,
            ..ServerConfig::default()
        };
        server.validate()?;

        Ok(ServeConfig {
            directories,
            measure_timeout: Duration::from_secs(timeout_secs),
            strategy: self.strategy,
            server,
        })
    }
}

/// Splits a platform path list (`:` on unix, `;` on Windows), dropping empty
/// entries such as the one produced by an unset flag or a trailing separator.
fn split_directories(list: &std::ffi::OsStr) -> Vec<PathBuf> {
    std::env::split_paths(list)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}
