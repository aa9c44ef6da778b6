//! dirsize-exporter: HTTP surface of the Prometheus directory size exporter.
//!
//! Provides:
//! - `cli`: argument parsing and environment overrides
//! - `server`: `MetricsServer` and its lifecycle
//! - `logging`: tracing subscriber setup
//! - `version`: build information

pub mod cli;
mod handlers;
pub mod logging;
pub mod server;
pub mod version;

use prometheus::Registry;
use tracing::{info, warn};

use dirsize_core::collector::{DirectoryCollector, DiskUsage, DuCommand, WalkDiskUsage};
use dirsize_core::metrics::new_registry;

pub use cli::{ServeConfig, Strategy};
pub use handlers::LIVENESS_BODY;
pub use server::{MetricsServer, ServerConfig, ServerError, ServerState};

/// Creates a registry holding process metrics and a directory collector
/// configured from `config`.
pub fn build_registry(config: &ServeConfig) -> Result<Registry, dirsize_core::ConfigError> {
    let registry = new_registry()?;
    match config.strategy {
        Strategy::Walk => register_collector(&registry, config, WalkDiskUsage::new())?,
        Strategy::Du => register_collector(&registry, config, DuCommand::new())?,
    }
    Ok(registry)
}

fn register_collector<U: DiskUsage>(
    registry: &Registry,
    config: &ServeConfig,
    usage: U,
) -> Result<(), dirsize_core::ConfigError> {
    if config.directories.is_empty() {
        warn!("no directories configured, only process metrics will be exported");
    }
    let collector = DirectoryCollector::new(config.directories.iter().cloned(), usage)?
        .with_timeout(config.measure_timeout);
    info!(
        directories = ?collector.directories(),
        strategy = ?config.strategy,
        timeout_secs = collector.timeout().as_secs(),
        "directory collector registered"
    );
    registry.register(Box::new(collector))?;
    Ok(())
}
