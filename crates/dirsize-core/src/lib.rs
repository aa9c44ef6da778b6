//! dirsize-core: directory size collection for the Prometheus exporter.
//!
//! Provides:
//! - `collector`: concurrent per-directory measurement and gauge cache
//! - `metrics`: metric identity constants, registry and text encoding
//! - `error`: configuration and measurement errors

pub mod collector;
pub mod error;
pub mod metrics;

#[cfg(test)]
mod test_support;

pub use collector::{DirectoryCollector, DirectoryObservation, DiskUsage};
pub use error::{ConfigError, MeasureError};
