//! Directory size collection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   DirectoryCollector                     │
//! │  - one worker thread per directory per scrape            │
//! │  - handle cache: path -> Gauge (directory_size_bytes)    │
//! └──────────────────────────┬───────────────────────────────┘
//!                            │
//!                     ┌──────▼──────┐
//!                     │  DiskUsage  │ (trait)
//!                     └──────┬──────┘
//!              ┌─────────────┼───────────────┐
//!       ┌──────▼───────┐ ┌───▼────────┐ ┌────▼──────────┐
//!       │ WalkDiskUsage│ │ DuCommand  │ │ MockDiskUsage │
//!       │ (native)     │ │ (du -sB1)  │ │ (testing)     │
//!       └──────────────┘ └────────────┘ └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use dirsize_core::collector::{DirectoryCollector, MockDiskUsage};
//!
//! let usage = MockDiskUsage::new();
//! usage.set_size("/var/log", 4096);
//! let collector = DirectoryCollector::new(["/var/log", "/missing"], usage).unwrap();
//!
//! let observations = collector.collect_sizes();
//! assert_eq!(observations.len(), 1);
//! assert_eq!(observations[0].bytes, 4096);
//! ```

#[allow(clippy::module_inception)]
mod collector;
mod du;
pub mod mock;
pub mod traits;

pub use collector::{
    DEFAULT_MEASURE_TIMEOUT, DirectoryCollector, DirectoryObservation, SeriesLabels,
};
pub use du::DuCommand;
pub use mock::MockDiskUsage;
pub use traits::{CancelFlag, DiskUsage, WalkDiskUsage};
