//! Abstractions for disk-usage measurement.
//!
//! The `DiskUsage` trait lets the collector measure directories with a native
//! filesystem walk, an external `du` process, or an in-memory mock in tests.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use walkdir::WalkDir;

use crate::error::MeasureError;

/// Cooperative cancellation signal handed to a running measurement.
///
/// Raised by the collector when a measurement outlives its deadline so the
/// abandoned worker stops instead of walking the tree to the end.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Strategy for measuring how many bytes a directory occupies on disk.
pub trait DiskUsage: Send + Sync + 'static {
    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Returns the allocated size of `path` and everything below it, in bytes.
    ///
    /// Implementations should check `cancel` periodically and return
    /// [`MeasureError::Cancelled`] once it is raised.
    fn measure(&self, path: &Path, cancel: &CancelFlag) -> Result<u64, MeasureError>;
}

/// Native recursive walk summing allocated blocks, matching `du -s -B1`.
///
/// Symlinks are not followed (the link itself is counted), hard-linked files
/// are counted once per walk, and directories contribute their own blocks.
/// Any unreadable entry fails the whole measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkDiskUsage;

impl WalkDiskUsage {
    pub fn new() -> Self {
        Self
    }
}

impl DiskUsage for WalkDiskUsage {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn measure(&self, path: &Path, cancel: &CancelFlag) -> Result<u64, MeasureError> {
        let mut seen_inodes = HashSet::new();
        let mut total: u64 = 0;

        for entry in WalkDir::new(path).follow_links(false) {
            if cancel.is_cancelled() {
                return Err(MeasureError::Cancelled);
            }
            let entry = entry?;
            let metadata = entry.metadata()?;
            total = total.saturating_add(allocated_bytes(&metadata, &mut seen_inodes));
        }

        Ok(total)
    }
}

/// Bytes allocated on disk for one entry; 0 for an already counted hard link.
#[cfg(unix)]
fn allocated_bytes(metadata: &Metadata, seen_inodes: &mut HashSet<(u64, u64)>) -> u64 {
    use std::os::unix::fs::MetadataExt;

    if !metadata.is_dir()
        && metadata.nlink() > 1
        && !seen_inodes.insert((metadata.dev(), metadata.ino()))
    {
        return 0;
    }
    // st_blocks is always in 512-byte units, whatever the filesystem block size.
    metadata.blocks().saturating_mul(512)
}

#[cfg(not(unix))]
fn allocated_bytes(metadata: &Metadata, _seen_inodes: &mut HashSet<(u64, u64)>) -> u64 {
    metadata.len()
}
