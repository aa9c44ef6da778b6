//! In-memory disk-usage mock for testing the collector without real directories.
//!
//! `MockDiskUsage` is cheap to clone and every clone shares the same state, so
//! a test can keep a handle and change sizes, failures or delays between
//! collection passes.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::collector::traits::{CancelFlag, DiskUsage};
use crate::error::MeasureError;

const STALL_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
enum MockEntry {
    Size { bytes: u64, delay: Duration },
    Denied(String),
    /// Never finishes until cancelled, like a hung network mount.
    Stalled,
}

#[derive(Debug, Clone, Default)]
pub struct MockDiskUsage {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    measure_calls: Arc<AtomicUsize>,
}

impl MockDiskUsage {
    /// Creates a new mock where no directory exists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `path` exist with the given size.
    pub fn set_size(&self, path: impl AsRef<Path>, bytes: u64) {
        self.set_size_with_delay(path, bytes, Duration::ZERO);
    }

    /// Makes `path` exist with the given size, reported after `delay`.
    pub fn set_size_with_delay(&self, path: impl AsRef<Path>, bytes: u64, delay: Duration) {
        self.insert(path, MockEntry::Size { bytes, delay });
    }

    /// Makes `path` exist but fail every measurement with permission denied.
    pub fn set_denied(&self, path: impl AsRef<Path>, message: impl Into<String>) {
        self.insert(path, MockEntry::Denied(message.into()));
    }

    /// Makes `path` exist but hang until the measurement is cancelled.
    pub fn set_stalled(&self, path: impl AsRef<Path>) {
        self.insert(path, MockEntry::Stalled);
    }

    /// Makes `path` disappear.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.entries.lock().remove(path.as_ref());
    }

    /// Number of `measure` calls made so far, across all clones.
    pub fn measure_calls(&self) -> usize {
        self.measure_calls.load(Ordering::SeqCst)
    }

    fn insert(&self, path: impl AsRef<Path>, entry: MockEntry) {
        self.entries.lock().insert(path.as_ref().to_path_buf(), entry);
    }
}

impl DiskUsage for MockDiskUsage {
    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().contains_key(path)
    }

    fn measure(&self, path: &Path, cancel: &CancelFlag) -> Result<u64, MeasureError> {
        self.measure_calls.fetch_add(1, Ordering::SeqCst);
        // Clone out so the lock is not held while sleeping.
        let entry = self.entries.lock().get(path).cloned();

        match entry {
            None => Err(MeasureError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "vanished during measurement"),
            }),
            Some(MockEntry::Denied(message)) => Err(MeasureError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, message),
            }),
            Some(MockEntry::Size { bytes, delay }) => {
                let deadline = Instant::now() + delay;
                while Instant::now() < deadline {
                    if cancel.is_cancelled() {
                        return Err(MeasureError::Cancelled);
                    }
                    thread::sleep(STALL_POLL.min(deadline.saturating_duration_since(Instant::now())));
                }
                Ok(bytes)
            }
            Some(MockEntry::Stalled) => {
                while !cancel.is_cancelled() {
                    thread::sleep(STALL_POLL);
                }
                Err(MeasureError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_set_size() {
        let usage = MockDiskUsage::new();
        usage.set_size("/data/a", 4096);

        assert!(usage.exists(Path::new("/data/a")));
        assert!(!usage.exists(Path::new("/data")));
        let size = usage.measure(Path::new("/data/a"), &CancelFlag::new()).unwrap();
        assert_eq!(size, 4096);
        assert_eq!(usage.measure_calls(), 1);
    }

    #[test]
    fn test_mock_clones_share_state() {
        let usage = MockDiskUsage::new();
        let clone = usage.clone();
        usage.set_size("/data/a", 1);
        assert!(clone.exists(Path::new("/data/a")));

        clone.remove("/data/a");
        assert!(!usage.exists(Path::new("/data/a")));
    }

    #[test]
    fn test_mock_denied() {
        let usage = MockDiskUsage::new();
        usage.set_denied("/data/secret", "permission denied");

        assert!(usage.exists(Path::new("/data/secret")));
        let err = usage
            .measure(Path::new("/data/secret"), &CancelFlag::new())
            .unwrap_err();
        match err {
            MeasureError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mock_stalled_stops_on_cancel() {
        let usage = MockDiskUsage::new();
        usage.set_stalled("/mnt/nfs");
        let cancel = CancelFlag::new();

        let worker = {
            let usage = usage.clone();
            let cancel = cancel.clone();
            thread::spawn(move || usage.measure(Path::new("/mnt/nfs"), &cancel))
        };
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(MeasureError::Cancelled)));
    }
}
