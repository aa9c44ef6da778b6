//! Directory size collector.
//!
//! `DirectoryCollector` measures every configured directory concurrently on
//! each scrape and keeps one gauge per directory, which is updated in place on
//! every successful measurement and left untouched on failure.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, Opts};
use tracing::{debug, error, info, warn};

use crate::collector::traits::{CancelFlag, DiskUsage};
use crate::error::{ConfigError, MeasureError};
use crate::metrics::{LABEL_NAME, LABEL_PATH, NAMESPACE, SIZE_HELP, SIZE_METRIC};

/// Default upper bound for measuring one directory.
pub const DEFAULT_MEASURE_TIMEOUT: Duration = Duration::from_secs(30);

/// A successful measurement from one collection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryObservation {
    /// Configured path.
    pub path: PathBuf,
    /// Value of the `name` label (basename of the path).
    pub name: String,
    /// Allocated size in bytes.
    pub bytes: u64,
}

/// Label pair identifying one published series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesLabels {
    pub name: String,
    pub path: String,
}

#[derive(Debug)]
struct Target {
    path: PathBuf,
    /// `path` label value.
    label: String,
    /// `name` label value.
    name: String,
    /// Running flag of a worker abandoned after a timeout. While it is set
    /// no new worker is started for this directory.
    stalled: Mutex<Option<Arc<AtomicBool>>>,
}

impl Target {
    fn new(path: PathBuf) -> Self {
        let label = path.display().to_string();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| label.clone());
        Self {
            path,
            label,
            name,
            stalled: Mutex::new(None),
        }
    }

    /// Returns true while a previously abandoned worker is still blocked.
    fn is_stalled(&self) -> bool {
        let mut stalled = self.stalled.lock();
        match stalled.as_ref() {
            Some(running) if running.load(Ordering::Acquire) => true,
            Some(_) => {
                *stalled = None;
                false
            }
            None => false,
        }
    }
}

/// Clears the worker's running flag when the worker ends, even by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Collects `directory_size_bytes` for a fixed set of directories.
///
/// Cloning is cheap and clones share the same gauges, so one clone can be
/// registered with a [`prometheus::Registry`] while another is kept around.
pub struct DirectoryCollector<U: DiskUsage> {
    targets: Arc<[Target]>,
    usage: Arc<U>,
    timeout: Duration,
    sizes: GaugeVec,
    /// Handle cache: one gauge per directory, created on first success.
    handles: Arc<Mutex<HashMap<PathBuf, Gauge>>>,
}

impl<U: DiskUsage> Clone for DirectoryCollector<U> {
    fn clone(&self) -> Self {
        Self {
            targets: Arc::clone(&self.targets),
            usage: Arc::clone(&self.usage),
            timeout: self.timeout,
            sizes: self.sizes.clone(),
            handles: Arc::clone(&self.handles),
        }
    }
}

impl<U: DiskUsage> DirectoryCollector<U> {
    /// Creates a collector for `directories`, measured with `usage`.
    ///
    /// Existence is not checked here: a directory missing at startup is simply
    /// skipped on every scrape until it appears. Duplicate paths are collapsed.
    pub fn new<I, P>(directories: I, usage: U) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for dir in directories {
            let path: PathBuf = dir.into();
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyDirectory);
            }
            if !seen.insert(path.clone()) {
                warn!(directory = %path.display(), "directory configured more than once, ignoring duplicate");
                continue;
            }
            targets.push(Target::new(path));
        }

        let sizes = GaugeVec::new(
            Opts::new(SIZE_METRIC, SIZE_HELP).namespace(NAMESPACE),
            &[LABEL_NAME, LABEL_PATH],
        )?;

        Ok(Self {
            targets: targets.into(),
            usage: Arc::new(usage),
            timeout: DEFAULT_MEASURE_TIMEOUT,
            sizes,
            handles: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Sets the deadline for one collection pass.
    ///
    /// Directories still being measured when it expires are cancelled and
    /// keep their previous value.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the directories being monitored, in configuration order.
    pub fn directories(&self) -> Vec<&Path> {
        self.targets.iter().map(|t| t.path.as_path()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Lists the series currently known to the handle cache, without measuring.
    pub fn known_series(&self) -> Vec<SeriesLabels> {
        let handles = self.handles.lock();
        let mut series: Vec<SeriesLabels> = self
            .targets
            .iter()
            .filter(|t| handles.contains_key(&t.path))
            .map(|t| SeriesLabels {
                name: t.name.clone(),
                path: t.label.clone(),
            })
            .collect();
        series.sort();
        series
    }

    /// Measures every directory once and updates the gauges.
    ///
    /// One worker thread is started per directory. The call returns once every
    /// worker reported or the pass deadline expired; stragglers are cancelled.
    /// Failures are logged per directory and never abort the pass.
    pub fn collect_sizes(&self) -> Vec<DirectoryObservation> {
        let started = Instant::now();
        debug!(directories = self.targets.len(), "collecting directory sizes");

        let outcomes = self.measure_all(started + self.timeout);

        let mut observations = Vec::with_capacity(self.targets.len());
        let mut failed = 0usize;
        for (target, outcome) in self.targets.iter().zip(outcomes) {
            match outcome {
                Ok(bytes) => {
                    self.record(target, bytes);
                    debug!(directory = %target.label, bytes, "directory size collected");
                    observations.push(DirectoryObservation {
                        path: target.path.clone(),
                        name: target.name.clone(),
                        bytes,
                    });
                }
                Err(MeasureError::NotFound) => {
                    failed += 1;
                    error!(directory = %target.label, "directory does not exist");
                }
                Err(e) => {
                    failed += 1;
                    error!(directory = %target.label, error = %e, "error getting directory size");
                }
            }
        }

        info!(
            measured = observations.len(),
            failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "directory sizes collected"
        );
        observations
    }

    /// Fans out one worker per target and waits for all of them (fan-in).
    ///
    /// Results come back in target order. Workers are detached so that a
    /// stalled filesystem cannot hold the scrape past `deadline`. A worker
    /// that outlives its deadline is remembered on its target, and later
    /// passes skip that directory until the worker returns, so a hung mount
    /// costs at most one blocked thread.
    fn measure_all(&self, deadline: Instant) -> Vec<Result<u64, MeasureError>> {
        let (tx, rx) = mpsc::channel();
        let mut cancels = Vec::with_capacity(self.targets.len());
        let mut running_flags = Vec::with_capacity(self.targets.len());
        let mut outcomes: Vec<Option<Result<u64, MeasureError>>> =
            (0..self.targets.len()).map(|_| None).collect();
        let mut pending = 0usize;

        for (idx, target) in self.targets.iter().enumerate() {
            let cancel = CancelFlag::new();
            let running = Arc::new(AtomicBool::new(true));
            cancels.push(cancel.clone());
            running_flags.push(Arc::clone(&running));

            if target.is_stalled() {
                outcomes[idx] = Some(Err(MeasureError::StillRunning));
                continue;
            }

            let tx = tx.clone();
            let usage = Arc::clone(&self.usage);
            let path = target.path.clone();
            let guard = RunningGuard(running);
            let spawned = thread::Builder::new()
                .name("dirsize-measure".to_string())
                .spawn(move || {
                    let _guard = guard;
                    let result = if usage.exists(&path) {
                        usage.measure(&path, &cancel)
                    } else {
                        Err(MeasureError::NotFound)
                    };
                    // The receiver is gone if the pass already timed out.
                    let _ = tx.send((idx, result));
                });

            match spawned {
                Ok(_) => pending += 1,
                Err(e) => outcomes[idx] = Some(Err(MeasureError::Spawn(e))),
            }
        }
        drop(tx);

        let mut timed_out = false;
        while pending > 0 {
            let wait = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok((idx, result)) => {
                    outcomes[idx] = Some(result);
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        outcomes
            .into_iter()
            .zip(cancels.into_iter().zip(running_flags))
            .zip(self.targets.iter())
            .map(|((outcome, (cancel, running)), target)| match outcome {
                Some(result) => result,
                None if timed_out => {
                    cancel.cancel();
                    *target.stalled.lock() = Some(running);
                    Err(MeasureError::Timeout(self.timeout))
                }
                None => Err(MeasureError::WorkerLost),
            })
            .collect()
    }

    fn record(&self, target: &Target, bytes: u64) {
        let mut handles = self.handles.lock();
        let gauge = handles.entry(target.path.clone()).or_insert_with(|| {
            self.sizes
                .with_label_values(&[target.name.as_str(), target.label.as_str()])
        });
        gauge.set(bytes as f64);
    }
}

impl<U: DiskUsage> Collector for DirectoryCollector<U> {
    fn desc(&self) -> Vec<&Desc> {
        self.sizes.desc()
    }

    /// Measures all directories, then publishes every known series,
    /// including stale ones whose directory failed this time.
    fn collect(&self) -> Vec<MetricFamily> {
        self.collect_sizes();
        self.sizes.collect()
    }
}
