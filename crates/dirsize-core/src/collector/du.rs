//! Disk usage via an external `du` process.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::collector::traits::{CancelFlag, DiskUsage};
use crate::error::MeasureError;

/// How often a running `du` is polled for completion or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `du -s -B1 <path>` and parses the byte count from its output.
///
/// `-B1` pins the unit to bytes; a bare `du -s` would report 1024-byte blocks.
/// A non-zero exit status (for example a permission error on some sub-entry)
/// is treated as a failed measurement rather than a partial sum.
#[derive(Debug, Clone)]
pub struct DuCommand {
    program: PathBuf,
}

impl Default for DuCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("du"),
        }
    }
}

impl DuCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific `du` binary instead of the one found on `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl DiskUsage for DuCommand {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn measure(&self, path: &Path, cancel: &CancelFlag) -> Result<u64, MeasureError> {
        let mut child = Command::new(&self.program)
            .arg("-s")
            .arg("-B1")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MeasureError::Io {
                path: self.program.clone(),
                source,
            })?;

        // du can print one line per unreadable entry; drain stderr so it never blocks.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let status = loop {
            let polled = child.try_wait().map_err(|source| MeasureError::Io {
                path: self.program.clone(),
                source,
            })?;
            if let Some(status) = polled {
                break status;
            }
            if cancel.is_cancelled() {
                debug!(directory = %path.display(), "killing cancelled du process");
                let _ = child.kill();
                let _ = child.wait();
                return Err(MeasureError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(MeasureError::Command {
                program: self.program_name(),
                status,
                stderr: stderr.lines().next().unwrap_or_default().to_string(),
            });
        }

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)
                .map_err(|source| MeasureError::Io {
                    path: self.program.clone(),
                    source,
                })?;
        }

        parse_du_output(&stdout).ok_or_else(|| MeasureError::Parse {
            program: self.program_name(),
            output: stdout.trim().to_string(),
        })
    }
}

/// Parses `<bytes>\t<path>` as printed by `du -s -B1`.
fn parse_du_output(output: &str) -> Option<u64> {
    output.split_whitespace().next()?.parse().ok()
}
