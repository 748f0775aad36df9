//! Timestamped diagnostics file
//!
//! Each line is `[<RFC 3339 local time>] <message>`: at most one per
//! throttle interval for diagnostics snapshots, plus a
//! `BridgeStopped: <error>` line when a session ends with a fault.

use chrono::{DateTime, Local, SecondsFormat};
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::{BridgeError, Result};
use crate::observer::BridgeObserver;
use crate::relay_log::open_append;
use crate::stats::BridgeStats;

/// Where the binary writes diagnostics unless told otherwise
pub const DEFAULT_DIAGNOSTICS_PATH: &str = "logs/diagnostics.log";

/// Default spacing between two snapshot lines
pub const DEFAULT_DIAGNOSTICS_INTERVAL: Duration = Duration::from_secs(1);

/// Format one diagnostics line
pub fn format_line(at: &DateTime<Local>, message: &str) -> String {
    format!(
        "[{}] {}",
        at.to_rfc3339_opts(SecondsFormat::Micros, false),
        message
    )
}

/// Observer appending diagnostics snapshots and stop faults to a file
pub struct DiagnosticsLogger {
    path: PathBuf,
    file: Mutex<File>,
    min_interval: Duration,
    last_snapshot: Mutex<Option<Instant>>,
}

impl DiagnosticsLogger {
    /// Open (or create) `path` in append mode, creating its directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        info!(path = %path.display(), "Diagnostics log open");
        Ok(Self {
            path,
            file: Mutex::new(file),
            min_interval: DEFAULT_DIAGNOSTICS_INTERVAL,
            last_snapshot: Mutex::new(None),
        })
    }

    /// Write at most one snapshot line per `interval`; zero writes every one
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line
    pub fn log(&self, message: &str) -> Result<()> {
        let line = format_line(&Local::now(), message);
        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Log the fault that ended a session
    pub fn log_stop_fault(&self, message: &str) {
        self.log_or_warn(&format!("BridgeStopped: {}", message));
    }

    fn log_or_warn(&self, message: &str) {
        if let Err(e) = self.log(message) {
            warn!(path = %self.path.display(), error = %e, "Failed to write diagnostics line");
        }
    }

    /// True when a snapshot may be written now; records the write time
    fn snapshot_due(&self) -> bool {
        let mut last = self.last_snapshot.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl BridgeObserver for DiagnosticsLogger {
    fn on_diagnostics(&self, stats: &BridgeStats) {
        if self.snapshot_due() {
            self.log_or_warn(&stats.to_string());
        }
    }

    fn on_stopped(&self, error: Option<&BridgeError>) {
        if let Some(error) = error {
            self.log_stop_fault(&error.to_string());
        }
    }
}

impl fmt::Debug for DiagnosticsLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsLogger")
            .field("path", &self.path)
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
