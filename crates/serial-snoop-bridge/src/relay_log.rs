//! Relay log: one tab-separated line per relayed frame
//!
//! ```text
//! 12:00:00.000	TX	3	41 42 43	ABC
//! ```
//!
//! [`RelayFileLogger`] appends lines to a file as frames are relayed and
//! [`LogHistory`] keeps the most recent entries in memory so they can be
//! saved later.

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::frame::{Direction, Frame};
use crate::hexdump::{to_ascii, to_hex, DEFAULT_MAX_DUMP_BYTES};
use crate::observer::BridgeObserver;

/// Entries kept by [`LogHistory::new`]
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// One rendered relay-log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Local wall-clock time the frame was relayed
    pub timestamp: NaiveDateTime,
    /// Flow the frame travelled
    pub direction: Direction,
    /// Frame length in bytes (not truncated)
    pub length: usize,
    /// Hex rendering, truncated
    pub hex: String,
    /// ASCII rendering, truncated
    pub ascii: String,
}

impl LogEntry {
    /// Render `data` as relayed at `timestamp`
    pub fn new(timestamp: NaiveDateTime, direction: Direction, data: &[u8]) -> Self {
        Self {
            timestamp,
            direction,
            length: data.len(),
            hex: to_hex(data, DEFAULT_MAX_DUMP_BYTES),
            ascii: to_ascii(data, DEFAULT_MAX_DUMP_BYTES),
        }
    }

    /// Render `data` as relayed now
    pub fn now(direction: Direction, data: &[u8]) -> Self {
        Self::new(Local::now().naive_local(), direction, data)
    }

    /// `HH:MM:SS.fff<TAB>DIR<TAB>LEN<TAB>HEX<TAB>ASCII`, without a newline
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.direction.log_label(),
            self.length,
            self.hex,
            self.ascii
        )
    }
}

/// Suggested file name for saving a log, e.g. `serial_snoop_20260101_120000.txt`
pub fn default_save_file_name(at: NaiveDateTime) -> String {
    format!("serial_snoop_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// Open `path` for appending, creating its parent directory
pub(crate) fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Appends a relay-log line to a file for every relayed frame
///
/// Writing can be paused and resumed while a session runs. Write failures
/// are logged and otherwise ignored.
pub struct RelayFileLogger {
    path: PathBuf,
    file: Mutex<File>,
    enabled: AtomicBool,
}

impl RelayFileLogger {
    /// Open (or create) `path` in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        info!(path = %path.display(), "Relay log file open");
        Ok(Self {
            path,
            file: Mutex::new(file),
            enabled: AtomicBool::new(true),
        })
    }

    /// Log file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pause or resume writing
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// True while writing
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Append one entry
    pub fn append(&self, entry: &LogEntry) -> Result<()> {
        let mut file = self.file.lock();
        writeln!(file, "{}", entry)?;
        Ok(())
    }

    /// Append unless paused; failures are logged and dropped
    pub fn record(&self, entry: &LogEntry) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.append(entry) {
            warn!(path = %self.path.display(), error = %e, "Failed to append relay log line");
        }
    }
}

impl BridgeObserver for RelayFileLogger {
    fn on_data_relayed(&self, direction: Direction, frame: &Frame) {
        self.record(&LogEntry::now(direction, frame));
    }
}

impl fmt::Debug for RelayFileLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayFileLogger")
            .field("path", &self.path)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Bounded in-memory history of relay-log entries, oldest evicted first
pub struct LogHistory {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    enabled: AtomicBool,
}

impl Default for LogHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl LogHistory {
    /// History of [`DEFAULT_HISTORY_CAPACITY`] entries
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// History of at most `capacity` entries (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            enabled: AtomicBool::new(true),
        }
    }

    /// Maximum number of entries kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pause or resume recording
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Record an entry unless recording is paused
    pub fn record(&self, entry: LogEntry) {
        if self.enabled.load(Ordering::Relaxed) {
            self.push(entry);
        }
    }

    /// Record an entry, evicting the oldest when full
    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries currently held
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is held
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
        debug!("Log history cleared");
    }

    /// Copy of the held entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Append every held entry to `path` as relay-log lines
    ///
    /// Returns the number of lines written.
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let entries = self.snapshot();

        let mut writer = BufWriter::new(open_append(path)?);
        for entry in &entries {
            writeln!(writer, "{}", entry)?;
        }
        writer.flush()?;

        info!(path = %path.display(), lines = entries.len(), "Saved log history");
        Ok(entries.len())
    }
}

impl BridgeObserver for LogHistory {
    fn on_data_relayed(&self, direction: Direction, frame: &Frame) {
        self.record(LogEntry::now(direction, frame));
    }
}

impl fmt::Debug for LogHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHistory")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
