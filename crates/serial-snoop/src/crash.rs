//! Process-wide crash log
//!
//! A panic hook appends a timestamped report to `logs/crash.log` and then
//! hands the panic to the previously installed hook.

use chrono::{DateTime, Local, SecondsFormat};
use std::backtrace::Backtrace;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Crash log location, relative to the working directory
pub const CRASH_LOG_PATH: &str = "logs/crash.log";

const SEPARATOR_WIDTH: usize = 80;

/// Install the crash-logging panic hook
pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        let source = format!("panic in thread '{}'", thread.name().unwrap_or("<unnamed>"));
        let details = format!("{}\n{}", info, Backtrace::capture());

        // Best effort; the previous hook still reports the panic
        let report = format_report(&Local::now(), &source, &details);
        let _ = append_report(Path::new(CRASH_LOG_PATH), &report);

        previous(info);
    }));
}

/// `[<timestamp>] <source>`, the details, then a dashed separator line
pub fn format_report(at: &DateTime<Local>, source: &str, details: &str) -> String {
    format!(
        "[{}] {}\n{}\n{}\n",
        at.to_rfc3339_opts(SecondsFormat::Micros, false),
        source,
        details.trim_end(),
        "-".repeat(SEPARATOR_WIDTH)
    )
}

/// Append a report, creating the log directory when needed
pub fn append_report(path: &Path, report: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(report.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_report_layout() {
        let at = Local.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap();
        let report = format_report(&at, "panic in thread 'main'", "boom\n");
        let lines: Vec<_> = report.lines().collect();

        assert!(lines[0].starts_with("[2026-05-06T07:08:09.000000"));
        assert!(lines[0].ends_with("] panic in thread 'main'"));
        assert_eq!(lines[1], "boom");
        assert_eq!(lines[2], "-".repeat(80));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_reports_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("crash.log");

        append_report(&path, "first\n").unwrap();
        append_report(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
