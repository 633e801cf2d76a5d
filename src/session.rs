//! Structured session log persisted to a timestamped file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;

use crate::engine::StatsSnapshot;

const RULE_WIDTH: usize = 70;

/// Thread-safe writer for one run's log file.
///
/// Creates `session_YYYYMMDD_HHMMSS.log` inside the log directory, writes a
/// session header immediately, and appends leveled entries as the run
/// progresses. Debug entries are dropped unless the debug flag is set.
/// Every entry is flushed on write so an interrupted run keeps what it
/// logged.
#[derive(Debug)]
pub struct SessionLog {
    file: Mutex<File>,
    path: PathBuf,
    debug: bool,
}

impl SessionLog {
    /// Create the log directory (if needed) and open a fresh session file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directory or file cannot
    /// be created.
    pub fn create(log_dir: &Path, debug: bool) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = log_dir.join(format!("session_{stamp}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let log = Self {
            file: Mutex::new(file),
            path,
            debug,
        };
        log.write_header();
        Ok(log)
    }

    /// Path of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(&self) {
        let now = Local::now();
        let rule = "=".repeat(RULE_WIDTH);
        self.write_raw(&format!(
            "{rule}\n  SESSION STARTED\n  {}\n{rule}\n",
            now.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    fn write_raw(&self, text: &str) {
        let mut file = self.file.lock().unwrap();
        // A log write failure must not take down the run.
        let _ = writeln!(file, "{text}");
        let _ = file.flush();
    }

    fn entry(&self, level: &str, msg: &str, data: Option<&serde_json::Value>) {
        let ts = Local::now().format("%H:%M:%S%.3f");
        let mut line = format!("[{ts}] [{level:>5}] {msg}");
        if let Some(data) = data {
            let pretty = serde_json::to_string_pretty(data)
                .unwrap_or_else(|e| format!("<unserializable: {e}>"));
            for part in pretty.lines() {
                line.push_str("\n                ");
                line.push_str(part);
            }
        }
        self.write_raw(&line);
    }

    /// Informational entry, with an optional JSON payload.
    pub fn info(&self, msg: &str, data: Option<&serde_json::Value>) {
        self.entry("INFO", msg, data);
    }

    /// Warning entry.
    pub fn warn(&self, msg: &str) {
        self.entry("WARN", msg, None);
    }

    /// Error entry, with an optional JSON payload.
    pub fn error(&self, msg: &str, data: Option<&serde_json::Value>) {
        self.entry("ERROR", msg, data);
    }

    /// Debug entry; written only when the debug flag is set.
    pub fn debug(&self, msg: &str, data: Option<&serde_json::Value>) {
        if self.debug {
            self.entry("DEBUG", msg, data);
        }
    }

    /// Record an available username.
    pub fn hit(&self, username: &str) {
        self.entry("HIT", &format!("Available: {username}"), None);
    }

    /// Append the end-of-run summary block.
    pub fn summary(&self, stats: &StatsSnapshot, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            stats.checked as f64 / secs
        } else {
            0.0
        };
        let rule = "-".repeat(RULE_WIDTH);
        self.write_raw(&format!(
            "\n{rule}\n  SESSION SUMMARY\n{rule}\n\
             \x20 Total checked:  {}\n\
             \x20 Available:      {}\n\
             \x20 Taken:          {}\n\
             \x20 Errors:         {}\n\
             \x20 Retries:        {}\n\
             \x20 Duration:       {secs:.2}s\n\
             \x20 Average rate:   {rate:.1} checks/s\n{rule}\n",
            stats.checked, stats.available, stats.taken, stats.errors, stats.retried
        ));
    }
}
