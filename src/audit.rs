use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

const LOG_DELETED: &str = "Log Deleted.";

/// Append-only text log the operator reads back to see what the monitor did.
pub trait AuditLog: Send + Sync {
    fn append_line(&self, line: &str) -> Result<()>;

    fn read_text(&self) -> Result<String>;

    /// Drop all lines, leaving a single "Log Deleted." line.
    fn clear(&self) -> Result<()>;

    /// Timestamp `message`, mirror it to the diagnostic log and append it. Failures are
    /// logged and otherwise ignored.
    fn record(&self, message: &str) {
        info!("{}", message);
        let line = format!("{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        if let Err(e) = self.append_line(&line) {
            warn!("Could not write audit log: {:#}", e);
        }
    }
}

pub struct FileAuditLog {
    path: PathBuf,
}

impl FileAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AuditLog for FileAuditLog {
    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log: {}", self.path.display()))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn read_text(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read audit log: {}", self.path.display())),
        }
    }

    fn clear(&self) -> Result<()> {
        std::fs::write(&self.path, format!("{}\n", LOG_DELETED))
            .with_context(|| format!("Failed to clear audit log: {}", self.path.display()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any line ends with `message`, ignoring the timestamp prefix.
    pub fn contains(&self, message: &str) -> bool {
        self.lines().iter().any(|line| line.ends_with(message))
    }
}

impl AuditLog for MemoryAuditLog {
    fn append_line(&self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }

    fn read_text(&self) -> Result<String> {
        Ok(self
            .lines()
            .iter()
            .map(|line| format!("{}\n", line))
            .collect())
    }

    fn clear(&self) -> Result<()> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.clear();
        lines.push(LOG_DELETED.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_log_appends_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::new(dir.path().join("audit.log"));
        assert_eq!(log.read_text().unwrap(), "");

        log.record("Playing alarm.");
        log.record("Headband is on now.");
        let text = log.read_text().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": Playing alarm."));
        assert!(lines[1].ends_with(": Headband is on now."));

        log.clear().unwrap();
        assert_eq!(log.read_text().unwrap(), "Log Deleted.\n");
    }

    #[test]
    fn record_prefixes_timestamp() {
        let log = MemoryAuditLog::new();
        log.record("hello");
        let line = &log.lines()[0];
        // "yyyy-mm-dd hh:mm:ss: hello"
        assert_eq!(line.len(), 19 + 2 + 5);
        assert!(log.contains("hello"));
    }
}
