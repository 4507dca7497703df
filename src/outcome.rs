//! Persisted booking outcome log.
//!
//! A JSON array of at most [`MAX_ENTRIES`] entries, newest first. The
//! workflow is the only writer and writes through a temp file plus rename,
//! so a reader sees either the old or the new array, never a torn write.
//! Readers treat a missing or malformed file as an empty log.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Cap on persisted entries; older ones are evicted.
pub const MAX_ENTRIES: usize = 20;

/// Status taxonomy shared with the dashboard. The workflow itself only
/// records `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Pending,
    Success,
    Failed,
    Scheduled,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Pending => write!(f, "PENDING"),
            LogStatus::Success => write!(f, "SUCCESS"),
            LogStatus::Failed => write!(f, "FAILED"),
            LogStatus::Scheduled => write!(f, "SCHEDULED"),
        }
    }
}

/// One terminal run outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// UUIDv7, so ids sort by creation time.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub status: LogStatus,
    pub details: String,
}

impl LogEntry {
    pub fn new(status: LogStatus, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            status,
            details: details.into(),
        }
    }
}

/// Writer side of the log file.
#[derive(Debug, Clone)]
pub struct OutcomeLog {
    path: PathBuf,
}

impl OutcomeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepend a fresh entry, keep the newest [`MAX_ENTRIES`], and persist.
    pub fn append(&self, status: LogStatus, details: impl Into<String>) -> Result<LogEntry> {
        let entry = LogEntry::new(status, details);

        let mut entries = read_entries(&self.path);
        entries.insert(0, entry.clone());
        entries.truncate(MAX_ENTRIES);

        self.write_atomic(&entries)?;
        debug!(path = %self.path.display(), id = %entry.id, %status, kept = entries.len(), "outcome recorded");
        Ok(entry)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        read_entries(&self.path)
    }

    fn write_atomic(&self, entries: &[LogEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, entries).context("failed to serialize booking log")?;
        tmp.write_all(b"\n")?;
        tmp.as_file()
            .sync_all()
            .context("failed to flush booking log")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to replace booking log: {}", self.path.display()))?;
        Ok(())
    }
}

/// Tolerant read: missing or unparsable content yields an empty log.
pub fn read_entries(path: &Path) -> Vec<LogEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no booking log yet");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<LogEntry>>(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "booking log is malformed, treating as empty");
            Vec::new()
        }
    }
}

/// Most recent entry, if any.
pub fn latest(path: &Path) -> Option<LogEntry> {
    read_entries(path).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_then_read_back_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = OutcomeLog::new(dir.path().join("logs.json"));

        let written = log.append(LogStatus::Success, "Booked 07:15 on Woodmead for 2026-10-31").unwrap();
        let entries = read_entries(log.path());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], written);
    }

    #[test]
    fn test_newest_first_and_capped() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = OutcomeLog::new(dir.path().join("logs.json"));

        for i in 0..25 {
            log.append(LogStatus::Failed, format!("run {i}")).unwrap();
        }

        let entries = log.entries();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].details, "run 24");
        assert_eq!(entries[MAX_ENTRIES - 1].details, "run 5");
    }

    #[test]
    fn test_malformed_file_is_treated_as_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(read_entries(&path).is_empty());

        let log = OutcomeLog::new(&path);
        log.append(LogStatus::Failed, "after corruption").unwrap();
        let entries = read_entries(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details, "after corruption");
    }

    #[test]
    fn test_missing_file_and_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deep/nested/logs.json");
        assert!(read_entries(&path).is_empty());
        assert!(latest(&path).is_none());

        OutcomeLog::new(&path).append(LogStatus::Success, "ok").unwrap();
        assert!(path.exists());
        assert_eq!(latest(&path).unwrap().status, LogStatus::Success);
    }

    #[test]
    fn test_wire_format() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = OutcomeLog::new(dir.path().join("logs.json"));
        log.append(LogStatus::Failed, "No available slots").unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let first = &value.as_array().unwrap()[0];

        assert_eq!(first["status"], "FAILED");
        assert_eq!(first["details"], "No available slots");
        assert!(first["id"].is_string());
        let ts = first["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = LogEntry::new(LogStatus::Failed, "a");
        let b = LogEntry::new(LogStatus::Failed, "b");
        assert_ne!(a.id, b.id);
    }
}
