//! Operator-facing message log.
//!
//! One plain-text line per routed record, appended to `logs/messages.log`.
//! This is the file the console `tail` verb reads. It is an audit aid, not
//! a durability mechanism; append failures are logged and swallowed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use helphub_proto::Record;

pub struct MessageLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl MessageLog {
    /// Open the log for appending, creating parent directories as needed.
    /// A log that cannot be opened degrades to a no-op sink.
    pub fn new(path: PathBuf) -> Self {
        let file = open_append(&path)
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "message log unavailable");
                e
            })
            .ok();

        Self {
            path,
            file: Mutex::new(file),
        }
    }

    /// Append one line for a routed record.
    pub fn append(&self, record: &Record) {
        let to = record.to.as_deref().unwrap_or("ALL");
        let line = format!(
            "{} [MSG] [FROM:{}] -> [TO:{}]: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.from,
            to,
            record.body
        );

        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()) {
                warn!(path = %self.path.display(), error = %e, "failed to append to message log");
                *guard = None;
            }
        }
    }

    /// Last `n` lines of the log file; a simple bounded read.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|s| s.to_string()).collect()
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

fn open_append(path: &PathBuf) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use helphub_proto::{Priority, RecordKind};

    #[test]
    fn append_then_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("messages.log"));

        for i in 0..5 {
            let record = Record::new(
                RecordKind::Direct,
                "alpha",
                Some("bravo".to_string()),
                format!("msg {i}"),
                Priority::Normal,
            );
            log.append(&record);
        }

        let tail = log.tail(2);
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("msg 3"));
        assert!(tail[1].contains("msg 4"));
        assert!(tail[1].contains("[FROM:alpha] -> [TO:bravo]"));
    }

    #[test]
    fn broadcast_logs_recipient_all() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("messages.log"));
        log.append(&Record::new(RecordKind::Broadcast, "alpha", None, "hi", Priority::High));
        assert!(log.tail(1)[0].contains("[TO:ALL]"));
    }

    #[test]
    fn tail_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = MessageLog::new(dir.path().join("sub/never-written.log"));
        // No appends; file exists but is empty.
        assert!(log.tail(10).is_empty());
    }
}
