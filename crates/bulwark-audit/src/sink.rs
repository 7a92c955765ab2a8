//! Audit sinks: where entries are durably appended.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

/// Append-only storage backend for audit entries.
///
/// Implementations must be thread-safe. Entries are never rewritten or
/// removed once appended.
pub trait AuditSink: Send + Sync {
    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn append(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// All entries, in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn entries(&self) -> AuditResult<Vec<AuditEntry>>;

    /// The most recently appended entry.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn last(&self) -> AuditResult<Option<AuditEntry>> {
        Ok(self.entries()?.pop())
    }

    /// Flush pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

/// In-memory audit sink, used by tests and ephemeral gates.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the sink is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| {
            tracing::warn!("MemoryAuditSink lock poisoned, recovering");
            e.into_inner()
        });
        entries.push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| {
            tracing::warn!("MemoryAuditSink lock poisoned, recovering");
            e.into_inner()
        });
        Ok(entries.clone())
    }

    fn last(&self) -> AuditResult<Option<AuditEntry>> {
        let entries = self.entries.read().unwrap_or_else(|e| {
            tracing::warn!("MemoryAuditSink lock poisoned, recovering");
            e.into_inner()
        });
        Ok(entries.last().cloned())
    }
}

/// JSON-lines audit sink: one entry per line, appended under an exclusive
/// advisory file lock and synced before returning.
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    /// Open (creating parent directories) a sink at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| io_err(&path, e))?;
        }
        Ok(Self { path })
    }

    /// The file backing this sink.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_for_append(&self) -> AuditResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut line = serde_json::to_vec(entry)
            .map_err(|e| AuditError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        let mut file = self.open_for_append()?;
        file.lock_exclusive().map_err(|e| io_err(&self.path, e))?;
        let result = file
            .write_all(&line)
            .and_then(|()| file.sync_data())
            .map_err(|e| io_err(&self.path, e));
        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!(path = %self.path.display(), "failed to unlock audit file: {e}");
        }
        result
    }

    fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.path, e)),
        };
        file.lock_shared().map_err(|e| io_err(&self.path, e))?;

        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(&file).lines().enumerate() {
            let line = line.map_err(|e| io_err(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|e| AuditError::CorruptEntry {
                line: idx.saturating_add(1),
                reason: e.to_string(),
            })?;
            entries.push(entry);
        }

        if let Err(e) = FileExt::unlock(&file) {
            tracing::warn!(path = %self.path.display(), "failed to unlock audit file: {e}");
        }
        Ok(entries)
    }

    fn flush(&self) -> AuditResult<()> {
        match File::open(&self.path) {
            Ok(f) => f.sync_all().map_err(|e| io_err(&self.path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.path, e)),
        }
    }
}

fn io_err(path: &Path, source: std::io::Error) -> AuditError {
    AuditError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditAction;
    use bulwark_core::ContentHash;

    fn transition(patch_id: &str) -> AuditEntry {
        AuditEntry::new(
            "reviewer",
            AuditAction::ShadowTransition {
                patch_id: patch_id.to_string(),
                path: "/ws/file.rs".to_string(),
                from: Some("pending".to_string()),
                to: "rejected".to_string(),
                reason: Some("not needed".to_string()),
            },
            ContentHash::zero(),
        )
    }

    #[test]
    fn test_memory_sink_append_and_last() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.append(&transition("a")).unwrap();
        sink.append(&transition("b")).unwrap();
        assert_eq!(sink.len(), 2);
        let last = sink.last().unwrap().unwrap();
        assert!(matches!(
            last.action,
            AuditAction::ShadowTransition { ref patch_id, .. } if patch_id == "b"
        ));
    }

    #[test]
    fn test_jsonl_sink_persists_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).unwrap();

        sink.append(&transition("a")).unwrap();
        sink.append(&transition("b")).unwrap();
        sink.flush().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let reopened = JsonlAuditSink::open(&path).unwrap();
        let entries = reopened.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor, "reviewer");
    }

    #[test]
    fn test_jsonl_sink_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::open(dir.path().join("none.jsonl")).unwrap();
        assert!(sink.entries().unwrap().is_empty());
        assert!(sink.last().unwrap().is_none());
        sink.flush().unwrap();
    }

    #[test]
    fn test_jsonl_sink_reports_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(&transition("a")).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json}\n")
            .unwrap();

        let err = sink.entries().unwrap_err();
        assert!(matches!(err, AuditError::CorruptEntry { line: 2, .. }));
    }
}
