//! The chain-maintaining audit log.

use bulwark_core::ContentHash;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::entry::{AuditAction, AuditEntry};
use crate::error::AuditResult;
use crate::sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};

/// Result of a chain verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Whether every link is intact.
    pub valid: bool,
    /// Number of entries checked.
    pub entries_checked: usize,
    /// Entry ids whose `previous_hash` does not match their predecessor.
    pub broken_links: Vec<String>,
}

/// Audit log that links each appended entry to the previous one.
///
/// Appends are serialized so the chain head can never fork.
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    head: Mutex<ContentHash>,
}

impl AuditLog {
    /// Create a log over `sink`, resuming the chain from its last entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink's last entry cannot be read.
    pub fn new(sink: Arc<dyn AuditSink>) -> AuditResult<Self> {
        let head = sink
            .last()?
            .map_or_else(ContentHash::zero, |entry| entry.content_hash());
        Ok(Self {
            sink,
            head: Mutex::new(head),
        })
    }

    /// In-memory log (nothing survives the process).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            sink: Arc::new(MemoryAuditSink::new()),
            head: Mutex::new(ContentHash::zero()),
        }
    }

    /// JSON-lines log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its tail is corrupt.
    pub fn open_jsonl(path: impl Into<PathBuf>) -> AuditResult<Self> {
        Self::new(Arc::new(JsonlAuditSink::open(path)?))
    }

    /// Append an action on behalf of `actor`.
    ///
    /// Blocks until the sink has the entry: the JSONL sink takes a file
    /// lock and syncs before returning. Async callers should run this on
    /// the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects the entry; the chain head is
    /// only advanced after a successful append.
    pub fn record(&self, actor: &str, action: AuditAction) -> AuditResult<AuditEntry> {
        let mut head = self.head.lock().unwrap_or_else(|e| {
            tracing::warn!("AuditLog head lock poisoned, recovering");
            e.into_inner()
        });
        let entry = AuditEntry::new(actor, action, *head);
        self.sink.append(&entry)?;
        *head = entry.content_hash();
        tracing::trace!(entry_id = %entry.id, "{}", entry.action.description());
        Ok(entry)
    }

    /// All entries in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    pub fn entries(&self) -> AuditResult<Vec<AuditEntry>> {
        self.sink.entries()
    }

    /// Check every link in the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    pub fn verify_chain(&self) -> AuditResult<ChainVerification> {
        Ok(verify_entries(&self.sink.entries()?))
    }

    /// Flush the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails to flush.
    pub fn flush(&self) -> AuditResult<()> {
        self.sink.flush()
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

/// Verify the links of an ordered slice of entries.
#[must_use]
pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerification {
    let mut broken_links = Vec::new();
    if let Some(first) = entries.first()
        && !first.previous_hash.is_zero()
    {
        broken_links.push(first.id.to_string());
    }
    for pair in entries.windows(2) {
        if let [previous, current] = pair
            && !current.follows(previous)
        {
            broken_links.push(current.id.to_string());
        }
    }
    ChainVerification {
        valid: broken_links.is_empty(),
        entries_checked: entries.len(),
        broken_links,
    }
}
