//! Audit-related error types.

use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// I/O error on a file-backed sink.
    #[error("audit i/o error on {path}: {source}")]
    Io {
        /// The audit file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A persisted entry could not be parsed.
    #[error("corrupt audit entry at line {line}: {reason}")]
    CorruptEntry {
        /// 1-based line number in the sink.
        line: usize,
        /// Parser message.
        reason: String,
    },
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
