//! Error types for shadow staging and apply.

use bulwark_core::PatchErrorCode;
use std::path::PathBuf;
use std::time::Duration;

/// Errors from the patch model, the shadow store, and the apply engine.
#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    /// The patch failed structural validation.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// A hunk's context or removed lines do not match the file.
    #[error("hunk {index} does not apply: {reason}")]
    HunkMismatch {
        /// Index of the failing hunk.
        index: usize,
        /// What did not match.
        reason: String,
    },

    /// No shadow exists with this id.
    #[error("shadow not found: {0}")]
    NotFound(String),

    /// The shadow is not in a state that allows the operation.
    #[error("shadow {id} is {status}, expected {expected}")]
    InvalidTransition {
        /// Shadow id.
        id: String,
        /// Current status.
        status: String,
        /// Status the operation requires.
        expected: String,
    },

    /// The live file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The host refused access.
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// A create or rename target already exists.
    #[error("target already exists: {}", .0.display())]
    TargetExists(PathBuf),

    /// Other filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An applied shadow has no backup to restore from.
    #[error("no backup recorded for shadow {0}")]
    NoBackup(String),

    /// Index encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An apply did not finish in time.
    #[error("apply timed out after {0:?}")]
    Timeout(Duration),
}

impl ShadowError {
    /// Classify an I/O error on `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io { path, source },
        }
    }

    /// Caller-facing code for apply results.
    #[must_use]
    pub fn code(&self) -> PatchErrorCode {
        match self {
            Self::FileNotFound(_) | Self::NoBackup(_) => PatchErrorCode::FileNotFound,
            Self::PermissionDenied(_) => PatchErrorCode::PermissionDenied,
            Self::HunkMismatch { .. } => PatchErrorCode::ConflictDetected,
            Self::NotFound(_) => PatchErrorCode::PatchNotFound,
            Self::InvalidTransition { .. } => PatchErrorCode::NotApproved,
            Self::InvalidPatch(_)
            | Self::TargetExists(_)
            | Self::Io { .. }
            | Self::Serialization(_)
            | Self::Timeout(_) => PatchErrorCode::IoError,
        }
    }
}

impl From<serde_json::Error> for ShadowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for shadow operations.
pub type ShadowResult<T> = Result<T, ShadowError>;
