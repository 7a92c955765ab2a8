//! Caller-facing error codes.
//!
//! These travel on the wire inside `EffectResponse.denialCode` and
//! `PatchApplyResult.errorCode`; they are outcomes, not Rust errors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an effect request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCode {
    /// Blocked outright by a blocklist, denied effect type, or malformed request.
    PolicyBlocked,
    /// The concrete target falls outside the permitted scope.
    ScopeViolation,
    /// The human said no.
    UserDenied,
    /// No verdict arrived before the deadline, or the task was cancelled.
    Timeout,
    /// The producer exceeded its request rate.
    RateLimited,
}

impl DenialCode {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolicyBlocked => "policy_blocked",
            Self::ScopeViolation => "scope_violation",
            Self::UserDenied => "user_denied",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a patch could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchErrorCode {
    /// The file the patch needs does not exist.
    FileNotFound,
    /// The host refused the filesystem operation.
    PermissionDenied,
    /// The live file diverged from the content the patch was computed against.
    ConflictDetected,
    /// A three-way merge found overlapping edits.
    MergeFailed,
    /// Any other I/O failure, including the apply deadline elapsing.
    IoError,
    /// The shadow is not in the `approved` state.
    NotApproved,
    /// No shadow exists for the given patch id.
    PatchNotFound,
}

impl PatchErrorCode {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileNotFound => "file_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::ConflictDetected => "conflict_detected",
            Self::MergeFailed => "merge_failed",
            Self::IoError => "io_error",
            Self::NotApproved => "not_approved",
            Self::PatchNotFound => "patch_not_found",
        }
    }

    /// Classify a std I/O error.
    #[must_use]
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => Self::FileNotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::IoError,
        }
    }
}

impl fmt::Display for PatchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
