//! Atomic apply of approved shadows to live files.
//!
//! Apply is serialized per path. Before writing, the live file is hashed and
//! compared with the hash recorded at proposal time; divergence is handled by
//! the request's [`ConflictStrategy`]. Content always reaches the live path
//! through a temp-file-then-rename, so a failure at any step leaves the
//! original untouched.
//!
//! The apply timeout bounds the work up to the first live mutation. Once an
//! apply has started writing it runs to completion and its real outcome is
//! reported, even past the deadline.

use bulwark_core::{ContentHash, PatchErrorCode, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use crate::error::{ShadowError, ShadowResult};
use crate::merge::{self, MergeOutcome};
use crate::patch::PatchOperation;
use crate::store::{ShadowFile, ShadowStatus, ShadowStore};

/// Upper bound on a single apply.
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default suffix for backup copies.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

/// What to do when the live file changed after the patch was proposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Refuse with `conflict_detected`.
    #[default]
    Abort,
    /// Write the staged content anyway.
    Force,
    /// Three-way merge onto the live content.
    Merge,
}

fn default_backup_suffix() -> String {
    DEFAULT_BACKUP_SUFFIX.to_string()
}

/// Apply-time parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchApplyRequest {
    /// Shadow to apply.
    pub patch_id: String,
    /// Copy the live file to `{path}{backupSuffix}` first.
    #[serde(default)]
    pub create_backup: bool,
    /// Backup file suffix.
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
    /// Divergence handling.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

impl PatchApplyRequest {
    /// Apply `patch_id` without a backup, aborting on divergence.
    #[must_use]
    pub fn new(patch_id: impl Into<String>) -> Self {
        Self {
            patch_id: patch_id.into(),
            create_backup: false,
            backup_suffix: default_backup_suffix(),
            conflict_strategy: ConflictStrategy::Abort,
        }
    }

    /// Request a backup copy.
    #[must_use]
    pub fn with_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    /// Use a custom backup suffix.
    #[must_use]
    pub fn with_backup_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.backup_suffix = suffix.into();
        self
    }

    /// Choose the divergence strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }
}

/// Detail returned when the live file diverged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    /// Hash recorded at proposal time (absent if the file did not exist).
    pub expected_hash: Option<ContentHash>,
    /// Hash of the live file now (absent if it no longer exists).
    pub actual_hash: Option<ContentHash>,
    /// Indices of hunks that overlap the external edits.
    pub conflicting_hunks: Vec<usize>,
}

/// Outcome of an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchApplyResult {
    /// Whether the live file now holds the patched content.
    pub success: bool,
    /// Shadow id.
    pub patch_id: String,
    /// Path written (the destination for renames).
    pub file_path: PathBuf,
    /// Backup written before the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    /// Apply time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<Timestamp>,
    /// Failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<PatchErrorCode>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Divergence detail for `conflict_detected` and `merge_failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_details: Option<ConflictDetails>,
}

impl PatchApplyResult {
    fn failure(
        patch_id: &str,
        file_path: &Path,
        code: PatchErrorCode,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            patch_id: patch_id.to_string(),
            file_path: file_path.to_path_buf(),
            backup_path: None,
            applied_at: None,
            error_code: Some(code),
            error: Some(error.into()),
            conflict_details: None,
        }
    }

    fn with_conflict(mut self, details: ConflictDetails) -> Self {
        self.conflict_details = Some(details);
        self
    }
}

/// Race between a bounded caller and the task doing the work. Whichever side
/// moves first decides: the task commits to its writes, or the caller gives
/// up and the task must not touch the live file.
#[derive(Debug, Default)]
struct Deadline(AtomicU8);

impl Deadline {
    const RUNNING: u8 = 0;
    const COMMITTED: u8 = 1;
    const EXPIRED: u8 = 2;

    /// Called by the task before its first live mutation.
    fn commit(&self) -> bool {
        self.0
            .compare_exchange(Self::RUNNING, Self::COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Called by the caller when the timeout fires.
    fn expire(&self) -> bool {
        self.0
            .compare_exchange(Self::RUNNING, Self::EXPIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Applies approved shadows to the live filesystem.
#[derive(Debug, Clone)]
pub struct ApplyEngine {
    store: Arc<ShadowStore>,
    timeout: Duration,
}

impl ApplyEngine {
    /// Create an engine over a shadow store.
    #[must_use]
    pub fn new(store: Arc<ShadowStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }

    /// Give up on an apply or rollback that has not started writing within
    /// `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<ShadowStore> {
        &self.store
    }

    /// Apply an approved shadow.
    ///
    /// Never returns an error: every failure is reported through
    /// [`PatchApplyResult::error_code`].
    pub async fn apply(&self, request: &PatchApplyRequest) -> PatchApplyResult {
        let engine = self.clone();
        let owned = request.clone();
        let outcome = self
            .bounded(move |deadline| async move { engine.apply_locked(&owned, &deadline).await })
            .await;
        match outcome {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(id = %request.patch_id, error = %err, "apply aborted");
                let path = self
                    .store
                    .get(&request.patch_id)
                    .await
                    .map(|s| s.original_path)
                    .unwrap_or_default();
                PatchApplyResult::failure(&request.patch_id, &path, err.code(), err.to_string())
            },
        }
    }

    /// Run `work` on its own task, bounded by the engine timeout up to the
    /// point where the task commits.
    async fn bounded<T, F>(&self, work: impl FnOnce(Arc<Deadline>) -> F) -> ShadowResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Arc::new(Deadline::default());
        let mut task = tokio::spawn(work(Arc::clone(&deadline)));
        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) if deadline.expire() => return Err(ShadowError::Timeout(self.timeout)),
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "deadline passed mid-write, waiting for the outcome");
                task.await
            },
        };
        joined.map_err(|e| ShadowError::io(self.store.root(), std::io::Error::other(e)))
    }

    async fn apply_locked(&self, request: &PatchApplyRequest, deadline: &Deadline) -> PatchApplyResult {
        let id = request.patch_id.as_str();
        let Some(shadow) = self.store.get(id).await else {
            return PatchApplyResult::failure(
                id,
                Path::new(""),
                PatchErrorCode::PatchNotFound,
                format!("no shadow with id {id}"),
            );
        };

        let destination = destination(&shadow);
        let _guards = self
            .store
            .lock_paths(&[shadow.original_path.as_path(), destination.as_path()])
            .await;

        // Re-read under the lock: a concurrent apply or proposal may have
        // moved the shadow on.
        let Some(shadow) = self.store.get(id).await else {
            return PatchApplyResult::failure(
                id,
                &destination,
                PatchErrorCode::PatchNotFound,
                format!("no shadow with id {id}"),
            );
        };
        if shadow.status != ShadowStatus::Approved {
            return PatchApplyResult::failure(
                id,
                &destination,
                PatchErrorCode::NotApproved,
                format!("shadow {id} is {}, expected approved", shadow.status),
            );
        }

        match self.apply_approved(request, &shadow, &destination, deadline).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(id = %id, path = %destination.display(), error = %e, "apply failed");
                PatchApplyResult::failure(id, &destination, e.code(), e.to_string())
            },
        }
    }

    async fn apply_approved(
        &self,
        request: &PatchApplyRequest,
        shadow: &ShadowFile,
        destination: &Path,
        deadline: &Deadline,
    ) -> ShadowResult<PatchApplyResult> {
        let id = shadow.id.as_str();
        let operation = shadow
            .pending_patch
            .as_ref()
            .map_or(PatchOperation::Modify, |p| p.operation);

        let live = self.store.read_text(&shadow.original_path).await?;
        let actual_hash = live.as_ref().map(|l| self.store.digest(l.as_bytes()));
        let diverged = actual_hash != shadow.original_hash;
        if !deadline.commit() {
            tracing::debug!(id = %id, "apply abandoned before writing");
            return Err(ShadowError::Timeout(self.timeout));
        }

        let content = if diverged {
            match self
                .resolve_divergence(request.conflict_strategy, shadow, live.as_deref(), actual_hash)
                .await?
            {
                Ok(content) => content,
                Err(result) => return Ok(result),
            }
        } else {
            self.store.staged_content(shadow).await?
        };

        let fs = self.store.fs();
        if operation == PatchOperation::Rename
            && destination != shadow.original_path
            && fs.exists(destination).await?
        {
            return Err(ShadowError::TargetExists(destination.to_path_buf()));
        }

        let backup_path = if request.create_backup && live.is_some() {
            if request.backup_suffix.is_empty() {
                return Err(ShadowError::InvalidPatch("backup suffix is empty".to_string()));
            }
            let mut backup = shadow.original_path.clone().into_os_string();
            backup.push(&request.backup_suffix);
            let backup = PathBuf::from(backup);
            fs.copy(&shadow.original_path, &backup).await?;
            Some(backup)
        } else {
            None
        };

        match operation {
            PatchOperation::Delete => {
                if live.is_some() {
                    fs.remove(&shadow.original_path).await?;
                }
            },
            PatchOperation::Create | PatchOperation::Modify | PatchOperation::Rename => {
                if let Some(parent) = destination.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs.create_dir_all(parent).await?;
                }
                fs.write_atomic(destination, content.as_bytes()).await?;
                if operation == PatchOperation::Rename
                    && destination != shadow.original_path
                    && live.is_some()
                {
                    fs.remove(&shadow.original_path).await?;
                }
            },
        }

        let applied_at = Timestamp::now();
        let recorded_backup = backup_path.clone();
        let shadow = self
            .store
            .transition(
                id,
                &[ShadowStatus::Approved],
                ShadowStatus::Applied,
                "system",
                diverged.then_some(match request.conflict_strategy {
                    ConflictStrategy::Force => "forced over divergence",
                    ConflictStrategy::Merge => "merged with live changes",
                    ConflictStrategy::Abort => "applied",
                }),
                move |s| {
                    s.applied_at = Some(applied_at);
                    s.backup_path = recorded_backup;
                },
            )
            .await?;
        self.store.discard_staged(&shadow.id, &shadow.shadow_path).await;

        tracing::info!(
            id = %id,
            path = %destination.display(),
            operation = %operation,
            backup = backup_path.is_some(),
            "patch applied"
        );
        Ok(PatchApplyResult {
            success: true,
            patch_id: id.to_string(),
            file_path: destination.to_path_buf(),
            backup_path,
            applied_at: Some(applied_at),
            error_code: None,
            error: None,
            conflict_details: None,
        })
    }

    /// Content to write for a diverged live file, or the failure to report.
    async fn resolve_divergence(
        &self,
        strategy: ConflictStrategy,
        shadow: &ShadowFile,
        live: Option<&str>,
        actual_hash: Option<ContentHash>,
    ) -> ShadowResult<Result<String, PatchApplyResult>> {
        let hunks = shadow
            .pending_patch
            .as_ref()
            .map(|p| p.hunks.as_slice())
            .unwrap_or_default();
        let all_hunks = || (0..hunks.len()).collect::<Vec<_>>();
        let base = self.store.base_content(&shadow.id).await;

        let details = |conflicting_hunks: Vec<usize>| ConflictDetails {
            expected_hash: shadow.original_hash,
            actual_hash,
            conflicting_hunks,
        };

        match strategy {
            ConflictStrategy::Force => {
                tracing::warn!(id = %shadow.id, "live file diverged; forcing apply");
                Ok(Ok(self.store.staged_content(shadow).await?))
            },
            ConflictStrategy::Abort => {
                let conflicting = match (base.as_deref(), live) {
                    (Some(base), Some(live)) => merge::conflicting_hunks(base, live, hunks)?,
                    _ => all_hunks(),
                };
                let reason = "live file changed since proposal";
                self.store
                    .transition(&shadow.id, &[ShadowStatus::Approved], ShadowStatus::Conflict, "system", Some(reason), |_| {})
                    .await?;
                tracing::warn!(id = %shadow.id, path = %shadow.original_path.display(), "{reason}");
                Ok(Err(self
                    .failure(shadow, PatchErrorCode::ConflictDetected, reason)
                    .with_conflict(details(conflicting))))
            },
            ConflictStrategy::Merge => {
                let mergeable = shadow
                    .pending_patch
                    .as_ref()
                    .is_some_and(|p| matches!(p.operation, PatchOperation::Modify | PatchOperation::Rename));
                let outcome = match (base.as_deref(), live) {
                    (Some(base), Some(live)) if mergeable => merge::three_way_merge(base, live, hunks)?,
                    _ => MergeOutcome::Conflict(all_hunks()),
                };
                match outcome {
                    MergeOutcome::Merged(content) => {
                        tracing::info!(id = %shadow.id, "merged patch onto live changes");
                        Ok(Ok(content))
                    },
                    MergeOutcome::Conflict(conflicting) => {
                        let reason = "three-way merge found overlapping edits";
                        self.store
                            .transition(&shadow.id, &[ShadowStatus::Approved], ShadowStatus::Conflict, "system", Some(reason), |_| {})
                            .await?;
                        tracing::warn!(id = %shadow.id, hunks = ?conflicting, "{reason}");
                        Ok(Err(self
                            .failure(shadow, PatchErrorCode::MergeFailed, reason)
                            .with_conflict(details(conflicting))))
                    },
                }
            },
        }
    }

    fn failure(&self, shadow: &ShadowFile, code: PatchErrorCode, error: &str) -> PatchApplyResult {
        PatchApplyResult::failure(&shadow.id, &destination(shadow), code, error)
    }

    /// Restore an applied shadow's live file from its backup.
    ///
    /// A created file with no backup is removed instead. Renames are undone
    /// by restoring the old path and removing the new one.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidTransition`] unless the shadow is
    /// `applied`, [`ShadowError::NoBackup`] when there is nothing to restore
    /// from, and I/O errors.
    pub async fn rollback(&self, id: &str) -> ShadowResult<ShadowFile> {
        let engine = self.clone();
        let owned = id.to_string();
        self.bounded(move |deadline| async move { engine.rollback_locked(&owned, &deadline).await })
            .await?
    }

    async fn rollback_locked(&self, id: &str, deadline: &Deadline) -> ShadowResult<ShadowFile> {
        let shadow = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ShadowError::NotFound(id.to_string()))?;
        let destination = destination(&shadow);
        let _guards = self
            .store
            .lock_paths(&[shadow.original_path.as_path(), destination.as_path()])
            .await;

        let shadow = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ShadowError::NotFound(id.to_string()))?;
        if shadow.status != ShadowStatus::Applied {
            return Err(ShadowError::InvalidTransition {
                id: id.to_string(),
                status: shadow.status.to_string(),
                expected: ShadowStatus::Applied.to_string(),
            });
        }

        let operation = shadow.pending_patch.as_ref().map(|p| p.operation);
        let fs = self.store.fs();
        let backup = match (&shadow.backup_path, operation) {
            (Some(backup), _) => Some(fs.read(backup).await.map(|content| (backup, content))?),
            (None, Some(PatchOperation::Create)) => None,
            (None, _) => return Err(ShadowError::NoBackup(id.to_string())),
        };
        if !deadline.commit() {
            return Err(ShadowError::Timeout(self.timeout));
        }
        match backup {
            Some((backup, content)) => {
                fs.write_atomic(&shadow.original_path, &content).await?;
                if destination != shadow.original_path {
                    fs.remove(&destination).await?;
                }
                fs.remove(backup).await?;
            },
            None => fs.remove(&shadow.original_path).await?,
        }

        let shadow = self
            .store
            .amend(id, "reviewer", "rolled back", |s| s.backup_path = None)
            .await?;
        tracing::info!(id = %id, path = %shadow.original_path.display(), "rolled back");
        Ok(shadow)
    }
}

fn destination(shadow: &ShadowFile) -> PathBuf {
    shadow
        .pending_patch
        .as_ref()
        .map_or_else(|| shadow.original_path.clone(), |p| p.destination().to_path_buf())
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;
