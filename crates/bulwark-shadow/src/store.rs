//! Shadow staging: proposed changes live in a private copy until a reviewer
//! approves them.
//!
//! Layout under the shadow root:
//!
//! ```text
//! {root}/index.json    every ShadowFile, rewritten atomically per transition
//! {root}/{id}          staged content (what the live file becomes)
//! {root}/{id}.base     live content at proposal time (three-way merge base)
//! ```

use bulwark_audit::{AuditAction, AuditLog};
use bulwark_core::{ContentDigest, ContentHash, Sha256Digest, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ShadowError, ShadowResult};
use crate::fs::{FileSystem, HostFs};
use crate::patch::{FilePatch, compute_patch};

const INDEX_FILE: &str = "index.json";

/// Lifecycle state of a shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowStatus {
    /// Awaiting review.
    Pending,
    /// Approved, not yet applied.
    Approved,
    /// Rejected or superseded.
    Rejected,
    /// Written to the live file.
    Applied,
    /// The live file diverged and the apply was refused.
    Conflict,
}

impl ShadowStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Applied => "applied",
            Self::Conflict => "conflict",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Applied | Self::Conflict)
    }
}

impl fmt::Display for ShadowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staged change to one live file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowFile {
    /// Shadow id (the patch id).
    pub id: String,
    /// Live file the patch targets.
    pub original_path: PathBuf,
    /// Whether the live file existed at proposal time.
    pub original_exists: bool,
    /// Digest of the live file at proposal time.
    #[serde(default)]
    pub original_hash: Option<ContentHash>,
    /// Staged copy.
    pub shadow_path: PathBuf,
    /// Digest of the staged content.
    pub shadow_hash: ContentHash,
    /// The proposed patch.
    #[serde(default)]
    pub pending_patch: Option<FilePatch>,
    /// Lifecycle state.
    pub status: ShadowStatus,
    /// Proposal time.
    pub created_at: Timestamp,
    /// Approval or rejection time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<Timestamp>,
    /// Apply time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<Timestamp>,
    /// Backup written by apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    /// Why the shadow reached its current state (rejection reason, conflict).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

/// Staging area for proposed file changes.
pub struct ShadowStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    digest: Arc<dyn ContentDigest>,
    audit: Option<Arc<AuditLog>>,
    index: Mutex<BTreeMap<String, ShadowFile>>,
    path_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl fmt::Debug for ShadowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowStore")
            .field("root", &self.root)
            .field("digest", &self.digest.algorithm())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl ShadowStore {
    /// Open (or create) a store on the host filesystem with SHA-256 digests.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be created or the index is
    /// corrupt.
    pub async fn open(root: impl Into<PathBuf>) -> ShadowResult<Self> {
        Self::open_with(root, Arc::new(HostFs::new()), Arc::new(Sha256Digest)).await
    }

    /// Open a store with explicit filesystem and digest implementations.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be created or the index is
    /// corrupt.
    pub async fn open_with(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        digest: Arc<dyn ContentDigest>,
    ) -> ShadowResult<Self> {
        let root = root.into();
        fs.create_dir_all(&root).await?;

        let index_path = root.join(INDEX_FILE);
        let index = if fs.exists(&index_path).await? {
            let bytes = fs.read(&index_path).await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(root = %root.display(), shadows = index.len(), "opened shadow store");
        Ok(Self {
            root,
            fs,
            digest,
            audit: None,
            index: Mutex::new(index),
            path_locks: DashMap::new(),
        })
    }

    /// Record every transition to an audit log.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Shadow root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub(crate) fn digest(&self, data: &[u8]) -> ContentHash {
        self.digest.digest(data)
    }

    /// Stage a patch as a new `pending` shadow.
    ///
    /// Any non-terminal shadow for the same path is superseded (marked
    /// `rejected` with reason "superseded").
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidPatch`] or [`ShadowError::HunkMismatch`]
    /// before anything is written, [`ShadowError::TargetExists`] for a create
    /// over an existing file, and I/O errors while staging.
    pub async fn propose(&self, mut patch: FilePatch) -> ShadowResult<ShadowFile> {
        patch.validate()?;
        patch.file_path = normalize_path(&patch.file_path);
        patch.new_file_path = patch.new_file_path.as_deref().map(normalize_path);
        if self.index.lock().await.contains_key(&patch.id) {
            return Err(ShadowError::InvalidPatch(format!(
                "patch id {} is already staged",
                patch.id
            )));
        }

        let _guards = self.lock_paths(&[patch.file_path.as_path()]).await;

        let live = self.read_text(&patch.file_path).await?;
        let target = patch.target_content(live.as_deref())?;

        let id = patch.id.clone();
        let shadow_path = self.root.join(&id);
        self.fs.write_atomic(&shadow_path, target.as_bytes()).await?;
        if let Some(live) = &live {
            self.fs
                .write_atomic(&self.base_path(&id), live.as_bytes())
                .await?;
        }

        let shadow = ShadowFile {
            id: id.clone(),
            original_path: patch.file_path.clone(),
            original_exists: live.is_some(),
            original_hash: live.as_ref().map(|l| self.digest(l.as_bytes())),
            shadow_path,
            shadow_hash: self.digest(target.as_bytes()),
            pending_patch: Some(patch),
            status: ShadowStatus::Pending,
            created_at: Timestamp::now(),
            reviewed_at: None,
            applied_at: None,
            backup_path: None,
            status_reason: None,
        };

        let superseded = {
            let mut index = self.index.lock().await;
            if index.contains_key(&id) {
                return Err(ShadowError::InvalidPatch(format!(
                    "patch id {id} is already staged"
                )));
            }
            let now = Timestamp::now();
            let mut superseded = Vec::new();
            for existing in index.values_mut() {
                if existing.original_path == shadow.original_path && !existing.status.is_terminal() {
                    superseded.push((existing.id.clone(), existing.status, existing.shadow_path.clone()));
                    existing.status = ShadowStatus::Rejected;
                    existing.reviewed_at = Some(now);
                    existing.status_reason = Some("superseded".to_string());
                }
            }
            index.insert(id.clone(), shadow.clone());
            self.persist(&index).await?;
            superseded
        };

        for (old_id, from, old_shadow_path) in superseded {
            self.discard_staged(&old_id, &old_shadow_path).await;
            self.audit_transition(
                "system",
                &old_id,
                &shadow.original_path,
                Some(from),
                ShadowStatus::Rejected,
                Some("superseded"),
            )
            .await;
            tracing::debug!(id = %old_id, by = %id, "shadow superseded");
        }

        let actor = shadow
            .pending_patch
            .as_ref()
            .and_then(|p| p.tool_id.clone())
            .unwrap_or_else(|| "agent".to_string());
        self.audit_transition(
            &actor,
            &id,
            &shadow.original_path,
            None,
            ShadowStatus::Pending,
            None,
        )
        .await;
        tracing::info!(
            id = %id,
            path = %shadow.original_path.display(),
            original_exists = shadow.original_exists,
            "patch staged"
        );
        Ok(shadow)
    }

    /// Stage the change from the current live content to `new_content`.
    ///
    /// # Errors
    ///
    /// See [`ShadowStore::propose`].
    pub async fn stage_content(
        &self,
        path: impl Into<PathBuf>,
        new_content: &str,
    ) -> ShadowResult<ShadowFile> {
        let path = path.into();
        let live = self.read_text(&path).await?;
        self.propose(compute_patch(path, live.as_deref(), new_content))
            .await
    }

    /// Approve a pending shadow.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::NotFound`] or [`ShadowError::InvalidTransition`].
    pub async fn approve(&self, id: &str) -> ShadowResult<ShadowFile> {
        self.transition(id, &[ShadowStatus::Pending], ShadowStatus::Approved, "reviewer", None, |s| {
            s.reviewed_at = Some(Timestamp::now());
        })
        .await
    }

    /// Reject a pending shadow and discard its staged copy.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::NotFound`] or [`ShadowError::InvalidTransition`].
    pub async fn reject(&self, id: &str, reason: Option<&str>) -> ShadowResult<ShadowFile> {
        let shadow = self
            .transition(id, &[ShadowStatus::Pending], ShadowStatus::Rejected, "reviewer", reason, |s| {
                s.reviewed_at = Some(Timestamp::now());
            })
            .await?;
        self.discard_staged(&shadow.id, &shadow.shadow_path).await;
        Ok(shadow)
    }

    /// Look up a shadow.
    pub async fn get(&self, id: &str) -> Option<ShadowFile> {
        self.index.lock().await.get(id).cloned()
    }

    /// All shadows, oldest first.
    pub async fn list(&self) -> Vec<ShadowFile> {
        let mut all: Vec<ShadowFile> = self.index.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Shadows awaiting review, oldest first.
    pub async fn list_pending(&self) -> Vec<ShadowFile> {
        self.list()
            .await
            .into_iter()
            .filter(|s| s.status == ShadowStatus::Pending)
            .collect()
    }

    /// Drop terminal shadows older than `max_age_hours` with their staged
    /// copies. Backups are left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be rewritten.
    pub async fn cleanup(&self, max_age_hours: u64) -> ShadowResult<usize> {
        let age = i64::try_from(max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };

        let removed: Vec<ShadowFile> = {
            let mut index = self.index.lock().await;
            let expired: Vec<String> = index
                .values()
                .filter(|s| s.status.is_terminal() && s.created_at.0 < cutoff)
                .map(|s| s.id.clone())
                .collect();
            let removed: Vec<ShadowFile> = expired.iter().filter_map(|id| index.remove(id)).collect();
            if !removed.is_empty() {
                self.persist(&index).await?;
            }
            removed
        };

        for shadow in &removed {
            self.discard_staged(&shadow.id, &shadow.shadow_path).await;
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), max_age_hours, "cleaned up shadows");
        }
        Ok(removed.len())
    }

    /// Staged content of a shadow.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged copy is missing or not UTF-8.
    pub async fn staged_content(&self, shadow: &ShadowFile) -> ShadowResult<String> {
        let bytes = self.fs.read(&shadow.shadow_path).await?;
        String::from_utf8(bytes).map_err(|_| {
            ShadowError::InvalidPatch(format!(
                "staged copy {} is not valid UTF-8",
                shadow.shadow_path.display()
            ))
        })
    }

    /// Live content at proposal time, if the file existed and the snapshot
    /// is still on disk.
    pub(crate) async fn base_content(&self, id: &str) -> Option<String> {
        let bytes = self.fs.read(&self.base_path(id)).await.ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Read a live file as UTF-8, `None` if it does not exist.
    pub(crate) async fn read_text(&self, path: &Path) -> ShadowResult<Option<String>> {
        if !self.fs.exists(path).await? {
            return Ok(None);
        }
        let bytes = self.fs.read(path).await?;
        String::from_utf8(bytes).map(Some).map_err(|_| {
            ShadowError::InvalidPatch(format!("{} is not valid UTF-8", path.display()))
        })
    }

    /// Lock every path in `paths`, in a fixed order.
    pub(crate) async fn lock_paths(&self, paths: &[&Path]) -> Vec<OwnedMutexGuard<()>> {
        let mut keys: Vec<String> = paths
            .iter()
            .map(|p| normalize_path(p).to_string_lossy().into_owned())
            .collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self
                .path_locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Move a shadow between states.
    pub(crate) async fn transition(
        &self,
        id: &str,
        allowed: &[ShadowStatus],
        to: ShadowStatus,
        actor: &str,
        reason: Option<&str>,
        update: impl FnOnce(&mut ShadowFile) + Send,
    ) -> ShadowResult<ShadowFile> {
        let (from, shadow) = {
            let mut index = self.index.lock().await;
            let shadow = index
                .get_mut(id)
                .ok_or_else(|| ShadowError::NotFound(id.to_string()))?;
            if !allowed.contains(&shadow.status) {
                return Err(ShadowError::InvalidTransition {
                    id: id.to_string(),
                    status: shadow.status.to_string(),
                    expected: allowed
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(" or "),
                });
            }
            let from = shadow.status;
            shadow.status = to;
            shadow.status_reason = reason.map(str::to_string);
            update(shadow);
            let shadow = shadow.clone();
            self.persist(&index).await?;
            (from, shadow)
        };

        self.audit_transition(actor, id, &shadow.original_path, Some(from), to, reason)
            .await;
        tracing::debug!(id = %id, from = %from, to = %to, "shadow transition");
        Ok(shadow)
    }

    /// Update a shadow's fields without changing its state.
    pub(crate) async fn amend(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        update: impl FnOnce(&mut ShadowFile) + Send,
    ) -> ShadowResult<ShadowFile> {
        let shadow = {
            let mut index = self.index.lock().await;
            let shadow = index
                .get_mut(id)
                .ok_or_else(|| ShadowError::NotFound(id.to_string()))?;
            update(shadow);
            shadow.status_reason = Some(reason.to_string());
            let shadow = shadow.clone();
            self.persist(&index).await?;
            shadow
        };
        self.audit_transition(
            actor,
            id,
            &shadow.original_path,
            Some(shadow.status),
            shadow.status,
            Some(reason),
        )
        .await;
        Ok(shadow)
    }

    /// Remove the staged copy and base snapshot. Missing files are fine.
    pub(crate) async fn discard_staged(&self, id: &str, shadow_path: &Path) {
        for path in [shadow_path.to_path_buf(), self.base_path(id)] {
            match self.fs.remove(&path).await {
                Ok(()) | Err(ShadowError::FileNotFound(_)) => {},
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove staged file"),
            }
        }
    }

    fn base_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.base"))
    }

    async fn persist(&self, index: &BTreeMap<String, ShadowFile>) -> ShadowResult<()> {
        let bytes = serde_json::to_vec_pretty(index)?;
        self.fs
            .write_atomic(&self.root.join(INDEX_FILE), &bytes)
            .await
    }

    /// Audit sinks lock and sync their file, so the append runs on the
    /// blocking pool. It is awaited, so entries keep the caller's order.
    async fn audit_transition(
        &self,
        actor: &str,
        id: &str,
        path: &Path,
        from: Option<ShadowStatus>,
        to: ShadowStatus,
        reason: Option<&str>,
    ) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let actor = actor.to_string();
        let action = AuditAction::ShadowTransition {
            patch_id: id.to_string(),
            path: path.display().to_string(),
            from: from.map(|s| s.to_string()),
            to: to.to_string(),
            reason: reason.map(str::to_string),
        };
        match tokio::task::spawn_blocking(move || audit.record(&actor, action)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to record audit entry"),
            Err(e) => tracing::warn!(error = %e, "audit task failed"),
        }
    }
}

/// Drop `.` components so equivalent spellings of a path compare equal.
/// `..` is refused by [`FilePatch::validate`] before this runs.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
