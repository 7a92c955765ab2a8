//! Remembered approvals ("grants") keyed by effect type and normalized target.
//!
//! A grant is created when a confirmation is approved with a `session` or
//! `permanent` approval type. Session grants carry an expiry and are dropped
//! by [`GrantStore::clear_session`]; permanent grants survive it and can be
//! persisted with [`JsonFileGrantStore`].

use bulwark_core::{ConfirmationPolicy, EffectType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{PolicyError, PolicyResult};

/// What a grant covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantKey {
    /// Effect type.
    pub effect_type: EffectType,
    /// Normalized target (see `EffectTarget::normalized`).
    pub target: String,
}

impl GrantKey {
    /// Create a key.
    #[must_use]
    pub fn new(effect_type: EffectType, target: impl Into<String>) -> Self {
        Self {
            effect_type,
            target: target.into(),
        }
    }
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.effect_type, self.target)
    }
}

/// A remembered approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// What is covered.
    pub key: GrantKey,
    /// `session` or `permanent`.
    pub policy: ConfirmationPolicy,
    /// When the grant was recorded.
    pub granted_at: Timestamp,
    /// When it lapses; `None` never lapses on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// The request whose approval created the grant.
    pub request_id: String,
}

impl Grant {
    /// Create a grant recorded now.
    #[must_use]
    pub fn new(
        key: GrantKey,
        policy: ConfirmationPolicy,
        expires_at: Option<Timestamp>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            key,
            policy,
            granted_at: Timestamp::now(),
            expires_at,
            request_id: request_id.into(),
        }
    }

    /// Whether the grant has lapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.expires_at.is_some_and(|e| e.is_at_or_before(now.0))
    }
}

/// Storage for grants.
pub trait GrantStore: Send + Sync {
    /// The live grant for `key` at `now`. Expired grants are never returned.
    fn lookup(&self, key: &GrantKey, now: &Timestamp) -> Option<Grant>;

    /// Record a grant, replacing any grant for the same key.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] if the grant cannot be persisted.
    fn insert(&self, grant: Grant) -> PolicyResult<()>;

    /// Remove the grant for `key`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] if the change cannot be persisted.
    fn revoke(&self, key: &GrantKey) -> PolicyResult<bool>;

    /// Drop every session grant. Returns how many were removed.
    fn clear_session(&self) -> usize;

    /// All grants currently held (including expired ones not yet purged).
    fn list(&self) -> Vec<Grant>;
}

/// In-memory grant store.
#[derive(Default)]
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<GrantKey, Grant>>,
}

impl MemoryGrantStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_grants(grants: impl IntoIterator<Item = Grant>) -> Self {
        Self {
            grants: RwLock::new(grants.into_iter().map(|g| (g.key.clone(), g)).collect()),
        }
    }

    /// Number of grants held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<GrantKey, Grant>> {
        self.grants.read().unwrap_or_else(|e| {
            tracing::warn!("MemoryGrantStore read lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<GrantKey, Grant>> {
        self.grants.write().unwrap_or_else(|e| {
            tracing::warn!("MemoryGrantStore write lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl fmt::Debug for MemoryGrantStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGrantStore")
            .field("count", &self.len())
            .finish()
    }
}

impl GrantStore for MemoryGrantStore {
    fn lookup(&self, key: &GrantKey, now: &Timestamp) -> Option<Grant> {
        {
            let grants = self.read();
            match grants.get(key) {
                None => return None,
                Some(grant) if !grant.is_expired_at(now) => return Some(grant.clone()),
                Some(_) => {},
            }
        }
        // Expired: purge it unless it was replaced in the meantime.
        let mut grants = self.write();
        if grants.get(key).is_some_and(|g| g.is_expired_at(now)) {
            grants.remove(key);
        }
        None
    }

    fn insert(&self, grant: Grant) -> PolicyResult<()> {
        self.write().insert(grant.key.clone(), grant);
        Ok(())
    }

    fn revoke(&self, key: &GrantKey) -> PolicyResult<bool> {
        Ok(self.write().remove(key).is_some())
    }

    fn clear_session(&self) -> usize {
        let mut grants = self.write();
        let before = grants.len();
        grants.retain(|_, g| g.policy != ConfirmationPolicy::Session);
        before.saturating_sub(grants.len())
    }

    fn list(&self) -> Vec<Grant> {
        let mut grants: Vec<Grant> = self.read().values().cloned().collect();
        grants.sort_by(|a, b| a.key.cmp(&b.key));
        grants
    }
}

/// Grant store that persists permanent grants to a JSON file.
///
/// Session grants stay in memory only. The file is rewritten atomically
/// (temp file in the same directory, fsync, rename) on every permanent
/// change.
pub struct JsonFileGrantStore {
    path: PathBuf,
    memory: MemoryGrantStore,
}

impl JsonFileGrantStore {
    /// Open (or create) a store at `path`, loading existing permanent grants.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> PolicyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let grants: Vec<Grant> = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| PolicyError::Serialization(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(PolicyError::Storage(format!("{}: {e}", path.display()))),
        };
        let grants = grants
            .into_iter()
            .filter(|g| g.policy == ConfirmationPolicy::Permanent);
        Ok(Self {
            memory: MemoryGrantStore::with_grants(grants),
            path,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> PolicyResult<()> {
        let permanent: Vec<Grant> = self
            .memory
            .list()
            .into_iter()
            .filter(|g| g.policy == ConfirmationPolicy::Permanent)
            .collect();
        let json = serde_json::to_vec_pretty(&permanent)
            .map_err(|e| PolicyError::Serialization(e.to_string()))?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| PolicyError::Storage(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| PolicyError::Storage(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| PolicyError::Storage(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PolicyError::Storage(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| PolicyError::Storage(e.to_string()))?;
        Ok(())
    }
}

impl fmt::Debug for JsonFileGrantStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileGrantStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl GrantStore for JsonFileGrantStore {
    fn lookup(&self, key: &GrantKey, now: &Timestamp) -> Option<Grant> {
        self.memory.lookup(key, now)
    }

    fn insert(&self, grant: Grant) -> PolicyResult<()> {
        let permanent = grant.policy == ConfirmationPolicy::Permanent;
        self.memory.insert(grant)?;
        if permanent {
            self.persist()?;
        }
        Ok(())
    }

    fn revoke(&self, key: &GrantKey) -> PolicyResult<bool> {
        let removed = self.memory.revoke(key)?;
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn clear_session(&self) -> usize {
        self.memory.clear_session()
    }

    fn list(&self) -> Vec<Grant> {
        self.memory.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(target: &str) -> GrantKey {
        GrantKey::new(EffectType::ShellRead, target)
    }

    #[test]
    fn test_lookup_respects_expiry() {
        let store = MemoryGrantStore::new();
        let now = Timestamp::now();
        let expiry = now.plus(chrono::Duration::minutes(5));
        store
            .insert(Grant::new(
                key("ls"),
                ConfirmationPolicy::Session,
                Some(expiry),
                "r1",
            ))
            .unwrap();

        assert!(store.lookup(&key("ls"), &now).is_some());
        assert!(store.lookup(&key("ls -la"), &now).is_none());

        let later = expiry.plus(chrono::Duration::seconds(1));
        assert!(store.lookup(&key("ls"), &later).is_none());
        assert!(store.is_empty(), "expired grant is purged");
    }

    #[test]
    fn test_clear_session_keeps_permanent() {
        let store = MemoryGrantStore::new();
        store
            .insert(Grant::new(key("a"), ConfirmationPolicy::Session, None, "r1"))
            .unwrap();
        store
            .insert(Grant::new(key("b"), ConfirmationPolicy::Permanent, None, "r2"))
            .unwrap();
        assert_eq!(store.clear_session(), 1);
        let remaining = store.list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, key("b"));
    }

    #[test]
    fn test_revoke() {
        let store = MemoryGrantStore::new();
        store
            .insert(Grant::new(key("a"), ConfirmationPolicy::Permanent, None, "r1"))
            .unwrap();
        assert!(store.revoke(&key("a")).unwrap());
        assert!(!store.revoke(&key("a")).unwrap());
    }

    #[test]
    fn test_json_store_persists_permanent_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        {
            let store = JsonFileGrantStore::open(&path).unwrap();
            store
                .insert(Grant::new(key("a"), ConfirmationPolicy::Permanent, None, "r1"))
                .unwrap();
            store
                .insert(Grant::new(key("b"), ConfirmationPolicy::Session, None, "r2"))
                .unwrap();
        }

        let reopened = JsonFileGrantStore::open(&path).unwrap();
        let grants = reopened.list();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].key, key("a"));
        assert_eq!(grants[0].request_id, "r1");

        assert!(reopened.revoke(&key("a")).unwrap());
        assert!(JsonFileGrantStore::open(&path).unwrap().list().is_empty());
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileGrantStore::open(&path),
            Err(PolicyError::Serialization(_))
        ));
    }
}
