//! Host wiring: one resolved config, the stores it points at, and the gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bulwark_audit::AuditLog;
use bulwark_config::{Config, ResolvedConfig};
use bulwark_policy::{ConfirmationPresenter, JsonFileGrantStore, PolicyGate};
use bulwark_shadow::{ApplyEngine, ShadowStore};

use crate::bridge::{self, StoragePaths};

/// Everything a command needs to reach the trust boundary.
pub(crate) struct Host {
    resolved: ResolvedConfig,
    workspace_root: PathBuf,
    paths: StoragePaths,
}

impl Host {
    /// Wrap an already-loaded configuration.
    pub(crate) fn new(resolved: ResolvedConfig, workspace_root: PathBuf) -> Self {
        let paths = bridge::storage_paths(&resolved.config, &workspace_root);
        Self {
            resolved,
            workspace_root,
            paths,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.resolved.config
    }

    pub(crate) fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub(crate) fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub(crate) fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Open the JSON-lines audit log.
    pub(crate) fn audit_log(&self) -> anyhow::Result<Arc<AuditLog>> {
        let log = AuditLog::open_jsonl(&self.paths.audit_log)
            .with_context(|| format!("opening audit log {}", self.paths.audit_log.display()))?;
        Ok(Arc::new(log))
    }

    /// Build a gate backed by the file grant store and `audit`.
    pub(crate) fn gate(
        &self,
        audit: Arc<AuditLog>,
        presenter: Arc<dyn ConfirmationPresenter>,
    ) -> anyhow::Result<PolicyGate> {
        let policy = bridge::to_policy_config(self.config(), &self.workspace_root)?;
        let grants = JsonFileGrantStore::open(&self.paths.grants)
            .with_context(|| format!("opening grant store {}", self.paths.grants.display()))?;
        let gate = PolicyGate::builder(policy)
            .grant_store(Arc::new(grants))
            .audit_log(audit)
            .presenter(presenter)
            .build()?;
        Ok(gate)
    }

    /// Open the shadow store, recording transitions to `audit`.
    pub(crate) async fn shadow_store(&self, audit: Arc<AuditLog>) -> anyhow::Result<Arc<ShadowStore>> {
        let store = ShadowStore::open(&self.paths.shadow_root)
            .await
            .with_context(|| {
                format!("opening shadow store {}", self.paths.shadow_root.display())
            })?
            .with_audit(audit);
        Ok(Arc::new(store))
    }

    /// Apply engine over `store` with the configured timeout.
    pub(crate) fn apply_engine(&self, store: Arc<ShadowStore>) -> ApplyEngine {
        ApplyEngine::new(store).with_timeout(bridge::apply_timeout(self.config()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_config::loader;
    use bulwark_policy::ChannelPresenter;

    fn host(ws: &Path) -> Host {
        let home = ws.join("home");
        std::fs::create_dir_all(&home).unwrap();
        let resolved = loader::load(Some(ws), Some(&home)).unwrap();
        Host::new(resolved, ws.to_path_buf())
    }

    #[tokio::test]
    async fn test_stores_live_under_workspace_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());

        let audit = host.audit_log().unwrap();
        let (presenter, _rx) = ChannelPresenter::new();
        let gate = host.gate(Arc::clone(&audit), Arc::new(presenter)).unwrap();
        assert!(!gate.config().blocklists.is_empty());

        let store = host.shadow_store(audit).await.unwrap();
        assert!(store.root().starts_with(dir.path().join(".bulwark")));
        assert!(host.paths().audit_log.parent().unwrap().is_dir());
    }
}
