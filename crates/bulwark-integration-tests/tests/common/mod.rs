//! Shared harnesses for the integration suites.

use std::sync::Arc;

use bulwark_audit::AuditLog;
use bulwark_policy::{PolicyConfig, PolicyGate};
use bulwark_shadow::{ApplyEngine, ShadowStore};
use bulwark_test::{RecordingPresenter, TestWorkspace};

/// A gate wired to a recording presenter and an in-memory audit log.
#[allow(dead_code)]
pub struct GateHarness {
    pub gate: PolicyGate,
    pub presenter: RecordingPresenter,
    pub audit: Arc<AuditLog>,
}

#[allow(dead_code)]
impl GateHarness {
    pub fn new(config: PolicyConfig) -> Self {
        let presenter = RecordingPresenter::new();
        let audit = Arc::new(AuditLog::in_memory());
        let gate = PolicyGate::builder(config)
            .presenter(presenter.shared())
            .audit_log(Arc::clone(&audit))
            .build()
            .unwrap();
        Self {
            gate,
            presenter,
            audit,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PolicyConfig::default())
    }
}

/// A shadow store and apply engine over a temporary workspace.
#[allow(dead_code)]
pub struct ShadowHarness {
    pub workspace: TestWorkspace,
    pub store: Arc<ShadowStore>,
    pub engine: ApplyEngine,
    pub audit: Arc<AuditLog>,
}

#[allow(dead_code)]
impl ShadowHarness {
    pub async fn new() -> Self {
        let workspace = TestWorkspace::new();
        let audit = Arc::new(AuditLog::in_memory());
        let store = Arc::new(
            ShadowStore::open(workspace.shadow_root())
                .await
                .unwrap()
                .with_audit(Arc::clone(&audit)),
        );
        let engine = ApplyEngine::new(Arc::clone(&store));
        Self {
            workspace,
            store,
            engine,
            audit,
        }
    }
}
