//! Shadow lifecycle across the store, the apply engine and the audit log.

mod common;

use bulwark_audit::AuditAction;
use bulwark_core::PatchErrorCode;
use bulwark_shadow::{
    ConflictStrategy, FilePatch, PatchApplyRequest, ShadowError, ShadowStatus, ShadowStore,
};
use common::ShadowHarness;

fn numbered(count: usize) -> String {
    (1..=count).map(|n| format!("line {n}\n")).collect()
}

fn with_line(content: &str, line: usize, replacement: &str) -> String {
    content
        .lines()
        .zip(1..)
        .map(|(l, n)| {
            if n == line {
                format!("{replacement}\n")
            } else {
                format!("{l}\n")
            }
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Proposal
// ----------------------------------------------------------------------------

#[test]
fn test_declared_counts_match_hunks() {
    let original = numbered(12);
    let modified = with_line(&with_line(&original, 3, "three"), 9, "nine");
    let patch = FilePatch::modify("/ws/a.txt", &original, &modified);

    assert_eq!(patch.recount().unwrap(), (patch.additions, patch.deletions));
    assert_eq!((patch.additions, patch.deletions), (2, 2));
}

#[tokio::test]
async fn test_misdeclared_counts_are_rejected_before_staging() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "old\n");
    let mut patch = FilePatch::modify(&path, "old\n", "new\n");
    patch.additions = 7;

    let err = harness.store.propose(patch).await.unwrap_err();
    assert!(matches!(err, ShadowError::InvalidPatch(_)));
    assert!(harness.store.list().await.is_empty());
    assert_eq!(harness.workspace.read("a.txt").as_deref(), Some("old\n"));
}

#[tokio::test]
async fn test_new_proposal_supersedes_the_pending_one() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "v1\n");

    let first = harness
        .store
        .propose(FilePatch::modify(&path, "v1\n", "v2\n"))
        .await
        .unwrap();
    let second = harness.store.stage_content(&path, "v3\n").await.unwrap();

    let first = harness.store.get(&first.id).await.unwrap();
    assert_eq!(first.status, ShadowStatus::Rejected);
    assert_eq!(first.status_reason.as_deref(), Some("superseded"));

    let pending = harness.store.list_pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);
}

#[tokio::test]
async fn test_reject_only_from_pending() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "x\n");
    let shadow = harness.store.stage_content(&path, "y\n").await.unwrap();
    harness.store.approve(&shadow.id).await.unwrap();

    let err = harness.store.reject(&shadow.id, Some("too late")).await.unwrap_err();
    assert!(matches!(err, ShadowError::InvalidTransition { .. }));
}

// ----------------------------------------------------------------------------
// Apply
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_apply_requires_approval() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "x\n");
    let shadow = harness.store.stage_content(&path, "y\n").await.unwrap();

    let result = harness.engine.apply(&PatchApplyRequest::new(&shadow.id)).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(PatchErrorCode::NotApproved));
    assert_eq!(harness.workspace.read("a.txt").as_deref(), Some("x\n"));

    let missing = harness.engine.apply(&PatchApplyRequest::new("nope")).await;
    assert_eq!(missing.error_code, Some(PatchErrorCode::PatchNotFound));
}

#[tokio::test]
async fn test_force_overwrites_a_diverged_file() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "base\n");
    let shadow = harness.store.stage_content(&path, "ours\n").await.unwrap();
    harness.workspace.write("a.txt", "theirs\n");
    harness.store.approve(&shadow.id).await.unwrap();

    let result = harness
        .engine
        .apply(
            &PatchApplyRequest::new(&shadow.id)
                .with_strategy(ConflictStrategy::Force)
                .with_backup(true),
        )
        .await;

    assert!(result.success, "apply failed: {:?}", result.error);
    assert_eq!(harness.workspace.read("a.txt").as_deref(), Some("ours\n"));
    assert_eq!(harness.workspace.read("a.txt.bak").as_deref(), Some("theirs\n"));
    let shadow = harness.store.get(&shadow.id).await.unwrap();
    assert_eq!(shadow.status, ShadowStatus::Applied);
}

#[tokio::test]
async fn test_merge_keeps_non_overlapping_external_edits() {
    let harness = ShadowHarness::new().await;
    let original = numbered(20);
    let path = harness.workspace.write("a.txt", &original);

    let ours = with_line(&original, 2, "ours");
    let shadow = harness.store.stage_content(&path, &ours).await.unwrap();
    harness
        .workspace
        .write("a.txt", &with_line(&original, 18, "theirs"));
    harness.store.approve(&shadow.id).await.unwrap();

    let result = harness
        .engine
        .apply(&PatchApplyRequest::new(&shadow.id).with_strategy(ConflictStrategy::Merge))
        .await;

    assert!(result.success, "merge failed: {:?}", result.error);
    let merged = harness.workspace.read("a.txt").unwrap();
    assert_eq!(merged, with_line(&with_line(&original, 2, "ours"), 18, "theirs"));
}

#[tokio::test]
async fn test_merge_refuses_overlapping_edits() {
    let harness = ShadowHarness::new().await;
    let original = numbered(10);
    let path = harness.workspace.write("a.txt", &original);

    let shadow = harness
        .store
        .stage_content(&path, &with_line(&original, 5, "ours"))
        .await
        .unwrap();
    let theirs = with_line(&original, 5, "theirs");
    harness.workspace.write("a.txt", &theirs);
    harness.store.approve(&shadow.id).await.unwrap();

    let result = harness
        .engine
        .apply(&PatchApplyRequest::new(&shadow.id).with_strategy(ConflictStrategy::Merge))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(PatchErrorCode::MergeFailed));
    let details = result.conflict_details.unwrap();
    assert_eq!(details.conflicting_hunks, vec![0]);
    assert_eq!(harness.workspace.read("a.txt"), Some(theirs));
}

#[tokio::test]
async fn test_rollback_restores_the_backup() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "before\n");
    let shadow = harness.store.stage_content(&path, "after\n").await.unwrap();
    harness.store.approve(&shadow.id).await.unwrap();

    let result = harness
        .engine
        .apply(&PatchApplyRequest::new(&shadow.id).with_backup(true))
        .await;
    assert!(result.success);
    assert_eq!(harness.workspace.read("a.txt").as_deref(), Some("after\n"));

    let rolled = harness.engine.rollback(&shadow.id).await.unwrap();
    assert_eq!(rolled.status, ShadowStatus::Applied);
    assert_eq!(rolled.status_reason.as_deref(), Some("rolled back"));
    assert_eq!(harness.workspace.read("a.txt").as_deref(), Some("before\n"));
    assert!(harness.workspace.read("a.txt.bak").is_none());
}

#[tokio::test]
async fn test_rename_and_delete() {
    let harness = ShadowHarness::new().await;
    let old = harness.workspace.write("old.txt", "keep\n");
    let new = harness.workspace.path("new.txt");
    let gone = harness.workspace.write("gone.txt", "bye\n");

    let rename = harness
        .store
        .propose(FilePatch::rename(&old, &new, "keep\n", "keep\n"))
        .await
        .unwrap();
    let delete = harness
        .store
        .propose(FilePatch::delete(&gone, "bye\n"))
        .await
        .unwrap();
    for id in [&rename.id, &delete.id] {
        harness.store.approve(id).await.unwrap();
        let result = harness.engine.apply(&PatchApplyRequest::new(id)).await;
        assert!(result.success, "apply failed: {:?}", result.error);
    }

    assert!(harness.workspace.read("old.txt").is_none());
    assert_eq!(harness.workspace.read("new.txt").as_deref(), Some("keep\n"));
    assert!(harness.workspace.read("gone.txt").is_none());
}

// ----------------------------------------------------------------------------
// Persistence and audit
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_index_survives_reopen() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "x\n");
    let shadow = harness.store.stage_content(&path, "y\n").await.unwrap();
    harness.store.approve(&shadow.id).await.unwrap();

    let reopened = ShadowStore::open(harness.workspace.shadow_root()).await.unwrap();
    let restored = reopened.get(&shadow.id).await.unwrap();
    assert_eq!(restored.status, ShadowStatus::Approved);
    assert_eq!(restored.original_hash, shadow.original_hash);
}

#[tokio::test]
async fn test_transitions_are_audited_in_order() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("a.txt", "x\n");
    let shadow = harness.store.stage_content(&path, "y\n").await.unwrap();
    harness.store.approve(&shadow.id).await.unwrap();
    let result = harness.engine.apply(&PatchApplyRequest::new(&shadow.id)).await;
    assert!(result.success);

    let statuses: Vec<String> = harness
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.action {
            AuditAction::ShadowTransition { patch_id, to, .. } if patch_id == shadow.id => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        [ShadowStatus::Pending, ShadowStatus::Approved, ShadowStatus::Applied]
            .map(|s| s.as_str().to_string())
    );
    assert!(harness.audit.verify_chain().unwrap().valid);
}
