//! End-to-end scenarios through the gate and the shadow pipeline.

mod common;

use bulwark_core::{ConfirmationPolicy, DenialCode, PatchErrorCode};
use bulwark_policy::{Submission, Verdict};
use bulwark_shadow::{ConflictStrategy, FilePatch, PatchApplyRequest, ShadowStatus};
use bulwark_test::prelude::*;
use common::{GateHarness, ShadowHarness};

// ----------------------------------------------------------------------------
// Gate
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_read_is_approved_without_a_prompt() {
    let harness = GateHarness::with_defaults();

    let submission = harness.gate.submit(fs_read_request("/ws/readme.md"));
    let response = submission.decided().cloned().expect("read should be decided");

    assert!(response.approved);
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Never));
    assert!(response.denial_code.is_none());
    assert!(harness.presenter.prompts().is_empty());
    assert_eq!(harness.gate.pending_count(), 0);
}

#[tokio::test]
async fn test_destructive_shell_command_is_denied_by_reviewer() {
    init_test_logging();
    let harness = GateHarness::with_defaults();
    let request = shell_request("rm", &["-rf", "/"]);
    let id = request.id.clone();

    let Submission::Pending(handle) = harness.gate.submit(request) else {
        panic!("shell:write should await confirmation");
    };
    let prompt = harness.presenter.wait_for_prompt().await;
    assert_eq!(prompt.request_id, id);
    assert!(prompt.requires_confirmation);
    assert_eq!(prompt.details, "rm -rf /");

    harness
        .gate
        .resolve_confirmation(&id, Verdict::deny("not on my machine"))
        .unwrap();
    let response = handle.wait().await;

    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::UserDenied));
    assert_eq!(response.denial_reason.as_deref(), Some("not on my machine"));
    assert_eq!(harness.gate.pending_count(), 0);
}

// ----------------------------------------------------------------------------
// Shadow pipeline
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_external_edit_aborts_apply_and_leaves_file_untouched() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.write("src/lib.rs", "fn a() {}\nfn b() {}\n");

    let patch = FilePatch::modify(&path, "fn a() {}\nfn b() {}\n", "fn a() {}\nfn c() {}\n");
    let shadow = harness.store.propose(patch).await.unwrap();
    let base_hash = shadow.original_hash.clone().expect("file existed");

    harness.workspace.write("src/lib.rs", "// edited elsewhere\n");
    harness.store.approve(&shadow.id).await.unwrap();

    let result = harness
        .engine
        .apply(&PatchApplyRequest::new(&shadow.id).with_strategy(ConflictStrategy::Abort))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_code, Some(PatchErrorCode::ConflictDetected));
    let details = result.conflict_details.expect("conflict details");
    assert_eq!(details.expected_hash, Some(base_hash));
    assert_ne!(details.actual_hash, details.expected_hash);
    assert_eq!(
        harness.workspace.read("src/lib.rs").as_deref(),
        Some("// edited elsewhere\n")
    );

    let shadow = harness.store.get(&shadow.id).await.unwrap();
    assert_eq!(shadow.status, ShadowStatus::Conflict);
}

#[tokio::test]
async fn test_create_applies_without_backup() {
    let harness = ShadowHarness::new().await;
    let path = harness.workspace.path("new.txt");

    let shadow = harness
        .store
        .propose(FilePatch::create(&path, "hello"))
        .await
        .unwrap();
    assert!(!shadow.original_exists);
    assert!(shadow.original_hash.is_none());
    harness.store.approve(&shadow.id).await.unwrap();

    let result = harness
        .engine
        .apply(&PatchApplyRequest::new(&shadow.id).with_backup(true))
        .await;

    assert!(result.success, "apply failed: {:?}", result.error);
    assert!(result.backup_path.is_none());
    assert!(result.applied_at.is_some());
    assert_eq!(harness.workspace.read("new.txt").as_deref(), Some("hello"));

    let shadow = harness.store.get(&shadow.id).await.unwrap();
    assert_eq!(shadow.status, ShadowStatus::Applied);
    assert!(shadow.applied_at.is_some());
}
