//! Gate-wide properties: taxonomy totality, confirmation slots, deadlines,
//! grants, rate limits and the audit trail.

mod common;

use std::time::Duration;

use bulwark_audit::{AuditAction, Decision};
use bulwark_core::{ConfirmationPolicy, DenialCode, EffectSource, EffectType};
use bulwark_policy::{
    EffectPayload, EffectRequest, GrantKey, PolicyConfig, PolicyError, PolicyGate, PolicyLists,
    RateLimitConfig, Submission, Verdict, policy_table, taxonomy,
};
use bulwark_test::prelude::*;
use common::GateHarness;

fn shell_read_request(command: &str, args: &[&str]) -> EffectRequest {
    EffectRequest::new(
        EffectType::ShellRead,
        EffectSource::Agent,
        EffectPayload {
            command: Some(command.to_string()),
            args: Some(args.iter().map(ToString::to_string).collect()),
            ..Default::default()
        },
    )
}

fn secrets_request() -> EffectRequest {
    EffectRequest::new(
        EffectType::SecretsRead,
        EffectSource::Agent,
        EffectPayload {
            description: Some("read the deploy token".to_string()),
            ..Default::default()
        },
    )
}

// ----------------------------------------------------------------------------
// Taxonomy
// ----------------------------------------------------------------------------

#[test]
fn test_every_effect_type_has_a_permitted_default() {
    let table = policy_table();
    assert_eq!(table.len(), EffectType::ALL.len());
    for row in table {
        assert!(
            taxonomy::is_permitted(row.effect_type, row.default_policy),
            "{} defaults to a policy it does not permit",
            row.effect_type
        );
        assert!(!taxonomy::permitted_policies(row.effect_type).is_empty());
    }
}

#[test]
fn test_secrets_read_cannot_be_relaxed() {
    for policy in [
        ConfirmationPolicy::Never,
        ConfirmationPolicy::Once,
        ConfirmationPolicy::Session,
        ConfirmationPolicy::Permanent,
    ] {
        let config = PolicyConfig::default().with_override(EffectType::SecretsRead, policy);
        assert!(matches!(
            PolicyGate::new(config),
            Err(PolicyError::InvalidOverride { .. })
        ));
    }
}

#[tokio::test]
async fn test_secrets_read_always_prompts_and_is_never_remembered() {
    let config = PolicyConfig {
        allowlists: PolicyLists {
            paths: vec!["/**".to_string()],
            commands: vec!["*".to_string()],
            domains: vec!["*".to_string()],
        },
        ..PolicyConfig::default()
    };
    let harness = GateHarness::new(config);

    for _ in 0..2 {
        let request = secrets_request();
        let id = request.id.clone();
        let submission = harness.gate.submit(request);
        assert!(submission.is_pending(), "secrets:read must never be auto-approved");

        let response = harness
            .gate
            .resolve_confirmation(&id, Verdict::approve_for(ConfirmationPolicy::Permanent))
            .unwrap();
        assert!(response.approved);
        assert_eq!(response.approval_type, Some(ConfirmationPolicy::Always));
    }
    assert!(harness.gate.grants().list().is_empty());
}

// ----------------------------------------------------------------------------
// Confirmation slots
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_identical_requests_share_one_prompt() {
    let harness = GateHarness::with_defaults();
    let first = fs_write_request("/ws/a.txt", "one");
    let second = fs_write_request("/ws/a.txt", "two");
    let first_id = first.id.clone();

    let Submission::Pending(first_handle) = harness.gate.submit(first) else {
        panic!("fs:write should await confirmation");
    };
    let Submission::Pending(second_handle) = harness.gate.submit(second) else {
        panic!("fs:write should await confirmation");
    };
    assert_eq!(harness.gate.pending_count(), 2);
    assert_eq!(harness.gate.pending_confirmations().len(), 1);

    harness.presenter.wait_for_prompt().await;
    harness
        .gate
        .resolve_confirmation(&first_id, Verdict::approve())
        .unwrap();

    let (a, b) = tokio::join!(first_handle.wait(), second_handle.wait());
    assert!(a.approved && b.approved);
    assert_eq!(harness.presenter.confirmations().len(), 1);
    assert_eq!(harness.gate.pending_count(), 0);
}

#[tokio::test]
async fn test_resolving_twice_returns_the_recorded_response() {
    let harness = GateHarness::with_defaults();
    let request = fs_write_request("/ws/b.txt", "x");
    let id = request.id.clone();
    harness.gate.submit(request);

    let first = harness.gate.resolve_confirmation(&id, Verdict::deny("no")).unwrap();
    let second = harness.gate.resolve_confirmation(&id, Verdict::approve()).unwrap();
    assert_eq!(first, second);
    assert!(!second.approved);

    assert!(matches!(
        harness.gate.resolve_confirmation("never-seen", Verdict::approve()),
        Err(PolicyError::UnknownRequest(_))
    ));
}

#[tokio::test]
async fn test_redelivered_request_gets_the_same_response() {
    let harness = GateHarness::with_defaults();
    let request = fs_read_request("/ws/c.txt").with_id("fixed-id");

    let first = harness.gate.submit(request.clone()).response().await;
    let second = harness.gate.submit(request).response().await;
    assert_eq!(first, second);

    let decisions = harness
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e.action, AuditAction::EffectDecision { .. }))
        .count();
    assert_eq!(decisions, 1);
}

// ----------------------------------------------------------------------------
// Deadlines and cancellation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unanswered_confirmation_times_out() {
    let harness = GateHarness::with_defaults();
    let request = shell_request("make", &["install"]);

    let submission = harness
        .gate
        .submit_with_deadline(request, Some(Duration::from_millis(50)));
    let response = submission.response().await;

    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::Timeout));
    assert_eq!(harness.gate.pending_count(), 0);
}

#[tokio::test]
async fn test_cancelling_a_task_resolves_only_its_requests() {
    let harness = GateHarness::new(PolicyConfig::default().with_confirmation_timeout(None));
    let doomed = shell_request("cargo", &["publish"]).with_task("task-1");
    let survivor = shell_request("git", &["push"]).with_task("task-2");
    let survivor_id = survivor.id.clone();

    let Submission::Pending(doomed_handle) = harness.gate.submit(doomed) else {
        panic!("expected pending");
    };
    harness.gate.submit(survivor);

    assert_eq!(harness.gate.cancel_task("task-1"), 1);
    let response = doomed_handle.wait().await;
    assert_eq!(response.denial_code, Some(DenialCode::Timeout));

    assert_eq!(harness.gate.pending_count(), 1);
    assert!(harness.gate.response_for(&survivor_id).is_none());
    assert_eq!(harness.gate.cancel_task("task-1"), 0);
}

// ----------------------------------------------------------------------------
// Grants
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_session_grant_covers_repeat_requests_until_session_ends() {
    let harness = GateHarness::with_defaults();
    let first = network_request("https://api.example.com/v1/items");
    let id = first.id.clone();
    harness.gate.submit(first);

    let response = harness
        .gate
        .resolve_confirmation(&id, Verdict::approve_for(ConfirmationPolicy::Session))
        .unwrap();
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Session));

    let repeat = harness
        .gate
        .submit(network_request("https://API.example.com/v1/items"));
    let repeat = repeat.decided().cloned().expect("grant should decide");
    assert!(repeat.approved);
    assert_eq!(repeat.approval_type, Some(ConfirmationPolicy::Session));

    assert_eq!(harness.gate.end_session(), 1);
    assert!(
        harness
            .gate
            .submit(network_request("https://api.example.com/v1/items"))
            .is_pending()
    );
}

#[tokio::test]
async fn test_revoked_grant_prompts_again() {
    let harness = GateHarness::with_defaults();
    let first = shell_read_request("git", &["status"]);
    let id = first.id.clone();
    harness.gate.submit(first);
    harness
        .gate
        .resolve_confirmation(&id, Verdict::approve_for(ConfirmationPolicy::Permanent))
        .unwrap();

    let repeat = harness.gate.submit(shell_read_request("git", &["status"]));
    assert!(repeat.decided().is_some_and(|r| r.approved));

    let key = GrantKey::new(EffectType::ShellRead, "git status");
    assert!(harness.gate.revoke_grant(&key).unwrap());
    assert!(!harness.gate.revoke_grant(&key).unwrap());
    assert!(
        harness
            .gate
            .submit(shell_read_request("git", &["status"]))
            .is_pending()
    );

    let actions: Vec<AuditAction> = harness
        .audit
        .entries()
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.iter().any(|a| matches!(a, AuditAction::GrantRecorded { .. })));
    assert!(actions.iter().any(|a| matches!(a, AuditAction::GrantRevoked { .. })));
}

// ----------------------------------------------------------------------------
// Lists, scope and rate limits
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_hardened_blocklist_denies_before_prompting() {
    let harness = GateHarness::new(PolicyConfig::hardened());

    let response = harness
        .gate
        .submit(shell_request("rm", &["-rf", "/"]))
        .response()
        .await;
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));

    let response = harness
        .gate
        .submit(shell_request("sudo", &["reboot"]))
        .response()
        .await;
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
    assert!(harness.presenter.prompts().is_empty());
}

#[tokio::test]
async fn test_workspace_roots_confine_file_access() {
    let harness = GateHarness::new(PolicyConfig::default().with_workspace_roots(["/ws"]));

    let inside = harness.gate.submit(fs_read_request("/ws/src/main.rs"));
    assert!(inside.decided().is_some_and(|r| r.approved));

    let outside = harness.gate.submit(fs_read_request("/etc/passwd"));
    let outside = outside.decided().cloned().unwrap();
    assert_eq!(outside.denial_code, Some(DenialCode::ScopeViolation));

    let escape = harness.gate.submit(fs_read_request("/ws/../etc/passwd"));
    let escape = escape.decided().cloned().unwrap();
    assert_eq!(escape.denial_code, Some(DenialCode::ScopeViolation));
}

#[tokio::test]
async fn test_rate_limit_applies_per_producer() {
    let config = PolicyConfig {
        rate_limit: RateLimitConfig::per(2, Duration::from_secs(60)),
        ..PolicyConfig::default()
    };
    let harness = GateHarness::new(config);

    for _ in 0..2 {
        let response = harness.gate.submit(fs_read_request("/ws/a")).response().await;
        assert!(response.approved);
    }
    let limited = harness.gate.submit(fs_read_request("/ws/a")).response().await;
    assert_eq!(limited.denial_code, Some(DenialCode::RateLimited));

    let other = fs_read_request("/ws/a").with_source_id("toolpack-b");
    let response = harness.gate.submit(other).response().await;
    assert!(response.approved);
}

#[tokio::test]
async fn test_malformed_request_is_blocked() {
    let harness = GateHarness::with_defaults();
    let request = EffectRequest::new(
        EffectType::FilesystemRead,
        EffectSource::Agent,
        EffectPayload::default(),
    );

    let response = harness.gate.submit(request).response().await;
    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
}

// ----------------------------------------------------------------------------
// Audit trail
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_every_decision_lands_in_a_valid_chain() {
    let harness = GateHarness::with_defaults();
    harness.gate.submit(fs_read_request("/ws/readme.md"));

    let request = shell_request("ls", &["-la"]);
    let id = request.id.clone();
    harness.gate.submit(request);
    harness.gate.resolve_confirmation(&id, Verdict::approve()).unwrap();

    let entries = harness.audit.entries().unwrap();
    let decisions: Vec<Decision> = entries
        .iter()
        .filter_map(|e| match &e.action {
            AuditAction::EffectDecision { decision, .. } => Some(*decision),
            _ => None,
        })
        .collect();
    assert_eq!(
        decisions,
        vec![Decision::Approved, Decision::Pending, Decision::Approved]
    );

    let verification = harness.audit.verify_chain().unwrap();
    assert!(verification.valid);
    assert_eq!(verification.entries_checked, entries.len());
}
