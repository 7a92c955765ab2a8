use super::*;
use crate::config::PolicyLists;
use crate::presenter::ChannelPresenter;
use crate::rate::RateLimitConfig;
use crate::request::EffectPayload;
use bulwark_core::EffectSource;
use tokio::sync::mpsc::UnboundedReceiver;

fn gate_with(config: PolicyConfig) -> (PolicyGate, UnboundedReceiver<ConfirmationPrompt>) {
    let (presenter, rx) = ChannelPresenter::new();
    let gate = PolicyGate::builder(config)
        .presenter(Arc::new(presenter))
        .build()
        .unwrap();
    (gate, rx)
}

fn gate() -> (PolicyGate, UnboundedReceiver<ConfirmationPrompt>) {
    gate_with(PolicyConfig::default())
}

fn request(effect_type: EffectType, payload: EffectPayload) -> EffectRequest {
    EffectRequest::new(effect_type, EffectSource::Agent, payload)
}

fn read(path: &str) -> EffectRequest {
    request(
        EffectType::FilesystemRead,
        EffectPayload {
            path: Some(path.to_string()),
            ..Default::default()
        },
    )
}

fn shell(effect_type: EffectType, command: &str) -> EffectRequest {
    request(
        effect_type,
        EffectPayload {
            command: Some(command.to_string()),
            ..Default::default()
        },
    )
}

fn fetch(url: &str) -> EffectRequest {
    request(
        EffectType::NetworkOutbound,
        EffectPayload {
            url: Some(url.to_string()),
            ..Default::default()
        },
    )
}

async fn next_prompt(rx: &mut UnboundedReceiver<ConfirmationPrompt>) -> ConfirmationPrompt {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

async fn assert_no_prompt(rx: &mut UnboundedReceiver<ConfirmationPrompt>) {
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err(), "no prompt expected");
}

fn pending(submission: Submission) -> PendingHandle {
    match submission {
        Submission::Pending(handle) => handle,
        Submission::Decided(response) => panic!("expected pending, got {response:?}"),
    }
}

fn decided(submission: Submission) -> EffectResponse {
    match submission {
        Submission::Decided(response) => response,
        Submission::Pending(handle) => panic!("expected decision, got pending {}", handle.request_id()),
    }
}

// ---------------------------------------------------------------------------
// Immediate decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_never_policy_approves_without_prompt() {
    let (gate, mut rx) = gate();
    let response = decided(gate.submit(read("/ws/readme.md")));
    assert!(response.approved);
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Never));
    assert_no_prompt(&mut rx).await;
}

#[tokio::test]
async fn test_malformed_request_is_policy_blocked() {
    let (gate, _rx) = gate();
    let response = decided(gate.submit(request(
        EffectType::FilesystemWrite,
        EffectPayload::default(),
    )));
    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
    assert!(response.denial_reason.unwrap().contains("payload.path"));

    let response = decided(gate.submit(fetch("not a url")));
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
}

#[tokio::test]
async fn test_blocklist_wins_over_allowlist() {
    let mut config = PolicyConfig::hardened();
    config.allowlists = PolicyLists {
        commands: vec!["sudo".to_string()],
        ..Default::default()
    };
    let (gate, mut rx) = gate_with(config);
    let response = decided(gate.submit(shell(EffectType::ShellWrite, "sudo rm -rf /var")));
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
    assert_no_prompt(&mut rx).await;
}

#[tokio::test]
async fn test_denied_effect_type() {
    let config = PolicyConfig {
        denied_effects: vec![EffectType::ScreenCapture],
        ..PolicyConfig::default()
    };
    let (gate, _rx) = gate_with(config);
    let response = decided(gate.submit(request(
        EffectType::ScreenCapture,
        EffectPayload::default(),
    )));
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
}

#[tokio::test]
async fn test_scope_violation_reports_modified_scope() {
    let (gate, _rx) = gate_with(PolicyConfig::default().with_workspace_roots(["/ws"]));

    let response = decided(gate.submit(read("/home/user/.ssh/id_rsa")));
    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::ScopeViolation));
    assert_eq!(
        response.modified_scope.unwrap().workspace_paths,
        Some(vec!["/ws".to_string()])
    );

    let response = decided(gate.submit(read("/ws/src/lib.rs")));
    assert!(response.approved);
    assert!(response.modified_scope.is_some());
}

#[tokio::test]
async fn test_request_scope_cannot_widen_standing_scope() {
    let (gate, _rx) = gate_with(PolicyConfig::default().with_workspace_roots(["/ws/project"]));
    let wide = read("/ws/other/file").with_scope(EffectScope::workspace(["/ws"]));
    let response = decided(gate.submit(wide));
    assert_eq!(response.denial_code, Some(DenialCode::ScopeViolation));
}

#[tokio::test]
async fn test_allowlist_auto_approves() {
    let mut config = PolicyConfig::default();
    config.allowlists.commands = vec!["git".to_string()];
    let (gate, mut rx) = gate_with(config);

    let response = decided(gate.submit(shell(EffectType::ShellWrite, "git commit -m wip")));
    assert!(response.approved);
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Never));
    assert_no_prompt(&mut rx).await;

    assert!(gate
        .submit(shell(EffectType::ShellWrite, "git push && curl x"))
        .is_pending());
}

#[tokio::test]
async fn test_secrets_never_auto_approved_by_allowlist() {
    let mut config = PolicyConfig::default();
    config.allowlists.paths = vec!["*".to_string()];
    let (gate, _rx) = gate_with(config);
    let submission = gate.submit(request(EffectType::SecretsRead, EffectPayload::default()));
    assert!(submission.is_pending());
}

#[tokio::test]
async fn test_rate_limit() {
    let config = PolicyConfig {
        rate_limit: RateLimitConfig::per(2, Duration::from_secs(60)),
        ..PolicyConfig::default()
    };
    let (gate, _rx) = gate_with(config);
    assert!(decided(gate.submit(read("/ws/a"))).approved);
    assert!(decided(gate.submit(read("/ws/b"))).approved);
    let limited = decided(gate.submit(read("/ws/c")));
    assert_eq!(limited.denial_code, Some(DenialCode::RateLimited));

    let other = read("/ws/d").with_source_id("other");
    assert!(decided(gate.submit(other)).approved);
}

#[test]
fn test_invalid_override_rejected_at_build() {
    let config = PolicyConfig::default()
        .with_override(EffectType::SecretsRead, ConfirmationPolicy::Session);
    assert!(matches!(
        PolicyGate::new(config),
        Err(PolicyError::InvalidOverride { .. })
    ));
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_user_denial() {
    let (gate, mut rx) = gate();
    let handle = pending(gate.submit(shell(EffectType::ShellWrite, "rm -rf /")));

    let prompt = next_prompt(&mut rx).await;
    assert_eq!(prompt.request_id, handle.request_id());
    assert_eq!(prompt.policy, ConfirmationPolicy::Always);
    assert_eq!(prompt.risk_score.get(), 9);
    assert!(prompt.requires_confirmation);

    let resolved = gate
        .resolve_confirmation(handle.request_id(), Verdict::deny("too dangerous"))
        .unwrap();
    let response = handle.wait().await;
    assert_eq!(response, resolved);
    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::UserDenied));
    assert_eq!(response.denial_reason.as_deref(), Some("too dangerous"));
}

#[tokio::test]
async fn test_always_is_never_cached() {
    let (gate, _rx) = gate();
    let first = pending(gate.submit(shell(EffectType::ShellWrite, "make install")));
    let response = gate
        .resolve_confirmation(
            first.request_id(),
            Verdict::approve_for(ConfirmationPolicy::Permanent),
        )
        .unwrap();
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Always));
    assert!(gate.grants().list().is_empty());

    assert!(gate
        .submit(shell(EffectType::ShellWrite, "make install"))
        .is_pending());
}

#[tokio::test]
async fn test_once_does_not_cache() {
    let (gate, _rx) = gate();
    let first = pending(gate.submit(shell(EffectType::ShellRead, "ls -la")));
    let response = gate
        .resolve_confirmation(first.request_id(), Verdict::approve())
        .unwrap();
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Once));
    assert!(response.expires_at.is_none());

    assert!(gate.submit(shell(EffectType::ShellRead, "ls -la")).is_pending());
}

#[tokio::test]
async fn test_session_grant_auto_approves_identical_requests() {
    let (gate, mut rx) = gate();
    let first = pending(gate.submit(fetch("https://API.example.com/v1/items")));
    let response = gate
        .resolve_confirmation(
            first.request_id(),
            Verdict::approve_for(ConfirmationPolicy::Session),
        )
        .unwrap();
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Session));
    let expires_at = response.expires_at.unwrap();
    assert!(!expires_at.is_past());
    let _ = next_prompt(&mut rx).await;

    let again = decided(gate.submit(fetch("https://api.example.com/v1/items")));
    assert!(again.approved);
    assert_eq!(again.approval_type, Some(ConfirmationPolicy::Session));
    assert_eq!(again.expires_at, Some(expires_at));
    assert_no_prompt(&mut rx).await;

    assert!(gate.submit(fetch("https://api.example.com/v2")).is_pending());

    assert_eq!(gate.end_session(), 1);
    assert!(gate
        .submit(fetch("https://api.example.com/v1/items"))
        .is_pending());
}

#[tokio::test]
async fn test_permanent_grant_survives_session_end_until_revoked() {
    let config = PolicyConfig::default()
        .with_override(EffectType::ShellRead, ConfirmationPolicy::Permanent);
    let (gate, _rx) = gate_with(config);
    let first = pending(gate.submit(shell(EffectType::ShellRead, "cargo   test")));
    gate.resolve_confirmation(first.request_id(), Verdict::approve())
        .unwrap();

    assert_eq!(gate.end_session(), 0);
    let again = decided(gate.submit(shell(EffectType::ShellRead, "cargo test")));
    assert_eq!(again.approval_type, Some(ConfirmationPolicy::Permanent));
    assert!(again.expires_at.is_none());

    let key = GrantKey::new(EffectType::ShellRead, "cargo test");
    assert!(gate.revoke_grant(&key).unwrap());
    assert!(gate.submit(shell(EffectType::ShellRead, "cargo test")).is_pending());
}

#[tokio::test]
async fn test_secrets_verdict_clamped_to_always() {
    let (gate, _rx) = gate();
    let handle = pending(gate.submit(request(EffectType::SecretsRead, EffectPayload::default())));
    let response = gate
        .resolve_confirmation(
            handle.request_id(),
            Verdict::approve_for(ConfirmationPolicy::Session),
        )
        .unwrap();
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Always));
    assert!(gate.grants().list().is_empty());
}

#[tokio::test]
async fn test_identical_requests_share_one_confirmation() {
    let (gate, mut rx) = gate();
    let a = pending(gate.submit(shell(EffectType::ShellWrite, "npm publish")));
    let b = pending(gate.submit(shell(EffectType::ShellWrite, "npm  publish")));
    assert_ne!(a.request_id(), b.request_id());

    let prompt = next_prompt(&mut rx).await;
    assert_eq!(prompt.request_id, a.request_id());
    assert_no_prompt(&mut rx).await;
    assert_eq!(gate.pending_confirmations().len(), 1);
    assert_eq!(gate.pending_count(), 2);

    gate.resolve_confirmation(a.request_id(), Verdict::approve())
        .unwrap();
    let (ra, rb) = tokio::join!(a.wait(), b.wait());
    assert!(ra.approved);
    assert!(rb.approved);
    assert_eq!(gate.pending_count(), 0);
}

#[tokio::test]
async fn test_resolve_is_idempotent_and_rejects_unknown_ids() {
    let (gate, _rx) = gate();
    assert!(matches!(
        gate.resolve_confirmation("nope", Verdict::approve()),
        Err(PolicyError::UnknownRequest(_))
    ));

    let handle = pending(gate.submit(shell(EffectType::ShellWrite, "make")));
    let first = gate
        .resolve_confirmation(handle.request_id(), Verdict::deny("no"))
        .unwrap();
    let second = gate
        .resolve_confirmation(handle.request_id(), Verdict::approve())
        .unwrap();
    assert_eq!(first, second);
    assert!(!second.approved);
}

#[tokio::test]
async fn test_redelivery_returns_same_outcome() {
    let (gate, _rx) = gate();
    let request = read("/ws/a.txt").with_id("fixed-id");
    let first = decided(gate.submit(request.clone()));
    let second = decided(gate.submit(request));
    assert_eq!(first, second);

    let request = shell(EffectType::ShellWrite, "deploy").with_id("pending-id");
    let a = pending(gate.submit(request.clone()));
    let b = pending(gate.submit(request.clone()));
    assert_eq!(gate.pending_count(), 1);
    gate.resolve_confirmation("pending-id", Verdict::approve())
        .unwrap();
    assert_eq!(a.wait().await, b.wait().await);
    assert!(decided(gate.submit(request)).approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redelivery_yields_one_decision() {
    let audit = Arc::new(AuditLog::in_memory());
    let gate = PolicyGate::builder(PolicyConfig::default())
        .audit_log(Arc::clone(&audit))
        .build()
        .unwrap();
    let request = read("/ws/x").with_id("dup");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let gate = gate.clone();
            let request = request.clone();
            tokio::spawn(async move { gate.submit(request).response().await })
        })
        .collect();
    let mut responses = Vec::new();
    for task in tasks {
        responses.push(task.await.unwrap());
    }
    assert!(responses.windows(2).all(|w| w[0] == w[1]));

    let decisions = audit
        .entries()
        .unwrap()
        .into_iter()
        .filter(|e| matches!(&e.action, AuditAction::EffectDecision { request_id, .. } if request_id == "dup"))
        .count();
    assert_eq!(decisions, 1);
}

// ---------------------------------------------------------------------------
// Deadlines and cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_deadline_resolves_to_timeout() {
    let (gate, _rx) = gate();
    let submission = gate.submit_with_deadline(
        shell(EffectType::ShellWrite, "terraform apply"),
        Some(Duration::from_secs(30)),
    );
    let handle = pending(submission);
    let id = handle.request_id().to_string();

    let response = handle.wait().await;
    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::Timeout));

    let late = gate.resolve_confirmation(&id, Verdict::approve()).unwrap();
    assert_eq!(late, response, "a late verdict does not change the outcome");
}

#[tokio::test(start_paused = true)]
async fn test_expired_leader_hands_prompt_to_follower() {
    let (gate, mut rx) = gate_with(PolicyConfig::default().with_confirmation_timeout(None));
    let leader = pending(gate.submit_with_deadline(
        shell(EffectType::ShellWrite, "make release"),
        Some(Duration::from_secs(1)),
    ));
    let follower = pending(gate.submit(shell(EffectType::ShellWrite, "make release")));
    assert_eq!(next_prompt(&mut rx).await.request_id, leader.request_id());

    assert_eq!(leader.wait().await.denial_code, Some(DenialCode::Timeout));
    let promoted = next_prompt(&mut rx).await;
    assert_eq!(promoted.request_id, follower.request_id());

    gate.resolve_confirmation(follower.request_id(), Verdict::approve())
        .unwrap();
    assert!(follower.wait().await.approved);
}

#[tokio::test]
async fn test_cancel_task_denies_its_pending_requests() {
    let (gate, _rx) = gate();
    let mine = pending(gate.submit(shell(EffectType::ShellWrite, "a").with_task("task-1")));
    let also_mine = pending(gate.submit(fetch("https://x.dev").with_task("task-1")));
    let other = pending(gate.submit(shell(EffectType::ShellWrite, "b").with_task("task-2")));

    assert_eq!(gate.cancel_task("task-1"), 2);
    for handle in [mine, also_mine] {
        let response = handle.wait().await;
        assert_eq!(response.denial_code, Some(DenialCode::Timeout));
        assert_eq!(response.denial_reason.as_deref(), Some("task cancelled"));
    }
    assert!(other.try_response().is_none());
    assert_eq!(gate.pending_count(), 1);
}

#[tokio::test]
async fn test_dropped_gate_resolves_waiters() {
    let (gate, _rx) = gate_with(PolicyConfig::default().with_confirmation_timeout(None));
    let handle = pending(gate.submit(shell(EffectType::ShellWrite, "x")));
    drop(gate);
    assert_eq!(handle.wait().await.denial_code, Some(DenialCode::Timeout));
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_every_decision_is_audited() {
    let audit = Arc::new(AuditLog::in_memory());
    let gate = PolicyGate::builder(PolicyConfig::default())
        .audit_log(Arc::clone(&audit))
        .build()
        .unwrap();

    decided(gate.submit(read("/ws/a")));
    let handle = pending(gate.submit(fetch("https://example.com").with_source_id("web")));
    gate.resolve_confirmation(
        handle.request_id(),
        Verdict::approve_for(ConfirmationPolicy::Session),
    )
    .unwrap();

    let entries = audit.entries().unwrap();
    let decisions: Vec<(String, Decision)> = entries
        .iter()
        .filter_map(|e| match &e.action {
            AuditAction::EffectDecision { decision, .. } => Some((e.actor.clone(), *decision)),
            _ => None,
        })
        .collect();
    assert_eq!(
        decisions,
        vec![
            ("agent".to_string(), Decision::Approved),
            ("agent:web".to_string(), Decision::Pending),
            ("reviewer".to_string(), Decision::Approved),
        ]
    );
    assert!(entries
        .iter()
        .any(|e| matches!(e.action, AuditAction::GrantRecorded { .. })));
    assert!(audit.verify_chain().unwrap().valid);
}

#[tokio::test]
async fn test_auto_approval_notice_when_enabled() {
    let config = PolicyConfig {
        notify_auto_approvals: true,
        ..PolicyConfig::default()
    };
    let (gate, mut rx) = gate_with(config);
    decided(gate.submit(read("/ws/a")));
    let notice = next_prompt(&mut rx).await;
    assert!(!notice.requires_confirmation);
    assert!(gate.pending_confirmations().is_empty());
}
