//! The JSON effect channel served by `GateService`.

use std::sync::Arc;

use bulwark_audit::AuditLog;
use bulwark_core::{ConfirmationPolicy, DenialCode};
use bulwark_policy::{
    ChannelMessage, ChannelPresenter, EffectResponse, GateService, PolicyConfig, PolicyError,
    PolicyGate, Verdict, channel::DEFAULT_CHANNEL_BUFFER,
};
use bulwark_test::prelude::*;
use serde_json::json;

fn spawn_gate() -> (
    bulwark_policy::GateClient,
    tokio::sync::mpsc::UnboundedReceiver<bulwark_policy::ConfirmationPrompt>,
    Arc<AuditLog>,
    tokio::task::JoinHandle<()>,
) {
    let (presenter, prompts) = ChannelPresenter::new();
    let audit = Arc::new(AuditLog::in_memory());
    let gate = PolicyGate::builder(PolicyConfig::default())
        .presenter(Arc::new(presenter))
        .audit_log(Arc::clone(&audit))
        .build()
        .unwrap();
    let (client, service) = GateService::spawn(gate, DEFAULT_CHANNEL_BUFFER);
    (client, prompts, audit, service)
}

#[tokio::test]
async fn test_json_request_round_trip() {
    let (client, _prompts, _audit, _service) = spawn_gate();
    let raw = json!({
        "id": "req-1",
        "timestamp": "2026-01-01T00:00:00Z",
        "effectType": "filesystem:read",
        "source": "agent",
        "payload": { "path": "/ws/readme.md" },
        "context": {}
    })
    .to_string();

    let reply = client.submit_json(&raw).await.unwrap();
    let response: EffectResponse = serde_json::from_str(&reply).unwrap();
    assert_eq!(response.request_id, "req-1");
    assert!(response.approved);
    assert_eq!(response.approval_type, Some(ConfirmationPolicy::Never));

    let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(value["requestId"], "req-1");
    assert_eq!(value["approvalType"], "never");
}

#[tokio::test]
async fn test_unknown_effect_type_is_blocked_with_its_id() {
    let (client, _prompts, _audit, _service) = spawn_gate();
    let raw = json!({
        "id": "req-2",
        "timestamp": "2026-01-01T00:00:00Z",
        "effectType": "teleport:anywhere",
        "source": "agent",
    })
    .to_string();

    let reply = client.submit_json(&raw).await.unwrap();
    let response: EffectResponse = serde_json::from_str(&reply).unwrap();
    assert_eq!(response.request_id, "req-2");
    assert!(!response.approved);
    assert_eq!(response.denial_code, Some(DenialCode::PolicyBlocked));
}

#[tokio::test]
async fn test_confirmation_flows_through_messages() {
    let (client, mut prompts, audit, _service) = spawn_gate();
    let request = shell_request("cargo", &["publish"]);
    let id = request.id.clone();

    let producer = {
        let client = client.clone();
        tokio::spawn(async move { client.handle(ChannelMessage::EffectRequest(request)).await })
    };

    let prompt = prompts.recv().await.unwrap();
    assert_eq!(prompt.request_id, id);
    let outbound = ChannelMessage::ConfirmationRequired(prompt);
    let encoded = serde_json::to_value(&outbound).unwrap();
    assert_eq!(encoded["type"], "confirmation_required");
    assert_eq!(encoded["requestId"], id.as_str());

    let verdict: ChannelMessage = serde_json::from_value(json!({
        "type": "confirmation_verdict",
        "requestId": id,
        "verdict": { "approved": true },
    }))
    .unwrap();
    let reply = client.handle(verdict).await.unwrap();
    assert!(matches!(reply, Some(ChannelMessage::EffectResponse(ref r)) if r.approved));

    let produced = producer.await.unwrap().unwrap();
    let Some(ChannelMessage::EffectResponse(response)) = produced else {
        panic!("expected an effect_response");
    };
    assert!(response.approved);
    assert_eq!(response.request_id, id);
    assert!(audit.verify_chain().unwrap().valid);
}

#[tokio::test]
async fn test_verdict_for_unknown_request_is_an_error() {
    let (client, _prompts, _audit, _service) = spawn_gate();
    let err = client.resolve("ghost", Verdict::approve()).await.unwrap_err();
    assert!(matches!(err, PolicyError::UnknownRequest(_)));
}

#[tokio::test]
async fn test_cancel_task_over_the_channel() {
    let (client, mut prompts, _audit, _service) = spawn_gate();
    let request = shell_request("make", &["deploy"]).with_task("t-9");

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.submit(request).await })
    };
    prompts.recv().await.unwrap();

    assert_eq!(client.cancel_task("t-9").await.unwrap(), 1);
    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.denial_code, Some(DenialCode::Timeout));
}

#[tokio::test]
async fn test_service_stops_when_clients_drop() {
    let (client, _prompts, _audit, service) = spawn_gate();
    let response = client.submit(fs_read_request("/ws/x")).await.unwrap();
    assert!(response.approved);

    drop(client);
    tokio::time::timeout(std::time::Duration::from_secs(5), service)
        .await
        .expect("service should stop")
        .unwrap();
}
