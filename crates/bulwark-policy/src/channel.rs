//! Request/response channel between effect producers and the gate.
//!
//! Producers talk to a [`GateService`] task through a cloneable
//! [`GateClient`]. Messages on the wire are JSON [`ChannelMessage`]s tagged by
//! `type`; field names are camelCase.

use bulwark_core::DenialCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PolicyError, PolicyResult};
use crate::gate::PolicyGate;
use crate::request::{ConfirmationPrompt, EffectRequest, EffectResponse, Verdict};

/// Default command buffer for [`GateService::spawn`].
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// A message on the effect channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChannelMessage {
    /// Producer to gate.
    EffectRequest(EffectRequest),
    /// Gate to producer; exactly one per request id.
    EffectResponse(EffectResponse),
    /// Gate to decision provider.
    ConfirmationRequired(ConfirmationPrompt),
    /// Decision provider to gate.
    ConfirmationVerdict {
        /// Request being decided.
        request_id: String,
        /// The decision.
        verdict: Verdict,
    },
}

/// Decode a JSON effect request.
///
/// Anything that does not decode (bad JSON, unknown effect type, wrong field
/// types) is answered with a `policy_blocked` response carrying the request
/// id when one can be recovered.
///
/// # Errors
///
/// Returns the denial response for undecodable input.
pub fn decode_request(raw: &str) -> Result<EffectRequest, EffectResponse> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        EffectResponse::deny(
            String::new(),
            DenialCode::PolicyBlocked,
            format!("malformed request: {e}"),
        )
    })?;
    let request_id = value
        .get("id")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "undecodable effect request");
        EffectResponse::deny(
            request_id,
            DenialCode::PolicyBlocked,
            format!("malformed request: {e}"),
        )
    })
}

enum GateCommand {
    Submit {
        request: EffectRequest,
        deadline: Option<Duration>,
        reply: oneshot::Sender<EffectResponse>,
    },
    Resolve {
        request_id: String,
        verdict: Verdict,
        reply: oneshot::Sender<PolicyResult<EffectResponse>>,
    },
    CancelTask {
        task_id: String,
        reply: oneshot::Sender<usize>,
    },
}

/// Task that serializes channel traffic into a [`PolicyGate`].
#[derive(Debug)]
pub struct GateService;

impl GateService {
    /// Spawn the service on the current runtime.
    ///
    /// Requests are submitted to the gate in arrival order; awaiting their
    /// confirmations happens off the service loop, so one slow human does not
    /// block other producers.
    #[must_use]
    pub fn spawn(gate: PolicyGate, buffer: usize) -> (GateClient, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(buffer.max(1));
        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    GateCommand::Submit {
                        request,
                        deadline,
                        reply,
                    } => {
                        let deadline = deadline.or(gate.config().confirmation_timeout);
                        let submission = gate.submit_with_deadline(request, deadline);
                        tokio::spawn(async move {
                            let _ = reply.send(submission.response().await);
                        });
                    },
                    GateCommand::Resolve {
                        request_id,
                        verdict,
                        reply,
                    } => {
                        let _ = reply.send(gate.resolve_confirmation(&request_id, verdict));
                    },
                    GateCommand::CancelTask { task_id, reply } => {
                        let _ = reply.send(gate.cancel_task(&task_id));
                    },
                }
            }
            tracing::debug!("gate service stopped: all clients dropped");
        });
        (GateClient { tx }, handle)
    }
}

/// Producer-side handle to a [`GateService`].
#[derive(Debug, Clone)]
pub struct GateClient {
    tx: mpsc::Sender<GateCommand>,
}

impl std::fmt::Debug for GateCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit { request, .. } => write!(f, "Submit({})", request.id),
            Self::Resolve { request_id, .. } => write!(f, "Resolve({request_id})"),
            Self::CancelTask { task_id, .. } => write!(f, "CancelTask({task_id})"),
        }
    }
}

impl GateClient {
    /// Submit a request and await its response.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ChannelClosed`] if the service has stopped.
    pub async fn submit(&self, request: EffectRequest) -> PolicyResult<EffectResponse> {
        self.submit_with_deadline(request, None).await
    }

    /// Submit with a caller-supplied confirmation deadline.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ChannelClosed`] if the service has stopped.
    pub async fn submit_with_deadline(
        &self,
        request: EffectRequest,
        deadline: Option<Duration>,
    ) -> PolicyResult<EffectResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::Submit {
            request,
            deadline,
            reply,
        })
        .await?;
        rx.await.map_err(|_| PolicyError::ChannelClosed)
    }

    /// Submit a JSON request and return the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ChannelClosed`] if the service has stopped, or
    /// [`PolicyError::Serialization`] if the response cannot be encoded.
    pub async fn submit_json(&self, raw: &str) -> PolicyResult<String> {
        let response = match decode_request(raw) {
            Ok(request) => self.submit(request).await?,
            Err(denial) => denial,
        };
        serde_json::to_string(&response).map_err(|e| PolicyError::Serialization(e.to_string()))
    }

    /// Deliver a human verdict.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownRequest`] for ids the gate has never
    /// seen, or [`PolicyError::ChannelClosed`] if the service has stopped.
    pub async fn resolve(
        &self,
        request_id: impl Into<String>,
        verdict: Verdict,
    ) -> PolicyResult<EffectResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::Resolve {
            request_id: request_id.into(),
            verdict,
            reply,
        })
        .await?;
        rx.await.map_err(|_| PolicyError::ChannelClosed)?
    }

    /// Deny every pending confirmation raised by a task.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ChannelClosed`] if the service has stopped.
    pub async fn cancel_task(&self, task_id: impl Into<String>) -> PolicyResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::CancelTask {
            task_id: task_id.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| PolicyError::ChannelClosed)
    }

    /// Handle an inbound channel message.
    ///
    /// Requests and verdicts produce an `effect_response`; other message kinds
    /// are gate output and yield `None`.
    ///
    /// # Errors
    ///
    /// See [`GateClient::submit`] and [`GateClient::resolve`].
    pub async fn handle(&self, message: ChannelMessage) -> PolicyResult<Option<ChannelMessage>> {
        match message {
            ChannelMessage::EffectRequest(request) => {
                let response = self.submit(request).await?;
                Ok(Some(ChannelMessage::EffectResponse(response)))
            },
            ChannelMessage::ConfirmationVerdict {
                request_id,
                verdict,
            } => {
                let response = self.resolve(request_id, verdict).await?;
                Ok(Some(ChannelMessage::EffectResponse(response)))
            },
            ChannelMessage::EffectResponse(_) | ChannelMessage::ConfirmationRequired(_) => Ok(None),
        }
    }

    async fn send(&self, command: GateCommand) -> PolicyResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| PolicyError::ChannelClosed)
    }
}
