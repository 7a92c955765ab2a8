//! Effect request, response and verdict types.
//!
//! Wire field names are camelCase. A request is immutable once created;
//! the gate only ever reads it.

use bulwark_core::{
    ConfirmationPolicy, DenialCode, EffectSource, EffectType, RiskScore, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::scope::EffectScope;

/// Effect-specific arguments. Which fields are required depends on the
/// effect type (see [`EffectRequest::target`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectPayload {
    /// Filesystem target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Content to write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Filesystem operation (`create`, `modify`, `delete`, `rename`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Shell command (program, or full command line).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Shell arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Working directory for the command, and base for relative paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Network target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// HTTP headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Requested run time, checked against the scope's time ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Human-readable summary shown in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Why the agent wants the effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectContext {
    /// Originating task; cancelling it resolves its pending confirmations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Tool that produced the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Model-provided rationale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// A declared side effect awaiting authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRequest {
    /// Correlation id; exactly one response is produced per id.
    pub id: String,
    /// Creation time.
    pub timestamp: Timestamp,
    /// Kind of effect.
    pub effect_type: EffectType,
    /// Producer class.
    pub source: EffectSource,
    /// Producer instance (toolpack or skill id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Effect arguments.
    #[serde(default)]
    pub payload: EffectPayload,
    /// Why.
    #[serde(default)]
    pub context: EffectContext,
    /// Constraints the producer asks to be evaluated under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<EffectScope>,
}

impl EffectRequest {
    /// Create a request with a fresh id and the current time.
    #[must_use]
    pub fn new(effect_type: EffectType, source: EffectSource, payload: EffectPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Timestamp::now(),
            effect_type,
            source,
            source_id: None,
            payload,
            context: EffectContext::default(),
            scope: None,
        }
    }

    /// Set the request id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the producer instance id.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Set the originating task.
    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.context.task_id = Some(task_id.into());
        self
    }

    /// Set the rationale.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.context.reasoning = Some(reasoning.into());
        self
    }

    /// Set the request scope.
    #[must_use]
    pub fn with_scope(mut self, scope: EffectScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Resolve the concrete target named by the payload.
    ///
    /// # Errors
    ///
    /// Returns a message describing the missing or malformed field.
    pub fn target(&self) -> Result<EffectTarget, String> {
        if self.id.trim().is_empty() {
            return Err("request id is empty".to_string());
        }
        match self.effect_type {
            EffectType::FilesystemRead | EffectType::FilesystemWrite => {
                let raw = non_empty(self.payload.path.as_deref())
                    .ok_or_else(|| format!("{} requires payload.path", self.effect_type))?;
                let base = self.payload.cwd.as_deref().map(Path::new);
                Ok(EffectTarget::Path(resolve_path(Path::new(raw), base)))
            },
            EffectType::ShellRead | EffectType::ShellWrite => {
                let command = non_empty(self.payload.command.as_deref())
                    .ok_or_else(|| format!("{} requires payload.command", self.effect_type))?;
                let args = self.payload.args.as_deref().unwrap_or_default();
                Ok(EffectTarget::Command(CommandLine::new(command, args)))
            },
            EffectType::NetworkOutbound => {
                let raw = non_empty(self.payload.url.as_deref())
                    .ok_or_else(|| format!("{} requires payload.url", self.effect_type))?;
                let url = url::Url::parse(raw).map_err(|e| format!("invalid url '{raw}': {e}"))?;
                if url.host_str().is_none_or(str::is_empty) {
                    return Err(format!("url '{raw}' has no host"));
                }
                Ok(EffectTarget::Url(url))
            },
            EffectType::CodeExecute
            | EffectType::CodeExecuteSandbox
            | EffectType::KnowledgeRead
            | EffectType::KnowledgeUpdate
            | EffectType::SecretsRead
            | EffectType::ScreenCapture
            | EffectType::UiControl => Ok(EffectTarget::Unscoped),
        }
    }

    /// The actor recorded in audit entries.
    #[must_use]
    pub fn actor(&self) -> String {
        match &self.source_id {
            Some(id) => format!("{}:{id}", self.source),
            None => self.source.to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Lexically normalize `path`, joining it onto `base` when relative.
///
/// `.` components are dropped. `..` components are kept so the scope
/// evaluator can reject them.
#[must_use]
pub fn resolve_path(path: &Path, base: Option<&Path>) -> PathBuf {
    let joined = match base {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// A shell command split into program and full line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// First word of the command line.
    pub program: String,
    /// Whitespace-collapsed command line including arguments.
    pub line: String,
}

impl CommandLine {
    /// Build from a command (possibly containing arguments) and extra args.
    #[must_use]
    pub fn new(command: &str, args: &[String]) -> Self {
        let line = command
            .split_whitespace()
            .chain(args.iter().flat_map(|a| a.split_whitespace()))
            .collect::<Vec<_>>()
            .join(" ");
        let program = line.split(' ').next().unwrap_or_default().to_string();
        Self { program, line }
    }

    /// The simple commands making up the line, split on `;`, `&&`, `||` and `|`.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = self.line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ';' | '\n' => flush_segment(&mut segments, &mut current),
                '&' if chars.peek() == Some(&'&') => {
                    chars.next();
                    flush_segment(&mut segments, &mut current);
                },
                '|' => {
                    if chars.peek() == Some(&'|') {
                        chars.next();
                    }
                    flush_segment(&mut segments, &mut current);
                },
                _ => current.push(c),
            }
        }
        flush_segment(&mut segments, &mut current);
        segments
    }
}

fn flush_segment(segments: &mut Vec<String>, current: &mut String) {
    let trimmed = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !trimmed.is_empty() {
        segments.push(trimmed);
    }
    current.clear();
}

/// The concrete thing an effect acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectTarget {
    /// A filesystem path (lexically normalized).
    Path(PathBuf),
    /// A shell command.
    Command(CommandLine),
    /// A network endpoint.
    Url(url::Url),
    /// The effect has no scoped target.
    Unscoped,
}

impl EffectTarget {
    /// Normalized string used to key grants and pending slots.
    #[must_use]
    pub fn normalized(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Command(c) => c.line.clone(),
            Self::Url(u) => {
                let host = u.host_str().unwrap_or_default().to_ascii_lowercase();
                match u.port() {
                    Some(port) => format!("{}://{host}:{port}{}", u.scheme(), u.path()),
                    None => format!("{}://{host}{}", u.scheme(), u.path()),
                }
            },
            Self::Unscoped => "*".to_string(),
        }
    }
}

impl fmt::Display for EffectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// The one response produced for a request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectResponse {
    /// The request being answered.
    pub request_id: String,
    /// Whether the effect may proceed.
    pub approved: bool,
    /// How long the approval is remembered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_type: Option<ConfirmationPolicy>,
    /// When a remembered approval lapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// Human-readable denial reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    /// Machine-readable denial code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_code: Option<DenialCode>,
    /// The effective (intersected) scope, when it differs from the request's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_scope: Option<EffectScope>,
}

impl EffectResponse {
    /// An approval.
    #[must_use]
    pub fn approve(request_id: impl Into<String>, approval_type: ConfirmationPolicy) -> Self {
        Self {
            request_id: request_id.into(),
            approved: true,
            approval_type: Some(approval_type),
            expires_at: None,
            denial_reason: None,
            denial_code: None,
            modified_scope: None,
        }
    }

    /// A denial.
    #[must_use]
    pub fn deny(request_id: impl Into<String>, code: DenialCode, reason: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            approved: false,
            approval_type: None,
            expires_at: None,
            denial_reason: Some(reason.into()),
            denial_code: Some(code),
            modified_scope: None,
        }
    }

    /// Attach an expiry.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Option<Timestamp>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Attach the effective scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Option<EffectScope>) -> Self {
        self.modified_scope = scope;
        self
    }
}

/// A human decision on a pending confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    /// Whether the human approved.
    pub approved: bool,
    /// How long to remember an approval; defaults to the effect's policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_type: Option<ConfirmationPolicy>,
    /// Optional explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    /// Approve using the effect's policy.
    #[must_use]
    pub fn approve() -> Self {
        Self {
            approved: true,
            approval_type: None,
            reason: None,
        }
    }

    /// Approve and remember for the given duration.
    #[must_use]
    pub fn approve_for(approval_type: ConfirmationPolicy) -> Self {
        Self {
            approved: true,
            approval_type: Some(approval_type),
            reason: None,
        }
    }

    /// Deny with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            approval_type: None,
            reason: Some(reason.into()),
        }
    }
}

/// What a decision provider is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPrompt {
    /// Id to pass to `resolve_confirmation`.
    pub request_id: String,
    /// The full request.
    pub request: EffectRequest,
    /// Risk score from the policy table.
    pub risk_score: RiskScore,
    /// Effective policy.
    pub policy: ConfirmationPolicy,
    /// Whether a verdict is required (false for informational notices).
    pub requires_confirmation: bool,
    /// One-line summary.
    pub description: String,
    /// The normalized target.
    pub details: String,
}

impl ConfirmationPrompt {
    /// Build a prompt for `request`.
    #[must_use]
    pub fn new(
        request: &EffectRequest,
        target: &EffectTarget,
        risk_score: RiskScore,
        policy: ConfirmationPolicy,
        requires_confirmation: bool,
    ) -> Self {
        let description = request
            .payload
            .description
            .clone()
            .or_else(|| request.context.reasoning.clone())
            .unwrap_or_else(|| format!("{} requested by {}", request.effect_type, request.actor()));
        Self {
            request_id: request.id.clone(),
            request: request.clone(),
            risk_score,
            policy,
            requires_confirmation,
            description,
            details: target.normalized(),
        }
    }
}
