//! Audit entry types and actions.
//!
//! Every policy decision and every shadow state transition is recorded as
//! an audit entry. Entries are chain-linked: each carries the hash of the
//! entry before it.

use bulwark_core::{
    ConfirmationPolicy, ContentHash, DenialCode, EffectSource, EffectType, RiskScore, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    /// Create a new random entry ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audit:{}", self.0)
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: AuditEntryId,
    /// When this entry was created.
    pub timestamp: Timestamp,
    /// Who caused the entry: the effect source, `reviewer`, or `system`.
    pub actor: String,
    /// The action being audited.
    pub action: AuditAction,
    /// Hash of the previous entry (chain linking).
    pub previous_hash: ContentHash,
}

impl AuditEntry {
    /// Create a new entry linked to `previous_hash`.
    #[must_use]
    pub fn new(actor: impl Into<String>, action: AuditAction, previous_hash: ContentHash) -> Self {
        Self {
            id: AuditEntryId::new(),
            timestamp: Timestamp::now(),
            actor: actor.into(),
            action,
            previous_hash,
        }
    }

    /// The bytes covered by [`content_hash`](Self::content_hash).
    #[must_use]
    pub fn hashing_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(self.id.0.as_bytes());
        data.extend_from_slice(&self.timestamp.0.timestamp_micros().to_le_bytes());
        data.extend_from_slice(self.actor.as_bytes());
        data.push(0);
        // Action is serialized to JSON for consistent hashing
        if let Ok(action_json) = serde_json::to_vec(&self.action) {
            data.extend_from_slice(&action_json);
        }
        data.extend_from_slice(self.previous_hash.as_bytes());
        data
    }

    /// Compute the content hash of this entry.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::blake3(&self.hashing_data())
    }

    /// Check if this entry follows another (chain linking).
    #[must_use]
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        self.previous_hash == previous.content_hash()
    }
}

/// Outcome recorded for an effect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The effect may proceed.
    Approved,
    /// The effect was refused.
    Denied,
    /// The effect is waiting on a human verdict.
    Pending,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "denied"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Actions that can be audited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    /// The gate reached (or deferred) a decision on an effect request.
    EffectDecision {
        /// Correlating request id.
        request_id: String,
        /// Requested effect.
        effect_type: EffectType,
        /// Producer of the request.
        source: EffectSource,
        /// What was decided.
        decision: Decision,
        /// Human-readable reason.
        reason: Option<String>,
        /// Denial code for denied requests.
        denial_code: Option<DenialCode>,
        /// How long the approval is remembered, for approved requests.
        approval_type: Option<ConfirmationPolicy>,
        /// Risk score from the policy table.
        risk_score: RiskScore,
    },

    /// A session or permanent grant was cached.
    GrantRecorded {
        /// Effect the grant covers.
        effect_type: EffectType,
        /// Normalized target the grant covers.
        target: String,
        /// Grant lifetime.
        policy: ConfirmationPolicy,
    },

    /// A cached grant was revoked.
    GrantRevoked {
        /// Effect the grant covered.
        effect_type: EffectType,
        /// Normalized target the grant covered.
        target: String,
    },

    /// A shadow file changed state.
    ShadowTransition {
        /// Patch identifier.
        patch_id: String,
        /// Real path the shadow stages.
        path: String,
        /// Previous state, absent on proposal.
        from: Option<String>,
        /// New state.
        to: String,
        /// Optional detail (rejection reason, error).
        reason: Option<String>,
    },
}

impl AuditAction {
    /// Short description for log lines.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::EffectDecision {
                request_id,
                effect_type,
                decision,
                ..
            } => format!("{effect_type} {request_id}: {decision}"),
            Self::GrantRecorded {
                effect_type,
                target,
                policy,
            } => format!("grant {policy} for {effect_type} on {target}"),
            Self::GrantRevoked {
                effect_type,
                target,
            } => format!("revoked grant for {effect_type} on {target}"),
            Self::ShadowTransition {
                patch_id, from, to, ..
            } => match from {
                Some(from) => format!("shadow {patch_id}: {from} -> {to}"),
                None => format!("shadow {patch_id}: {to}"),
            },
        }
    }
}
