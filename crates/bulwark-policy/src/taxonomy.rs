//! Static policy table over the closed effect taxonomy.
//!
//! Every [`EffectType`] has exactly one row: a default
//! [`ConfirmationPolicy`], a risk score, and the set of policies an
//! override or a verdict may select for it. All lookups are exhaustive
//! matches, so adding an effect type without a row fails to compile.

use bulwark_core::{ConfirmationPolicy, EffectType, RiskScore};
use serde::Serialize;

/// One row of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRow {
    /// The effect this row describes.
    pub effect_type: EffectType,
    /// Policy applied when no override is configured.
    pub default_policy: ConfirmationPolicy,
    /// Risk score (1-10).
    pub risk_score: RiskScore,
}

impl PolicyRow {
    /// Policies that may be configured or chosen for this effect.
    #[must_use]
    pub fn permitted_policies(&self) -> &'static [ConfirmationPolicy] {
        permitted_policies(self.effect_type)
    }
}

/// Default confirmation policy for an effect type.
#[must_use]
pub const fn default_policy(effect_type: EffectType) -> ConfirmationPolicy {
    use ConfirmationPolicy::{Always, Never, Once, Session};
    match effect_type {
        EffectType::FilesystemRead | EffectType::KnowledgeRead => Never,
        EffectType::ShellRead | EffectType::NetworkOutbound | EffectType::KnowledgeUpdate => Once,
        EffectType::CodeExecuteSandbox => Session,
        EffectType::FilesystemWrite
        | EffectType::ShellWrite
        | EffectType::CodeExecute
        | EffectType::SecretsRead
        | EffectType::ScreenCapture
        | EffectType::UiControl => Always,
    }
}

/// Risk score for an effect type.
#[must_use]
pub const fn risk_score(effect_type: EffectType) -> RiskScore {
    RiskScore::clamped(match effect_type {
        EffectType::KnowledgeRead => 1,
        EffectType::FilesystemRead => 2,
        EffectType::ShellRead => 3,
        EffectType::CodeExecuteSandbox | EffectType::KnowledgeUpdate => 4,
        EffectType::NetworkOutbound => 5,
        EffectType::ScreenCapture => 6,
        EffectType::FilesystemWrite => 7,
        EffectType::CodeExecute => 8,
        EffectType::ShellWrite => 9,
        EffectType::SecretsRead | EffectType::UiControl => 10,
    })
}

/// Policies an override or verdict may select for an effect type.
#[must_use]
pub const fn permitted_policies(effect_type: EffectType) -> &'static [ConfirmationPolicy] {
    const ANY: &[ConfirmationPolicy] = &ConfirmationPolicy::BY_STRICTNESS;
    const ALWAYS_ONLY: &[ConfirmationPolicy] = &[ConfirmationPolicy::Always];
    match effect_type {
        EffectType::SecretsRead => ALWAYS_ONLY,
        EffectType::FilesystemRead
        | EffectType::FilesystemWrite
        | EffectType::ShellRead
        | EffectType::ShellWrite
        | EffectType::NetworkOutbound
        | EffectType::CodeExecute
        | EffectType::CodeExecuteSandbox
        | EffectType::KnowledgeRead
        | EffectType::KnowledgeUpdate
        | EffectType::ScreenCapture
        | EffectType::UiControl => ANY,
    }
}

/// Whether `policy` may be selected for `effect_type`.
#[must_use]
pub fn is_permitted(effect_type: EffectType, policy: ConfirmationPolicy) -> bool {
    permitted_policies(effect_type).contains(&policy)
}

/// The row for one effect type.
#[must_use]
pub const fn row(effect_type: EffectType) -> PolicyRow {
    PolicyRow {
        effect_type,
        default_policy: default_policy(effect_type),
        risk_score: risk_score(effect_type),
    }
}

/// The full table, in taxonomy order.
#[must_use]
pub fn policy_table() -> Vec<PolicyRow> {
    EffectType::ALL.into_iter().map(row).collect()
}
