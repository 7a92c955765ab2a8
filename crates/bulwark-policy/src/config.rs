//! Standing policy configuration for a gate.

use bulwark_core::{ConfirmationPolicy, EffectType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{PolicyError, PolicyResult};
use crate::rate::RateLimitConfig;
use crate::request::EffectTarget;
use crate::scope::{EffectScope, command_matches, domain_matches, path_matches};
use crate::taxonomy;

/// Default time a pending confirmation waits for a verdict (5 minutes).
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of a session grant (8 hours).
pub const DEFAULT_SESSION_GRANT_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Default number of decided responses kept for idempotent redelivery.
pub const DEFAULT_RESPONSE_CACHE: usize = 10_000;

/// Command, domain and path lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLists {
    /// Command patterns (see [`command_matches`]).
    #[serde(default)]
    pub commands: Vec<String>,
    /// Domain patterns (see [`domain_matches`]).
    #[serde(default)]
    pub domains: Vec<String>,
    /// Path globs or prefixes.
    #[serde(default)]
    pub paths: Vec<String>,
}

impl PolicyLists {
    /// Whether every list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.domains.is_empty() && self.paths.is_empty()
    }

    /// The first pattern matching `target`, if any.
    ///
    /// A command matches if any of its segments matches.
    #[must_use]
    pub fn find_match(&self, target: &EffectTarget) -> Option<String> {
        match target {
            EffectTarget::Path(path) => self.paths.iter().find(|p| path_matches(path, p)).cloned(),
            EffectTarget::Command(command) => command.segments().into_iter().find_map(|segment| {
                self.commands
                    .iter()
                    .find(|p| command_matches(&segment, p))
                    .cloned()
            }),
            EffectTarget::Url(url) => {
                let host = url.host_str().unwrap_or_default();
                self.domains.iter().find(|p| domain_matches(host, p)).cloned()
            },
            EffectTarget::Unscoped => None,
        }
    }

    /// Whether `target` is fully covered: every command segment, the host,
    /// or the path matches some entry.
    #[must_use]
    pub fn covers(&self, target: &EffectTarget) -> bool {
        match target {
            EffectTarget::Path(path) => self.paths.iter().any(|p| path_matches(path, p)),
            EffectTarget::Command(command) => {
                let segments = command.segments();
                !segments.is_empty()
                    && segments
                        .iter()
                        .all(|s| self.commands.iter().any(|p| command_matches(s, p)))
            },
            EffectTarget::Url(url) => {
                let host = url.host_str().unwrap_or_default();
                self.domains.iter().any(|p| domain_matches(host, p))
            },
            EffectTarget::Unscoped => false,
        }
    }
}

/// Gate configuration: overrides, lists, the standing scope and timing.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Per-effect replacements for the default policy.
    pub overrides: BTreeMap<EffectType, ConfirmationPolicy>,
    /// Targets approved without confirmation (never for `secrets:read`).
    pub allowlists: PolicyLists,
    /// Targets denied outright with `policy_blocked`.
    pub blocklists: PolicyLists,
    /// Effect types denied outright with `policy_blocked`.
    pub denied_effects: Vec<EffectType>,
    /// Caller scope intersected with every request's scope.
    pub scope: EffectScope,
    /// Default deadline for pending confirmations; `None` waits forever.
    pub confirmation_timeout: Option<Duration>,
    /// Lifetime of session grants; `None` lasts until `end_session`.
    pub session_grant_ttl: Option<Duration>,
    /// Per-producer request rate limit.
    pub rate_limit: RateLimitConfig,
    /// Decided responses kept for idempotent redelivery.
    pub response_cache_capacity: usize,
    /// Also notify the presenter of auto-approved requests.
    pub notify_auto_approvals: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            allowlists: PolicyLists::default(),
            blocklists: PolicyLists::default(),
            denied_effects: Vec::new(),
            scope: EffectScope::default(),
            confirmation_timeout: Some(DEFAULT_CONFIRMATION_TIMEOUT),
            session_grant_ttl: Some(DEFAULT_SESSION_GRANT_TTL),
            rate_limit: RateLimitConfig::disabled(),
            response_cache_capacity: DEFAULT_RESPONSE_CACHE,
            notify_auto_approvals: false,
        }
    }
}

impl PolicyConfig {
    /// Defaults plus a blocklist of destructive commands and system paths.
    #[must_use]
    pub fn hardened() -> Self {
        Self {
            blocklists: default_blocklists(),
            ..Self::default()
        }
    }

    /// Restrict every request to the given workspace roots.
    #[must_use]
    pub fn with_workspace_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = self.scope.intersect(&EffectScope::workspace(roots));
        self
    }

    /// Override the policy for one effect type.
    #[must_use]
    pub fn with_override(mut self, effect_type: EffectType, policy: ConfirmationPolicy) -> Self {
        self.overrides.insert(effect_type, policy);
        self
    }

    /// Set the pending-confirmation deadline.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Check that every override is permitted by the taxonomy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidOverride`] for the first offending entry.
    pub fn validate(&self) -> PolicyResult<()> {
        for (&effect_type, &policy) in &self.overrides {
            if !taxonomy::is_permitted(effect_type, policy) {
                return Err(PolicyError::InvalidOverride {
                    effect_type: effect_type.to_string(),
                    policy: policy.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Policy in force for an effect type.
    #[must_use]
    pub fn effective_policy(&self, effect_type: EffectType) -> ConfirmationPolicy {
        self.overrides
            .get(&effect_type)
            .copied()
            .filter(|p| taxonomy::is_permitted(effect_type, *p))
            .unwrap_or_else(|| taxonomy::default_policy(effect_type))
    }

    /// Why the request is blocked outright, if it is.
    #[must_use]
    pub fn blocked_reason(&self, effect_type: EffectType, target: &EffectTarget) -> Option<String> {
        if self.denied_effects.contains(&effect_type) {
            return Some(format!("effect type {effect_type} is denied by policy"));
        }
        self.blocklists
            .find_match(target)
            .map(|pattern| format!("'{target}' matches blocklist entry '{pattern}'"))
    }
}

/// Destructive commands and system paths blocked by [`PolicyConfig::hardened`].
#[must_use]
pub fn default_blocklists() -> PolicyLists {
    PolicyLists {
        commands: [
            "rm -rf /",
            "rm -rf /*",
            "rm -rf ~",
            "sudo",
            "su",
            "mkfs",
            "dd",
            "chmod 777",
            "shutdown",
            "reboot",
            "init",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        domains: vec!["*.onion".to_string()],
        paths: ["/etc/**", "/boot/**", "/sys/**", "/proc/**", "/dev/**"]
            .into_iter()
            .map(String::from)
            .collect(),
    }
}
