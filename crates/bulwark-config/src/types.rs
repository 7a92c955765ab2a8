//! Configuration types for Bulwark.
//!
//! Effect types, policies and strategies are kept as their wire strings here
//! and checked by [`crate::validate`]; conversion into the gate and shadow
//! types happens at the integration boundary. Every struct implements
//! [`Default`] so that a bare `[section]` header produces a working
//! configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Policy gate settings.
    pub policy: PolicySection,
    /// Shadow staging and apply settings.
    pub shadow: ShadowSection,
    /// Audit log location.
    pub audit: AuditSection,
    /// Logging level, format and output.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Standing policy applied by the gate to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Roots every filesystem target must live under. Empty means unrestricted.
    pub workspace_roots: Vec<String>,
    /// Effect types denied outright.
    pub denied_effects: Vec<String>,
    /// Seconds a confirmation may stay pending.
    pub confirmation_timeout_secs: u64,
    /// Lifetime of session grants in seconds. `0` keeps them until the session ends.
    pub session_grant_ttl_secs: u64,
    /// Notify the presenter of auto-approved requests too.
    pub notify_auto_approvals: bool,
    /// Decided responses remembered for idempotent redelivery.
    pub response_cache_capacity: usize,
    /// JSON file for permanent grants. Unset keeps them in memory.
    pub grants_path: Option<String>,
    /// Effect type name to policy name.
    pub overrides: BTreeMap<String, String>,
    /// Targets approved without confirmation.
    pub allowlists: ListsSection,
    /// Targets denied outright.
    pub blocklists: ListsSection,
    /// Per-producer request rate limit.
    pub rate_limit: RateLimitSection,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            workspace_roots: Vec::new(),
            denied_effects: Vec::new(),
            confirmation_timeout_secs: 300,
            session_grant_ttl_secs: 8 * 60 * 60,
            notify_auto_approvals: false,
            response_cache_capacity: 10_000,
            grants_path: None,
            overrides: BTreeMap::new(),
            allowlists: ListsSection::default(),
            blocklists: ListsSection::default(),
            rate_limit: RateLimitSection::default(),
        }
    }
}

/// Command, domain and path pattern lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListsSection {
    /// Command patterns.
    pub commands: Vec<String>,
    /// Domain patterns (`*.example.com` matches subdomains).
    pub domains: Vec<String>,
    /// Path globs or prefixes.
    pub paths: Vec<String>,
}

impl ListsSection {
    /// Whether all three lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.domains.is_empty() && self.paths.is_empty()
    }
}

/// Sliding-window rate limit. `max_requests = 0` disables limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: 0,
            window_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Shadow
// ---------------------------------------------------------------------------

/// Shadow staging and apply settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSection {
    /// Shadow root directory. Defaults to `{workspace}/.bulwark/shadow`.
    pub root: Option<String>,
    /// Back up live files before apply.
    pub create_backup: bool,
    /// Suffix appended to the live path for backups.
    pub backup_suffix: String,
    /// Seconds an apply may run before it is abandoned.
    pub apply_timeout_secs: u64,
    /// Age in hours after which terminal shadows are cleaned up.
    pub cleanup_max_age_hours: u64,
    /// `abort`, `merge` or `force`.
    pub conflict_strategy: String,
}

impl Default for ShadowSection {
    fn default() -> Self {
        Self {
            root: None,
            create_backup: true,
            backup_suffix: ".bak".to_owned(),
            apply_timeout_secs: 30,
            cleanup_max_age_hours: 24 * 7,
            conflict_strategy: "abort".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Audit log storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// JSON-lines audit file. Defaults to `{workspace}/.bulwark/audit.jsonl`.
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    /// `stdout`, `stderr` or `file`.
    pub target: String,
    /// Log directory when `target = "file"`.
    pub directory: Option<String>,
    /// Extra filter directives (e.g. `bulwark_policy=debug`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: None,
            directives: Vec::new(),
        }
    }
}
