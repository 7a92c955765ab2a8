//! Bridge from `bulwark_config::Config` to domain types.
//!
//! Config values stay as plain strings and integers; this is the one place
//! they are parsed into gate, shadow and logging types.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use bulwark_config::{Config, ListsSection, loader::CONFIG_DIR};
use bulwark_core::{ConfirmationPolicy, EffectType};
use bulwark_policy::{PolicyConfig, PolicyLists, RateLimitConfig};
use bulwark_shadow::{ConflictStrategy, PatchApplyRequest};
use bulwark_telemetry::{FileRotation, LogConfig, LogFormat, LogTarget};

/// On-disk locations used by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoragePaths {
    /// Shadow store root.
    pub(crate) shadow_root: PathBuf,
    /// JSON-lines audit log.
    pub(crate) audit_log: PathBuf,
    /// Permanent grant file.
    pub(crate) grants: PathBuf,
}

/// Resolve storage locations, defaulting to `{workspace}/.bulwark/`.
pub(crate) fn storage_paths(cfg: &Config, workspace_root: &Path) -> StoragePaths {
    let state_dir = workspace_root.join(CONFIG_DIR);
    let resolve = |configured: Option<&String>, fallback: &str| {
        configured.map_or_else(
            || state_dir.join(fallback),
            |p| resolve_against(workspace_root, p),
        )
    };
    StoragePaths {
        shadow_root: resolve(cfg.shadow.root.as_ref(), "shadow"),
        audit_log: resolve(cfg.audit.path.as_ref(), "audit.jsonl"),
        grants: resolve(cfg.policy.grants_path.as_ref(), "grants.json"),
    }
}

fn resolve_against(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn to_lists(section: &ListsSection) -> PolicyLists {
    PolicyLists {
        commands: section.commands.clone(),
        domains: section.domains.clone(),
        paths: section.paths.clone(),
    }
}

/// Convert the `[policy]` section to a [`PolicyConfig`].
///
/// Relative workspace roots are resolved against `workspace_root`.
///
/// # Errors
///
/// Returns an error for an unknown effect type or policy name, or an
/// override the taxonomy does not permit.
pub(crate) fn to_policy_config(cfg: &Config, workspace_root: &Path) -> anyhow::Result<PolicyConfig> {
    let section = &cfg.policy;
    let mut policy = PolicyConfig::default();

    for (effect, name) in &section.overrides {
        let effect_type = EffectType::from_str(effect)
            .with_context(|| format!("policy.overrides: {effect}"))?;
        let chosen = ConfirmationPolicy::from_str(name)
            .with_context(|| format!("policy.overrides.{effect}"))?;
        policy.overrides.insert(effect_type, chosen);
    }
    policy.denied_effects = section
        .denied_effects
        .iter()
        .map(|name| EffectType::from_str(name).context("policy.denied_effects"))
        .collect::<anyhow::Result<_>>()?;
    policy.allowlists = to_lists(&section.allowlists);
    policy.blocklists = to_lists(&section.blocklists);

    if !section.workspace_roots.is_empty() {
        let roots = section
            .workspace_roots
            .iter()
            .map(|r| resolve_against(workspace_root, r).display().to_string());
        policy = policy.with_workspace_roots(roots);
    }

    policy.confirmation_timeout = Some(Duration::from_secs(section.confirmation_timeout_secs));
    policy.session_grant_ttl = match section.session_grant_ttl_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    policy.rate_limit = match section.rate_limit.max_requests {
        0 => RateLimitConfig::disabled(),
        max => RateLimitConfig::per(max, Duration::from_secs(section.rate_limit.window_secs)),
    };
    policy.response_cache_capacity = section.response_cache_capacity;
    policy.notify_auto_approvals = section.notify_auto_approvals;

    policy.validate()?;
    Ok(policy)
}

/// Convert the `[logging]` section to a [`LogConfig`].
///
/// # Errors
///
/// Returns an error for an unknown format or target.
pub(crate) fn to_log_config(cfg: &Config) -> anyhow::Result<LogConfig> {
    let logging = &cfg.logging;
    let format = LogFormat::from_str(&logging.format)?;
    let mut log_config = LogConfig::new(logging.level.to_lowercase()).with_format(format);

    log_config = match logging.target.to_lowercase().as_str() {
        "stdout" => log_config.with_target(LogTarget::Stdout),
        "stderr" => log_config.with_target(LogTarget::Stderr),
        "file" => {
            let directory = logging
                .directory
                .as_deref()
                .context("logging.directory is required for file output")?;
            log_config.with_file_logging(directory, FileRotation::Daily)
        },
        other => anyhow::bail!("unknown logging target: {other}"),
    };

    for directive in &logging.directives {
        log_config = log_config.with_directive(directive);
    }
    Ok(log_config)
}

/// Parse a conflict strategy name.
///
/// # Errors
///
/// Returns an error for anything but `abort`, `merge` or `force`.
pub(crate) fn conflict_strategy(name: &str) -> anyhow::Result<ConflictStrategy> {
    match name.to_lowercase().as_str() {
        "abort" => Ok(ConflictStrategy::Abort),
        "merge" => Ok(ConflictStrategy::Merge),
        "force" => Ok(ConflictStrategy::Force),
        other => anyhow::bail!("unknown conflict strategy: {other}"),
    }
}

/// Apply parameters from the `[shadow]` section.
///
/// # Errors
///
/// Returns an error if the configured conflict strategy is unknown.
pub(crate) fn apply_request(cfg: &Config, patch_id: &str) -> anyhow::Result<PatchApplyRequest> {
    Ok(PatchApplyRequest::new(patch_id)
        .with_backup(cfg.shadow.create_backup)
        .with_backup_suffix(&cfg.shadow.backup_suffix)
        .with_strategy(conflict_strategy(&cfg.shadow.conflict_strategy)?))
}

/// Apply timeout from the `[shadow]` section.
pub(crate) fn apply_timeout(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.shadow.apply_timeout_secs)
}
