use std::str::FromStr;

use bulwark_core::{ConfirmationPolicy, EffectType};
use bulwark_policy::taxonomy;
use tracing::warn;

use super::path::{get_nested, remove_nested, set_nested};

fn string_items(val: Option<&toml::Value>) -> Option<Vec<toml::Value>> {
    val.and_then(toml::Value::as_array).cloned()
}

/// Workspace may add entries to the array but not remove baseline ones.
pub(super) fn union_string_arrays(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    if get_nested(workspace, path).is_none() {
        return;
    }
    let Some(baseline_items) = string_items(get_nested(baseline, path)) else {
        return;
    };

    let mut result = string_items(get_nested(merged, path)).unwrap_or_default();
    for item in baseline_items {
        if !result.contains(&item) {
            warn!(field = field_name, entry = %item, "workspace config removed an entry; restoring it");
            result.push(item);
        }
    }
    set_nested(merged, path, toml::Value::Array(result));
}

/// Workspace may only drop entries; anything the baseline lacks is removed.
pub(super) fn intersect_string_arrays(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let Some(ws_items) = string_items(get_nested(workspace, path)) else {
        return;
    };
    let baseline_items = string_items(get_nested(baseline, path)).unwrap_or_default();

    let (kept, dropped): (Vec<_>, Vec<_>) = ws_items
        .into_iter()
        .partition(|item| baseline_items.contains(item));
    for item in &dropped {
        warn!(field = field_name, entry = %item, "workspace config tried to extend an allowlist; dropping entry");
    }
    set_nested(merged, path, toml::Value::Array(kept));
}

fn within_root(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Workspace roots may only narrow a non-empty baseline. An empty result
/// would lift the restriction, so the baseline is restored instead.
pub(super) fn narrow_roots(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let Some(ws_items) = string_items(get_nested(workspace, path)) else {
        return;
    };
    let baseline_items = string_items(get_nested(baseline, path)).unwrap_or_default();
    let baseline_roots: Vec<&str> = baseline_items.iter().filter_map(toml::Value::as_str).collect();
    if baseline_roots.is_empty() {
        return;
    }

    let kept: Vec<toml::Value> = ws_items
        .into_iter()
        .filter(|item| {
            item.as_str()
                .is_some_and(|p| baseline_roots.iter().any(|root| within_root(p, root)))
        })
        .collect();

    if kept.is_empty() {
        warn!(field = field_name, "workspace config tried to widen roots; reverting to baseline");
        set_nested(merged, path, toml::Value::Array(baseline_items));
    } else {
        set_nested(merged, path, toml::Value::Array(kept));
    }
}

/// Clamp a limit where `0` means unlimited so workspace cannot raise it.
pub(super) fn clamp_limit(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let baseline_val = get_nested(baseline, path).and_then(toml::Value::as_integer);
    let ws_val = get_nested(workspace, path).and_then(toml::Value::as_integer);

    if let (Some(base_v), Some(ws_v)) = (baseline_val, ws_val)
        && base_v > 0
        && (ws_v <= 0 || ws_v > base_v)
    {
        warn!(field = field_name, from = base_v, to = ws_v, "workspace config tried to raise a limit; clamping");
        set_nested(merged, path, toml::Value::Integer(base_v));
    }
}

/// Clamp an integer so workspace cannot lower it below the baseline.
pub(super) fn clamp_min_int(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let baseline_val = get_nested(baseline, path).and_then(toml::Value::as_integer);
    let ws_val = get_nested(workspace, path).and_then(toml::Value::as_integer);

    if let (Some(base_v), Some(ws_v)) = (baseline_val, ws_val)
        && ws_v < base_v
    {
        warn!(field = field_name, from = base_v, to = ws_v, "workspace config tried to lower a floor; clamping");
        set_nested(merged, path, toml::Value::Integer(base_v));
    }
}

/// A boolean the workspace may enable but not disable.
pub(super) fn enforce_bool_only_true(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    let baseline_on = get_nested(baseline, path).and_then(toml::Value::as_bool) == Some(true);
    if baseline_on && get_nested(workspace, path).and_then(toml::Value::as_bool) == Some(false) {
        warn!(field = field_name, "workspace config tried to disable a safeguard; forcing true");
        set_nested(merged, path, toml::Value::Boolean(true));
    }
}

/// An ordered mode (strictest first) the workspace may only tighten.
pub(super) fn enforce_mode_tighten(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
    ordered_modes: &[&str],
) {
    let baseline_str = get_nested(baseline, path).and_then(toml::Value::as_str);
    let ws_str = get_nested(workspace, path).and_then(toml::Value::as_str);

    if let (Some(base_s), Some(ws_s)) = (baseline_str, ws_str)
        && let Some(b_idx) = ordered_modes.iter().position(|m| *m == base_s)
        && let Some(w_idx) = ordered_modes.iter().position(|m| *m == ws_s)
        && w_idx > b_idx
    {
        warn!(field = field_name, from = base_s, to = ws_s, "workspace config tried to loosen a mode; reverting");
        set_nested(merged, path, toml::Value::String(base_s.to_owned()));
    }
}

/// Workspace may not set this field at all.
pub(super) fn block_workspace_override(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
    field_name: &str,
) {
    if get_nested(workspace, path).is_none() {
        return;
    }
    warn!(field = field_name, "workspace config cannot set this field; reverting");
    match get_nested(baseline, path) {
        Some(base_val) => set_nested(merged, path, base_val.clone()),
        None => remove_nested(merged, path),
    }
}

/// Drop workspace policy overrides that are less strict than the policy the
/// baseline already enforces for that effect type.
pub(super) fn tighten_policy_overrides(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace: &toml::Value,
    path: &[&str],
) {
    let Some(ws_overrides) = get_nested(workspace, path).and_then(toml::Value::as_table) else {
        return;
    };

    for (effect_name, ws_val) in ws_overrides {
        // Unknown names are left for validation to report.
        let Ok(effect_type) = EffectType::from_str(effect_name) else {
            continue;
        };
        let Some(ws_policy) = ws_val.as_str().and_then(|s| ConfirmationPolicy::from_str(s).ok())
        else {
            continue;
        };

        let mut entry_path = path.to_vec();
        entry_path.push(effect_name);
        let baseline_val = get_nested(baseline, &entry_path);
        let baseline_policy = baseline_val
            .and_then(toml::Value::as_str)
            .and_then(|s| ConfirmationPolicy::from_str(s).ok())
            .unwrap_or_else(|| taxonomy::default_policy(effect_type));

        if ws_policy.strictness() < baseline_policy.strictness() {
            warn!(
                effect_type = %effect_type,
                from = %baseline_policy,
                to = %ws_policy,
                "workspace config tried to relax a confirmation policy; reverting"
            );
            match baseline_val {
                Some(base_val) => set_nested(merged, &entry_path, base_val.clone()),
                None => remove_nested(merged, &entry_path),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_root() {
        assert!(within_root("/ws/app", "/ws"));
        assert!(within_root("/ws", "/ws/"));
        assert!(!within_root("/wsx", "/ws"));
        assert!(!within_root("/other", "/ws"));
    }
}
