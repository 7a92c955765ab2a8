use super::enforce::{
    block_workspace_override, clamp_limit, clamp_min_int, enforce_bool_only_true,
    enforce_mode_tighten, intersect_string_arrays, narrow_roots, tighten_policy_overrides,
    union_string_arrays,
};

/// Enforce that the workspace layer can only tighten the baseline.
///
/// `baseline` is the merged tree before the workspace layer was applied and
/// `workspace_layer` the raw workspace file. Call after merging, before
/// deserializing.
pub fn enforce_restrictions(
    merged: &mut toml::Value,
    baseline: &toml::Value,
    workspace_layer: &toml::Value,
) {
    // Deny lists only grow.
    for (path, field) in [
        (&["policy", "denied_effects"][..], "policy.denied_effects"),
        (&["policy", "blocklists", "commands"][..], "policy.blocklists.commands"),
        (&["policy", "blocklists", "domains"][..], "policy.blocklists.domains"),
        (&["policy", "blocklists", "paths"][..], "policy.blocklists.paths"),
    ] {
        union_string_arrays(merged, baseline, workspace_layer, path, field);
    }

    // Allow lists only shrink.
    for (path, field) in [
        (&["policy", "allowlists", "commands"][..], "policy.allowlists.commands"),
        (&["policy", "allowlists", "domains"][..], "policy.allowlists.domains"),
        (&["policy", "allowlists", "paths"][..], "policy.allowlists.paths"),
    ] {
        intersect_string_arrays(merged, baseline, workspace_layer, path, field);
    }

    narrow_roots(
        merged,
        baseline,
        workspace_layer,
        &["policy", "workspace_roots"],
        "policy.workspace_roots",
    );

    tighten_policy_overrides(merged, baseline, workspace_layer, &["policy", "overrides"]);

    // Grants may not outlive the baseline and the rate limit may not loosen.
    clamp_limit(
        merged,
        baseline,
        workspace_layer,
        &["policy", "session_grant_ttl_secs"],
        "policy.session_grant_ttl_secs",
    );
    clamp_limit(
        merged,
        baseline,
        workspace_layer,
        &["policy", "rate_limit", "max_requests"],
        "policy.rate_limit.max_requests",
    );
    clamp_min_int(
        merged,
        baseline,
        workspace_layer,
        &["policy", "rate_limit", "window_secs"],
        "policy.rate_limit.window_secs",
    );

    enforce_bool_only_true(
        merged,
        baseline,
        workspace_layer,
        &["shadow", "create_backup"],
        "shadow.create_backup",
    );
    enforce_mode_tighten(
        merged,
        baseline,
        workspace_layer,
        &["shadow", "conflict_strategy"],
        "shadow.conflict_strategy",
        &["abort", "merge", "force"],
    );

    // Storage locations belong to the user, not the repository.
    for (path, field) in [
        (&["policy", "grants_path"][..], "policy.grants_path"),
        (&["shadow", "root"][..], "shadow.root"),
        (&["audit", "path"][..], "audit.path"),
    ] {
        block_workspace_override(merged, baseline, workspace_layer, path, field);
    }
}
