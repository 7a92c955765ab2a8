//! Effect scopes and the scope evaluator.
//!
//! A scope is a set of optional constraints. `None` means "unconstrained";
//! `Some(vec![])` on an allow list means "nothing is allowed". Scopes from
//! the request, the caller and the policy are combined with
//! [`EffectScope::intersect`] and the result is checked against the
//! request's concrete target.

use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::request::{CommandLine, EffectRequest, EffectTarget, resolve_path};
use bulwark_core::EffectType;

/// Allow/deny sets and ceilings constraining an effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectScope {
    /// Roots a filesystem target must live under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_paths: Option<Vec<String>>,
    /// File extensions a filesystem target may have (without the dot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,
    /// Globs or path prefixes a filesystem target must not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_paths: Option<Vec<String>>,
    /// Commands a shell target must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_allowlist: Option<Vec<String>>,
    /// Commands a shell target must not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_blocklist: Option<Vec<String>>,
    /// Domains a network target must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_allowlist: Option<Vec<String>>,
    /// Domains a network target must not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_blocklist: Option<Vec<String>>,
    /// Largest content a write may carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,
    /// Longest run time an effect may request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl EffectScope {
    /// A scope restricted to the given workspace roots.
    #[must_use]
    pub fn workspace<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            workspace_paths: Some(roots.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Whether no constraint is set.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    /// Combine two scopes so that a target passes the result only if it
    /// would pass both.
    ///
    /// Allow lists are intersected (keeping the narrower entry where one
    /// contains the other), deny lists are unioned, ceilings take the minimum.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            workspace_paths: intersect_allow(
                self.workspace_paths.as_ref(),
                other.workspace_paths.as_ref(),
                |narrow, wide| Path::new(narrow).starts_with(Path::new(wide)),
            ),
            allowed_extensions: intersect_allow(
                self.allowed_extensions.as_ref(),
                other.allowed_extensions.as_ref(),
                |a, b| normalize_extension(a) == normalize_extension(b),
            ),
            excluded_paths: union_deny(self.excluded_paths.as_ref(), other.excluded_paths.as_ref()),
            command_allowlist: intersect_allow(
                self.command_allowlist.as_ref(),
                other.command_allowlist.as_ref(),
                command_matches,
            ),
            command_blocklist: union_deny(
                self.command_blocklist.as_ref(),
                other.command_blocklist.as_ref(),
            ),
            domain_allowlist: intersect_allow(
                self.domain_allowlist.as_ref(),
                other.domain_allowlist.as_ref(),
                |narrow, wide| domain_matches(narrow.trim_start_matches("*."), wide),
            ),
            domain_blocklist: union_deny(
                self.domain_blocklist.as_ref(),
                other.domain_blocklist.as_ref(),
            ),
            max_file_size_bytes: min_ceiling(self.max_file_size_bytes, other.max_file_size_bytes),
            timeout_ms: min_ceiling(self.timeout_ms, other.timeout_ms),
        }
    }

    /// Check a request's target against this scope.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the target falls outside the scope.
    pub fn check(&self, request: &EffectRequest, target: &EffectTarget) -> Result<(), String> {
        if let (Some(requested), Some(limit)) = (request.payload.timeout_ms, self.timeout_ms)
            && requested > limit
        {
            return Err(format!(
                "requested timeout {requested}ms exceeds the {limit}ms ceiling"
            ));
        }

        match target {
            EffectTarget::Path(path) => self.check_path(request, path),
            EffectTarget::Command(command) => self.check_command(request, command),
            EffectTarget::Url(url) => self.check_url(url),
            EffectTarget::Unscoped => Ok(()),
        }
    }

    fn check_path(&self, request: &EffectRequest, path: &Path) -> Result<(), String> {
        if has_traversal(path) {
            return Err("path contains traversal sequence (..)".to_string());
        }
        let display = path.display();
        // Both the path as written and the file it resolves to must pass.
        let resolved = resolve_links(path);
        let candidates = [path, resolved.as_path()];

        if let Some(roots) = &self.workspace_paths
            && !candidates.iter().all(|p| within_roots(p, roots))
        {
            return Err(format!("path '{display}' is outside the workspace roots"));
        }

        if let Some(excluded) = &self.excluded_paths
            && let Some(pattern) = excluded
                .iter()
                .find(|pattern| candidates.iter().any(|p| path_matches(p, pattern)))
        {
            return Err(format!("path '{display}' is excluded by '{pattern}'"));
        }

        if let Some(allowed) = &self.allowed_extensions {
            for candidate in candidates {
                let ext = candidate
                    .extension()
                    .map(|e| e.to_string_lossy().to_ascii_lowercase())
                    .unwrap_or_default();
                if !allowed.iter().any(|a| normalize_extension(a) == ext) {
                    return Err(format!("extension '{ext}' of '{display}' is not allowed"));
                }
            }
        }

        if request.effect_type == EffectType::FilesystemWrite
            && let (Some(content), Some(limit)) =
                (&request.payload.content, self.max_file_size_bytes)
        {
            let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
            if size > limit {
                return Err(format!("content of {size} bytes exceeds the {limit} byte ceiling"));
            }
        }

        Ok(())
    }

    fn check_command(&self, request: &EffectRequest, command: &CommandLine) -> Result<(), String> {
        let segments = command.segments();

        if let Some(blocked) = &self.command_blocklist {
            for segment in &segments {
                if let Some(pattern) = blocked.iter().find(|p| command_matches(segment, p)) {
                    return Err(format!("command '{segment}' matches blocked '{pattern}'"));
                }
            }
        }

        if let Some(allowed) = &self.command_allowlist {
            for segment in &segments {
                if !allowed.iter().any(|p| command_matches(segment, p)) {
                    return Err(format!("command '{segment}' is not on the allowlist"));
                }
            }
        }

        if let (Some(roots), Some(cwd)) = (&self.workspace_paths, &request.payload.cwd) {
            let cwd = resolve_path(Path::new(cwd), None);
            if has_traversal(&cwd)
                || !within_roots(&cwd, roots)
                || !within_roots(&resolve_links(&cwd), roots)
            {
                return Err(format!(
                    "working directory '{}' is outside the workspace roots",
                    cwd.display()
                ));
            }
        }

        Ok(())
    }

    fn check_url(&self, url: &url::Url) -> Result<(), String> {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

        if let Some(blocked) = &self.domain_blocklist
            && let Some(pattern) = blocked.iter().find(|p| domain_matches(&host, p))
        {
            return Err(format!("host '{host}' matches blocked '{pattern}'"));
        }

        if let Some(allowed) = &self.domain_allowlist
            && !allowed.iter().any(|p| domain_matches(&host, p))
        {
            return Err(format!("host '{host}' is not on the allowlist"));
        }

        Ok(())
    }
}

/// Whether a path contains a `..` component.
#[must_use]
pub fn has_traversal(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn normalize_root(root: &str) -> PathBuf {
    resolve_path(Path::new(root), None)
}

/// Whether `path` lies under one of `roots`, compared both as written and
/// with the roots' own symlinks resolved.
fn within_roots(path: &Path, roots: &[String]) -> bool {
    roots.iter().any(|root| {
        let root = normalize_root(root);
        path.starts_with(&root) || path.starts_with(resolve_links(&root))
    })
}

/// Resolve symlinks in the longest existing prefix of `path` and append the
/// components that do not exist yet. Relative paths, and paths with no
/// resolvable prefix, are returned unchanged.
#[must_use]
pub fn resolve_links(path: &Path) -> PathBuf {
    if !path.is_absolute() {
        return path.to_path_buf();
    }
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return missing.iter().rev().fold(real, |acc, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            },
            _ => return path.to_path_buf(),
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Whether `path` matches a glob or lies under a path prefix.
#[must_use]
pub fn path_matches(path: &Path, pattern: &str) -> bool {
    if path.starts_with(Path::new(pattern)) {
        return true;
    }
    Glob::new(pattern)
        .ok()
        .is_some_and(|g| g.compile_matcher().is_match(path))
}

/// Whether a simple command matches a pattern.
///
/// Plain patterns match the whole command or a word-aligned prefix of it
/// (`git` matches `git status`, `rm -rf /` does not match `rm -rf /tmp`).
/// A program given by path is also compared by its file name. Patterns
/// containing `*` are globs over the whole command.
#[must_use]
pub fn command_matches(segment: &str, pattern: &str) -> bool {
    let pattern = pattern.split_whitespace().collect::<Vec<_>>().join(" ");
    if pattern.is_empty() {
        return false;
    }
    if pattern.contains('*') {
        return Glob::new(&pattern)
            .ok()
            .is_some_and(|g| g.compile_matcher().is_match(segment));
    }
    let prefix_match = |line: &str| {
        line == pattern
            || line
                .strip_prefix(pattern.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
    };
    if prefix_match(segment) {
        return true;
    }
    let (program, rest) = segment.split_once(' ').unwrap_or((segment, ""));
    let base = Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() || base == program {
        return false;
    }
    if rest.is_empty() {
        prefix_match(&base)
    } else {
        prefix_match(&format!("{base} {rest}"))
    }
}

/// Whether `host` matches a domain pattern.
///
/// `example.com` matches itself and its subdomains, `*.example.com` only
/// subdomains, `*` everything.
#[must_use]
pub fn domain_matches(host: &str, pattern: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let pattern = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.') && rest.len() > 1);
    }
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .is_some_and(|rest| rest.ends_with('.'))
}

fn intersect_allow(
    a: Option<&Vec<String>>,
    b: Option<&Vec<String>>,
    narrower_or_equal: impl Fn(&str, &str) -> bool,
) -> Option<Vec<String>> {
    match (a, b) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (Some(a), Some(b)) => {
            let mut out: Vec<String> = Vec::new();
            let kept_a = a.iter().filter(|x| b.iter().any(|y| narrower_or_equal(x, y)));
            let kept_b = b.iter().filter(|y| a.iter().any(|x| narrower_or_equal(y, x)));
            for item in kept_a.chain(kept_b) {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Some(out)
        },
    }
}

fn union_deny(a: Option<&Vec<String>>, b: Option<&Vec<String>>) -> Option<Vec<String>> {
    match (a, b) {
        (None, None) => None,
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (Some(a), Some(b)) => {
            let mut out = a.clone();
            for item in b {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Some(out)
        },
    }
}

fn min_ceiling(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
