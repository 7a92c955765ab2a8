//! Patch model: structural representation of a proposed file change.
//!
//! A [`FilePatch`] is a list of unified-diff [`DiffHunk`]s plus the operation
//! kind and declared line stats. Hunk starts are 0-based line indices into
//! the old and new file; the rendered `@@` header is 1-based.

use bulwark_core::Timestamp;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use crate::error::{ShadowError, ShadowResult};

/// Context lines around each change in computed hunks.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Marker line following a diff line that has no trailing newline.
const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file\n";

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOperation {
    /// New file from `fullContent`.
    Create,
    /// In-place edit.
    Modify,
    /// Remove the file.
    Delete,
    /// Move to `newFilePath`, optionally editing content.
    Rename,
}

impl PatchOperation {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous block of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    /// First old line covered (0-based).
    pub old_start: usize,
    /// Context plus removed lines.
    pub old_lines: usize,
    /// First new line covered (0-based).
    pub new_start: usize,
    /// Context plus added lines.
    pub new_lines: usize,
    /// Diff body: one line per entry, prefixed with ` `, `+` or `-`.
    pub content: String,
    /// Rendered `@@ -l,s +l,s @@` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Enclosing function or section name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A parsed hunk line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineTag {
    Context,
    Added,
    Removed,
}

/// Line counts inside a hunk body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HunkCounts {
    /// Unchanged lines.
    pub context: usize,
    /// `+` lines.
    pub added: usize,
    /// `-` lines.
    pub removed: usize,
}

impl HunkCounts {
    /// Lines this hunk covers in the old file.
    #[must_use]
    pub fn old_lines(&self) -> usize {
        self.context.saturating_add(self.removed)
    }

    /// Lines this hunk covers in the new file.
    #[must_use]
    pub fn new_lines(&self) -> usize {
        self.context.saturating_add(self.added)
    }
}

impl DiffHunk {
    /// Parse the body into tagged lines, each keeping its own newline.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidPatch`] for lines without a valid prefix.
    pub(crate) fn lines(&self) -> ShadowResult<Vec<(LineTag, String)>> {
        let mut lines: Vec<(LineTag, String)> = Vec::new();
        for raw in self.content.split_inclusive('\n') {
            if raw.starts_with('\\') {
                if let Some((_, text)) = lines.last_mut()
                    && text.ends_with('\n')
                {
                    text.pop();
                    if text.ends_with('\r') {
                        text.pop();
                    }
                }
                continue;
            }
            let mut chars = raw.chars();
            let tag = match chars.next() {
                Some(' ') => LineTag::Context,
                Some('+') => LineTag::Added,
                Some('-') => LineTag::Removed,
                // Some producers drop the space on blank context lines.
                Some('\n') => {
                    lines.push((LineTag::Context, "\n".to_string()));
                    continue;
                },
                _ => {
                    return Err(ShadowError::InvalidPatch(format!(
                        "hunk line {raw:?} has no ' ', '+' or '-' prefix"
                    )));
                },
            };
            lines.push((tag, chars.as_str().to_string()));
        }
        Ok(lines)
    }

    /// Count context, added and removed lines in the body.
    ///
    /// # Errors
    ///
    /// See [`DiffHunk::lines`].
    pub fn counts(&self) -> ShadowResult<HunkCounts> {
        let mut counts = HunkCounts::default();
        for (tag, _) in self.lines()? {
            let slot = match tag {
                LineTag::Context => &mut counts.context,
                LineTag::Added => &mut counts.added,
                LineTag::Removed => &mut counts.removed,
            };
            *slot = slot.saturating_add(1);
        }
        Ok(counts)
    }

    /// The unified-diff header, 1-based.
    #[must_use]
    pub fn header_line(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            display_start(self.old_start, self.old_lines),
            self.old_lines,
            display_start(self.new_start, self.new_lines),
            self.new_lines
        )
    }

    /// Old-file line range this hunk covers.
    #[must_use]
    pub fn old_range(&self) -> std::ops::Range<usize> {
        self.old_start..self.old_start.saturating_add(self.old_lines)
    }
}

/// Unified diff numbering: an empty range names the line before it.
fn display_start(start: usize, lines: usize) -> usize {
    if lines == 0 {
        start
    } else {
        start.saturating_add(1)
    }
}

/// Patch ids name files under the shadow root, so they are restricted to a
/// single plain file name that cannot collide with the store's own files.
fn check_id(id: &str) -> Result<(), &'static str> {
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("may only contain ASCII letters, digits, '-', '_' and '.'");
    }
    if id.starts_with('.') {
        return Err("must not start with '.'");
    }
    if id == "index.json" || id.ends_with(".base") {
        return Err("is reserved by the shadow store");
    }
    Ok(())
}

/// A proposed change to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatch {
    /// Patch identifier (also the shadow id).
    pub id: String,
    /// When the patch was produced.
    pub timestamp: Timestamp,
    /// Live file the patch targets.
    pub file_path: PathBuf,
    /// Kind of change.
    pub operation: PatchOperation,
    /// Destination for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_file_path: Option<PathBuf>,
    /// Diff hunks against the live file.
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
    /// Complete new content (required for create).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    /// Declared `+` lines.
    pub additions: usize,
    /// Declared `-` lines.
    pub deletions: usize,
    /// Human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool that produced the patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
}

impl FilePatch {
    fn build(
        file_path: PathBuf,
        operation: PatchOperation,
        hunks: Vec<DiffHunk>,
        full_content: Option<String>,
    ) -> Self {
        let mut patch = Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Timestamp::now(),
            file_path,
            operation,
            new_file_path: None,
            hunks,
            full_content,
            additions: 0,
            deletions: 0,
            description: None,
            tool_id: None,
        };
        // Computed hunks always parse.
        let (additions, deletions) = patch.recount().unwrap_or_default();
        patch.additions = additions;
        patch.deletions = deletions;
        patch
    }

    /// A create patch for a new file.
    #[must_use]
    pub fn create(file_path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        let hunks = compute_hunks("", &content, DEFAULT_CONTEXT_LINES);
        Self::build(file_path.into(), PatchOperation::Create, hunks, Some(content))
    }

    /// A modify patch from the current and desired content.
    #[must_use]
    pub fn modify(file_path: impl Into<PathBuf>, original: &str, modified: &str) -> Self {
        let hunks = compute_hunks(original, modified, DEFAULT_CONTEXT_LINES);
        Self::build(file_path.into(), PatchOperation::Modify, hunks, None)
    }

    /// A delete patch removing every line of `original`.
    #[must_use]
    pub fn delete(file_path: impl Into<PathBuf>, original: &str) -> Self {
        let hunks = compute_hunks(original, "", DEFAULT_CONTEXT_LINES);
        Self::build(file_path.into(), PatchOperation::Delete, hunks, None)
    }

    /// A rename patch, optionally changing content on the way.
    #[must_use]
    pub fn rename(
        file_path: impl Into<PathBuf>,
        new_file_path: impl Into<PathBuf>,
        original: &str,
        modified: &str,
    ) -> Self {
        let hunks = compute_hunks(original, modified, DEFAULT_CONTEXT_LINES);
        let mut patch = Self::build(file_path.into(), PatchOperation::Rename, hunks, None);
        patch.new_file_path = Some(new_file_path.into());
        patch
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach the producing tool id.
    #[must_use]
    pub fn with_tool_id(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = Some(tool_id.into());
        self
    }

    /// Recount additions and deletions from the hunks.
    ///
    /// A create patch without hunks counts every line of `fullContent` as
    /// an addition.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidPatch`] if a hunk body is malformed.
    pub fn recount(&self) -> ShadowResult<(usize, usize)> {
        if self.hunks.is_empty()
            && self.operation == PatchOperation::Create
            && let Some(content) = &self.full_content
        {
            return Ok((content.lines().count(), 0));
        }
        let mut additions = 0usize;
        let mut deletions = 0usize;
        for hunk in &self.hunks {
            let counts = hunk.counts()?;
            additions = additions.saturating_add(counts.added);
            deletions = deletions.saturating_add(counts.removed);
        }
        Ok((additions, deletions))
    }

    /// Structural validation, run before any side effect.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::InvalidPatch`] describing the first problem.
    pub fn validate(&self) -> ShadowResult<()> {
        let invalid = |msg: String| Err(ShadowError::InvalidPatch(msg));

        if self.id.trim().is_empty() {
            return invalid("patch id is empty".to_string());
        }
        if let Err(reason) = check_id(&self.id) {
            return invalid(format!("patch id {:?} {reason}", self.id));
        }
        if self.file_path.as_os_str().is_empty() {
            return invalid("filePath is empty".to_string());
        }
        for path in std::iter::once(&self.file_path).chain(&self.new_file_path) {
            if path.components().any(|c| matches!(c, Component::ParentDir)) {
                return invalid(format!("{} contains a '..' component", path.display()));
            }
        }
        match (self.operation, &self.new_file_path) {
            (PatchOperation::Rename, None) => {
                return invalid("rename requires newFilePath".to_string());
            },
            (PatchOperation::Rename, Some(new_path)) if new_path.as_os_str().is_empty() => {
                return invalid("newFilePath is empty".to_string());
            },
            (PatchOperation::Rename, Some(_)) => {},
            (op, Some(_)) => return invalid(format!("newFilePath is only valid for rename, not {op}")),
            (_, None) => {},
        }
        if self.operation == PatchOperation::Create && self.full_content.is_none() {
            return invalid("create requires fullContent".to_string());
        }

        let mut previous_end = 0usize;
        for (index, hunk) in self.hunks.iter().enumerate() {
            let counts = hunk.counts()?;
            if counts.old_lines() != hunk.old_lines || counts.new_lines() != hunk.new_lines {
                return invalid(format!(
                    "hunk {index} declares -{},+{} but contains -{},+{}",
                    hunk.old_lines,
                    hunk.new_lines,
                    counts.old_lines(),
                    counts.new_lines()
                ));
            }
            if hunk.old_start < previous_end {
                return invalid(format!("hunk {index} overlaps or precedes the previous hunk"));
            }
            previous_end = hunk.old_range().end;
        }

        let (additions, deletions) = self.recount()?;
        if additions != self.additions || deletions != self.deletions {
            return invalid(format!(
                "declared +{}/-{} but hunks contain +{additions}/-{deletions}",
                self.additions, self.deletions
            ));
        }
        Ok(())
    }

    /// Content the live file should have once the patch is applied.
    ///
    /// `original` is the live content, `None` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ShadowError::FileNotFound`] when a modify, rename or delete
    /// targets a missing file, [`ShadowError::TargetExists`] when a create
    /// targets an existing one, and [`ShadowError::HunkMismatch`] when the
    /// hunks do not apply.
    pub fn target_content(&self, original: Option<&str>) -> ShadowResult<String> {
        match (self.operation, original) {
            (PatchOperation::Create, None) => Ok(self.full_content.clone().unwrap_or_default()),
            (PatchOperation::Create, Some(_)) => Err(ShadowError::TargetExists(self.file_path.clone())),
            (PatchOperation::Delete, Some(_)) => Ok(String::new()),
            (PatchOperation::Modify | PatchOperation::Rename, Some(original)) => {
                let applied = apply_hunks(original, &self.hunks)?;
                match &self.full_content {
                    Some(full) if !self.hunks.is_empty() && *full != applied => {
                        Err(ShadowError::InvalidPatch(
                            "fullContent disagrees with the hunks".to_string(),
                        ))
                    },
                    Some(full) => Ok(full.clone()),
                    None => Ok(applied),
                }
            },
            (PatchOperation::Modify | PatchOperation::Rename | PatchOperation::Delete, None) => {
                Err(ShadowError::FileNotFound(self.file_path.clone()))
            },
        }
    }

    /// Path the patched content lands at.
    #[must_use]
    pub fn destination(&self) -> &Path {
        match (self.operation, &self.new_file_path) {
            (PatchOperation::Rename, Some(new_path)) => new_path,
            _ => &self.file_path,
        }
    }

    /// Render as a unified diff for review.
    #[must_use]
    pub fn render_unified(&self) -> String {
        let old_path = match self.operation {
            PatchOperation::Create => "/dev/null".to_string(),
            _ => format!("a/{}", self.file_path.display()),
        };
        let new_path = match self.operation {
            PatchOperation::Delete => "/dev/null".to_string(),
            _ => format!("b/{}", self.destination().display()),
        };

        let mut out = String::new();
        let _ = writeln!(out, "--- {old_path}");
        let _ = writeln!(out, "+++ {new_path}");
        for hunk in &self.hunks {
            out.push_str(hunk.header.as_deref().unwrap_or(&hunk.header_line()));
            if let Some(context) = &hunk.context {
                out.push(' ');
                out.push_str(context);
            }
            out.push('\n');
            out.push_str(&hunk.content);
            if !hunk.content.is_empty() && !hunk.content.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// Derive a patch from the live content (`None` if absent) and the desired
/// content: a create for new files, a modify otherwise.
#[must_use]
pub fn compute_patch(file_path: impl Into<PathBuf>, original: Option<&str>, modified: &str) -> FilePatch {
    match original {
        None => FilePatch::create(file_path, modified),
        Some(original) => FilePatch::modify(file_path, original, modified),
    }
}

/// Compute unified-diff hunks between two texts (Myers line diff).
#[must_use]
pub fn compute_hunks(original: &str, modified: &str, context_lines: usize) -> Vec<DiffHunk> {
    let diff = TextDiff::from_lines(original, modified);
    let mut hunks = Vec::new();

    for group in diff.grouped_ops(context_lines) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let new_start = first.new_range().start;
        let old_lines = last.old_range().end.saturating_sub(old_start);
        let new_lines = last.new_range().end.saturating_sub(new_start);

        let mut content = String::new();
        for op in &group {
            for change in diff.iter_changes(op) {
                content.push(match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Insert => '+',
                    ChangeTag::Delete => '-',
                });
                let value = change.value();
                content.push_str(value);
                if !value.ends_with('\n') {
                    content.push('\n');
                    content.push_str(NO_NEWLINE_MARKER);
                }
            }
        }

        let mut hunk = DiffHunk {
            old_start,
            old_lines,
            new_start,
            new_lines,
            content,
            header: None,
            context: None,
        };
        hunk.header = Some(hunk.header_line());
        hunks.push(hunk);
    }
    hunks
}

/// Apply hunks to `original`, verifying every context and removed line.
///
/// # Errors
///
/// Returns [`ShadowError::HunkMismatch`] if a hunk is out of order, out of
/// bounds, or its lines do not match `original`.
pub fn apply_hunks(original: &str, hunks: &[DiffHunk]) -> ShadowResult<String> {
    let old: Vec<&str> = original.split_inclusive('\n').collect();
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0usize;

    for (index, hunk) in hunks.iter().enumerate() {
        let mismatch = |reason: String| ShadowError::HunkMismatch { index, reason };
        let before = old.get(cursor..hunk.old_start).ok_or_else(|| {
            mismatch(format!(
                "starts at line {} but the previous hunk ended at line {cursor} of {}",
                hunk.old_start,
                old.len()
            ))
        })?;
        out.extend(before.iter().copied());

        let mut pos = hunk.old_start;
        for (tag, text) in hunk.lines()? {
            match tag {
                LineTag::Added => out.push_str(&text),
                LineTag::Context | LineTag::Removed => {
                    let actual = old.get(pos).copied();
                    if actual != Some(text.as_str()) {
                        return Err(mismatch(format!(
                            "line {} expected {:?}, found {:?}",
                            pos.saturating_add(1),
                            text,
                            actual.unwrap_or("<end of file>")
                        )));
                    }
                    if tag == LineTag::Context {
                        out.push_str(&text);
                    }
                    pos = pos.saturating_add(1);
                },
            }
        }
        cursor = pos;
    }

    if let Some(rest) = old.get(cursor..) {
        out.extend(rest.iter().copied());
    }
    Ok(out)
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
