//! Structural three-way merge of a patch onto a file that changed after the
//! patch was computed.
//!
//! The base is the content the hunks were computed against. Edits between
//! base and live are compared with each hunk's changed lines (leading and
//! trailing context stripped); a hunk conflicts when its changed range
//! touches a live edit. Non-conflicting hunks are shifted by the line delta
//! of the live edits before them and applied to the live content.

use similar::{DiffTag, TextDiff};
use std::ops::Range;

use crate::error::ShadowResult;
use crate::patch::{DiffHunk, LineTag, apply_hunks};

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged content ready to be written.
    Merged(String),
    /// Indices of hunks that overlap edits made to the live file.
    Conflict(Vec<usize>),
}

/// A base-to-live edit, in base line coordinates.
#[derive(Debug, Clone)]
struct LiveEdit {
    old: Range<usize>,
    new_len: usize,
}

/// The changed part of a hunk.
#[derive(Debug)]
struct Core {
    index: usize,
    old: Range<usize>,
    lines: Vec<(LineTag, String)>,
}

fn live_edits(base: &str, live: &str) -> Vec<LiveEdit> {
    TextDiff::from_lines(base, live)
        .ops()
        .iter()
        .filter(|op| op.tag() != DiffTag::Equal)
        .map(|op| LiveEdit {
            old: op.old_range(),
            new_len: op.new_range().len(),
        })
        .collect()
}

/// Strict overlap for two non-empty ranges; adjacency counts when either is
/// an insertion point.
fn ranges_touch(a: &Range<usize>, b: &Range<usize>) -> bool {
    if a.is_empty() || b.is_empty() {
        a.start <= b.end && b.start <= a.end
    } else {
        a.start < b.end && b.start < a.end
    }
}

fn cores(hunks: &[DiffHunk]) -> ShadowResult<Vec<Core>> {
    let mut out = Vec::with_capacity(hunks.len());
    for (index, hunk) in hunks.iter().enumerate() {
        let lines = hunk.lines()?;
        let Some(first) = lines.iter().position(|(tag, _)| *tag != LineTag::Context) else {
            continue;
        };
        let last = lines
            .iter()
            .rposition(|(tag, _)| *tag != LineTag::Context)
            .unwrap_or(first);
        let core: Vec<(LineTag, String)> = lines
            .get(first..=last)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        let old_len = core
            .iter()
            .filter(|(tag, _)| *tag != LineTag::Added)
            .count();
        let start = hunk.old_start.saturating_add(first);
        out.push(Core {
            index,
            old: start..start.saturating_add(old_len),
            lines: core,
        });
    }
    Ok(out)
}

/// Indices of hunks whose changed lines touch an edit between `base` and
/// `live`.
///
/// # Errors
///
/// Returns an error if a hunk body is malformed.
pub fn conflicting_hunks(base: &str, live: &str, hunks: &[DiffHunk]) -> ShadowResult<Vec<usize>> {
    let edits = live_edits(base, live);
    Ok(cores(hunks)?
        .into_iter()
        .filter(|core| edits.iter().any(|edit| ranges_touch(&core.old, &edit.old)))
        .map(|core| core.index)
        .collect())
}

fn render(lines: &[(LineTag, String)]) -> String {
    let mut content = String::new();
    for (tag, text) in lines {
        content.push(match tag {
            LineTag::Context => ' ',
            LineTag::Added => '+',
            LineTag::Removed => '-',
        });
        content.push_str(text);
        if !text.ends_with('\n') {
            content.push_str("\n\\ No newline at end of file\n");
        }
    }
    content
}

/// Merge `hunks` (computed against `base`) onto `live`.
///
/// # Errors
///
/// Returns an error if a hunk body is malformed or does not apply to `base`.
pub fn three_way_merge(base: &str, live: &str, hunks: &[DiffHunk]) -> ShadowResult<MergeOutcome> {
    let target = apply_hunks(base, hunks)?;
    if live == base {
        return Ok(MergeOutcome::Merged(target));
    }
    if live == target {
        return Ok(MergeOutcome::Merged(target));
    }

    let edits = live_edits(base, live);
    let cores = cores(hunks)?;
    let conflicts: Vec<usize> = cores
        .iter()
        .filter(|core| edits.iter().any(|edit| ranges_touch(&core.old, &edit.old)))
        .map(|core| core.index)
        .collect();
    if !conflicts.is_empty() {
        return Ok(MergeOutcome::Conflict(conflicts));
    }

    let mut rebased = Vec::with_capacity(cores.len());
    for core in cores {
        let (added, removed) = edits
            .iter()
            .filter(|edit| edit.old.end <= core.old.start)
            .fold((0usize, 0usize), |(added, removed), edit| {
                (added.saturating_add(edit.new_len), removed.saturating_add(edit.old.len()))
            });
        let start = core.old.start.saturating_add(added).saturating_sub(removed);
        let new_lines = core
            .lines
            .iter()
            .filter(|(tag, _)| *tag != LineTag::Removed)
            .count();
        rebased.push(DiffHunk {
            old_start: start,
            old_lines: core.old.len(),
            new_start: start,
            new_lines,
            content: render(&core.lines),
            header: None,
            context: None,
        });
    }

    Ok(MergeOutcome::Merged(apply_hunks(live, &rebased)?))
}
