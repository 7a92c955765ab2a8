//! Shadow command - stage, review and apply file changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bulwark_shadow::{ConflictStrategy, FilePatch, PatchApplyResult, ShadowFile, ShadowStore};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;

use crate::bridge;
use crate::host::Host;
use crate::theme::Theme;

/// Shadow subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum ShadowCommands {
    /// Propose a patch given as `FilePatch` JSON
    Propose {
        /// Patch file (stdin when omitted or `-`)
        patch: Option<PathBuf>,
    },
    /// Stage new full content for a file
    Stage {
        /// Live file to change
        path: PathBuf,
        /// File holding the new content (stdin when omitted or `-`)
        #[arg(long)]
        content: Option<PathBuf>,
    },
    /// List shadows
    List {
        /// Include applied, rejected and conflicted shadows
        #[arg(short, long)]
        all: bool,
    },
    /// Show one shadow and its diff
    Show {
        /// Shadow id
        id: String,
    },
    /// Approve a pending shadow
    Approve {
        /// Shadow id
        id: String,
    },
    /// Reject a pending shadow
    Reject {
        /// Shadow id
        id: String,
        /// Why
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Apply an approved shadow to the live file
    Apply {
        /// Shadow id
        id: String,
        /// Override the configured conflict strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Skip the backup copy
        #[arg(long)]
        no_backup: bool,
    },
    /// Restore an applied shadow's live file from its backup
    Rollback {
        /// Shadow id
        id: String,
    },
    /// Remove finished shadows
    Cleanup {
        /// Minimum age in hours (defaults to `shadow.cleanup_max_age_hours`)
        #[arg(long)]
        older_than: Option<u64>,
    },
}

/// Conflict strategy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum StrategyArg {
    /// Refuse when the live file diverged
    Abort,
    /// Three-way merge onto the live file
    Merge,
    /// Overwrite the live file
    Force,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Abort => Self::Abort,
            StrategyArg::Merge => Self::Merge,
            StrategyArg::Force => Self::Force,
        }
    }
}

/// Dispatch a shadow subcommand.
pub(crate) async fn handle_shadow(host: &Host, command: ShadowCommands, json: bool) -> anyhow::Result<()> {
    let audit = host.audit_log()?;
    let store = host.shadow_store(audit).await?;

    match command {
        ShadowCommands::Propose { patch } => {
            let raw = super::read_input(patch.as_deref())?;
            let patch: FilePatch = serde_json::from_str(&raw).context("parsing FilePatch JSON")?;
            let shadow = store.propose(patch).await?;
            report_shadow(&shadow, "Proposed", json)
        },
        ShadowCommands::Stage { path, content } => {
            let new_content = super::read_input(content.as_deref())?;
            let path = absolute(host.workspace_root(), &path);
            let shadow = store.stage_content(path, &new_content).await?;
            report_shadow(&shadow, "Staged", json)
        },
        ShadowCommands::List { all } => {
            let mut shadows = store.list().await;
            if !all {
                shadows.retain(|s| !s.status.is_terminal());
            }
            list_shadows(&shadows, json)
        },
        ShadowCommands::Show { id } => show_shadow(&store, &id, json).await,
        ShadowCommands::Approve { id } => {
            let shadow = store.approve(&id).await?;
            report_shadow(&shadow, "Approved", json)
        },
        ShadowCommands::Reject { id, reason } => {
            let shadow = store.reject(&id, reason.as_deref()).await?;
            report_shadow(&shadow, "Rejected", json)
        },
        ShadowCommands::Apply {
            id,
            strategy,
            no_backup,
        } => {
            let mut request = bridge::apply_request(host.config(), &id)?;
            if let Some(strategy) = strategy {
                request = request.with_strategy(strategy.into());
            }
            if no_backup {
                request = request.with_backup(false);
            }
            let result = host.apply_engine(Arc::clone(&store)).apply(&request).await;
            report_apply(&result, json)
        },
        ShadowCommands::Rollback { id } => {
            let shadow = host.apply_engine(Arc::clone(&store)).rollback(&id).await?;
            report_shadow(&shadow, "Rolled back", json)
        },
        ShadowCommands::Cleanup { older_than } => {
            let hours = older_than.unwrap_or(host.config().shadow.cleanup_max_age_hours);
            let removed = store.cleanup(hours).await?;
            if json {
                return super::print_json(&serde_json::json!({ "removed": removed }));
            }
            println!(
                "{}",
                Theme::success(&format!("Removed {removed} shadow(s) older than {hours}h"))
            );
            Ok(())
        },
    }
}

fn absolute(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}

fn report_shadow(shadow: &ShadowFile, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return super::print_json(shadow);
    }
    println!(
        "{}",
        Theme::success(&format!("{verb} {}", shadow.original_path.display()))
    );
    println!("{}", Theme::kv("Id", &shadow.id));
    println!("{}", Theme::kv("Status", &Theme::status(shadow.status)));
    println!("{}", Theme::kv("Shadow", &shadow.shadow_path.display().to_string()));
    if let Some(reason) = &shadow.status_reason {
        println!("{}", Theme::kv("Reason", reason));
    }
    Ok(())
}

fn list_shadows(shadows: &[ShadowFile], json: bool) -> anyhow::Result<()> {
    if json {
        return super::print_json(&shadows);
    }
    if shadows.is_empty() {
        println!("{}", Theme::info("No shadows"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Shadows"));
    println!(
        "{:<36} {:<10} {:>6} {:>6}  {}",
        "ID".dimmed(),
        "STATUS".dimmed(),
        "+".dimmed(),
        "-".dimmed(),
        "PATH".dimmed()
    );
    println!("{}", Theme::separator());
    for shadow in shadows {
        let (additions, deletions) = shadow
            .pending_patch
            .as_ref()
            .map_or((0, 0), |p| (p.additions, p.deletions));
        println!(
            "{:<36} {:<10} {:>6} {:>6}  {}",
            shadow.id,
            Theme::status(shadow.status),
            additions.to_string().green(),
            deletions.to_string().red(),
            shadow.original_path.display()
        );
    }
    println!();
    Ok(())
}

async fn show_shadow(store: &ShadowStore, id: &str, json: bool) -> anyhow::Result<()> {
    let shadow = store
        .get(id)
        .await
        .with_context(|| format!("no shadow with id {id}"))?;
    if json {
        return super::print_json(&shadow);
    }

    println!("\n{}", Theme::header(&shadow.original_path.display().to_string()));
    println!("{}", Theme::kv("Id", &shadow.id));
    println!("{}", Theme::kv("Status", &Theme::status(shadow.status)));
    println!("{}", Theme::kv("Created", &shadow.created_at.to_string()));
    if let Some(hash) = &shadow.original_hash {
        println!("{}", Theme::kv("Base hash", &hash.to_hex()));
    }
    if let Some(reason) = &shadow.status_reason {
        println!("{}", Theme::kv("Reason", reason));
    }
    if let Some(patch) = &shadow.pending_patch {
        if let Some(description) = &patch.description {
            println!("{}", Theme::kv("Description", description));
        }
        println!("{}", Theme::separator());
        for line in patch.render_unified().lines() {
            println!("{}", Theme::diff_line(line));
        }
    }
    println!();
    Ok(())
}

fn report_apply(result: &PatchApplyResult, json: bool) -> anyhow::Result<()> {
    if json {
        super::print_json(result)?;
    } else if result.success {
        println!(
            "{}",
            Theme::success(&format!("Applied {}", result.file_path.display()))
        );
        if let Some(backup) = &result.backup_path {
            println!("{}", Theme::kv("Backup", &backup.display().to_string()));
        }
    } else {
        let code = result
            .error_code
            .map_or_else(|| "error".to_string(), |c| c.to_string());
        println!("{}", Theme::error(&format!("Apply failed: {code}")));
        if let Some(error) = &result.error {
            println!("{}", Theme::kv("Error", error));
        }
        if let Some(details) = &result.conflict_details {
            let hash = |h: Option<&bulwark_core::ContentHash>| {
                h.map_or_else(|| "(absent)".to_string(), bulwark_core::ContentHash::to_hex)
            };
            println!("{}", Theme::kv("Expected", &hash(details.expected_hash.as_ref())));
            println!("{}", Theme::kv("Actual", &hash(details.actual_hash.as_ref())));
            if !details.conflicting_hunks.is_empty() {
                let hunks: Vec<String> = details
                    .conflicting_hunks
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("{}", Theme::kv("Hunks", &hunks.join(", ")));
            }
            println!(
                "{}",
                Theme::warning("Re-run with --strategy merge or --strategy force to proceed")
            );
        }
    }

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("patch {} was not applied", result.patch_id)
    }
}
