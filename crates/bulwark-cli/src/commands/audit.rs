//! Audit command - view and verify the audit chain.

use bulwark_audit::{AuditAction, AuditLog, Decision};
use clap::Subcommand;
use colored::Colorize;

use crate::theme::Theme;

/// Audit subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum AuditCommands {
    /// Show the most recent entries
    Tail {
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Verify the hash chain
    Verify,
}

/// Dispatch an audit subcommand.
pub(crate) fn handle_audit(log: &AuditLog, command: &AuditCommands, json: bool) -> anyhow::Result<()> {
    match command {
        AuditCommands::Tail { count } => tail(log, *count, json),
        AuditCommands::Verify => verify(log, json),
    }
}

fn tail(log: &AuditLog, count: usize, json: bool) -> anyhow::Result<()> {
    let entries = log.entries()?;
    let start = entries.len().saturating_sub(count);
    let recent = entries.get(start..).unwrap_or_default();

    if json {
        return super::print_json(&recent);
    }
    if recent.is_empty() {
        println!("{}", Theme::info("No audit entries"));
        return Ok(());
    }

    println!("\n{}", Theme::header("Audit Entries"));
    println!(
        "{:<10} {:<26} {:<12} {}",
        "ENTRY".dimmed(),
        "TIMESTAMP".dimmed(),
        "ACTOR".dimmed(),
        "ACTION".dimmed()
    );
    println!("{}", Theme::separator());
    for entry in recent {
        let description = entry.action.description();
        let action = match &entry.action {
            AuditAction::EffectDecision {
                decision: Decision::Approved,
                ..
            } => description.green().to_string(),
            AuditAction::EffectDecision { .. } => description.red().to_string(),
            _ => description,
        };
        println!(
            "{:<10} {:<26} {:<12} {}",
            Theme::short_id(&entry.id.to_string()),
            entry.timestamp.0.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.actor,
            action
        );
    }
    println!();
    Ok(())
}

fn verify(log: &AuditLog, json: bool) -> anyhow::Result<()> {
    let result = log.verify_chain()?;
    if json {
        super::print_json(&serde_json::json!({
            "valid": result.valid,
            "entriesChecked": result.entries_checked,
            "brokenLinks": result.broken_links,
        }))?;
    } else if result.valid {
        println!(
            "{}",
            Theme::success(&format!(
                "Audit chain intact ({} entries)",
                result.entries_checked
            ))
        );
    } else {
        println!(
            "{}",
            Theme::error(&format!(
                "Audit chain broken at {} of {} entries",
                result.broken_links.len(),
                result.entries_checked
            ))
        );
        for id in &result.broken_links {
            println!("{}", Theme::kv("Entry", id));
        }
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("audit chain verification failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::{EffectSource, EffectType, RiskScore};

    fn decision(log: &AuditLog, id: &str) {
        log.record(
            "agent",
            AuditAction::EffectDecision {
                request_id: id.to_string(),
                effect_type: EffectType::FilesystemRead,
                source: EffectSource::Agent,
                decision: Decision::Approved,
                reason: None,
                denial_code: None,
                approval_type: None,
                risk_score: RiskScore::MIN,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_verify_and_tail_on_intact_chain() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open_jsonl(dir.path().join("audit.jsonl")).unwrap();
        decision(&log, "r1");
        decision(&log, "r2");

        assert!(handle_audit(&log, &AuditCommands::Verify, true).is_ok());
        assert!(handle_audit(&log, &AuditCommands::Tail { count: 1 }, false).is_ok());
    }

    #[test]
    fn test_verify_fails_on_tampered_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open_jsonl(&path).unwrap();
        decision(&log, "r1");
        decision(&log, "r2");
        decision(&log, "r3");

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = raw.lines().collect();
        lines.remove(1);
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let reopened = AuditLog::open_jsonl(&path).unwrap();
        assert!(handle_audit(&reopened, &AuditCommands::Verify, true).is_err());
    }
}
