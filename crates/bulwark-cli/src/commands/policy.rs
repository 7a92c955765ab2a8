//! Policy command - inspect the policy table and remembered grants.

use std::str::FromStr;
use std::sync::Arc;

use bulwark_core::EffectType;
use bulwark_policy::{ChannelPresenter, GrantKey, PolicyConfig, policy_table};
use clap::Subcommand;
use colored::Colorize;

use crate::bridge;
use crate::host::Host;
use crate::theme::Theme;

/// Policy subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum PolicyCommands {
    /// Print the default and effective policy for every effect type
    Table,
    /// List remembered permanent grants
    Grants,
    /// Revoke a permanent grant
    Revoke {
        /// Effect type (e.g. `shell:read`)
        effect: String,
        /// Normalized target the grant covers
        target: String,
    },
}

/// Dispatch a policy subcommand.
pub(crate) fn handle_policy(host: &Host, command: PolicyCommands, json: bool) -> anyhow::Result<()> {
    match command {
        PolicyCommands::Table => {
            let policy = bridge::to_policy_config(host.config(), host.workspace_root())?;
            print_table(&policy, json)
        },
        PolicyCommands::Grants => {
            let gate = host.gate(host.audit_log()?, Arc::new(ChannelPresenter::new().0))?;
            let mut grants = gate.grants().list();
            grants.sort_by(|a, b| a.key.cmp(&b.key));
            if json {
                return super::print_json(&grants);
            }
            if grants.is_empty() {
                println!("{}", Theme::info("No grants"));
                return Ok(());
            }
            println!("\n{}", Theme::header("Grants"));
            println!("{}", Theme::separator());
            for grant in grants {
                println!(
                    "{:<22} {:<10} {}  {}",
                    grant.key.effect_type.as_str(),
                    grant.policy.as_str(),
                    grant.key.target,
                    Theme::dimmed(&grant.granted_at.to_string())
                );
            }
            println!();
            Ok(())
        },
        PolicyCommands::Revoke { effect, target } => {
            let effect_type = EffectType::from_str(&effect)?;
            let gate = host.gate(host.audit_log()?, Arc::new(ChannelPresenter::new().0))?;
            let removed = gate.revoke_grant(&GrantKey::new(effect_type, target.as_str()))?;
            if json {
                return super::print_json(&serde_json::json!({ "revoked": removed }));
            }
            if removed {
                println!("{}", Theme::success(&format!("Revoked {effect_type} on {target}")));
            } else {
                println!("{}", Theme::warning(&format!("No grant for {effect_type} on {target}")));
            }
            Ok(())
        },
    }
}

fn print_table(policy: &PolicyConfig, json: bool) -> anyhow::Result<()> {
    let rows = policy_table();
    if json {
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "effectType": row.effect_type,
                    "defaultPolicy": row.default_policy,
                    "effectivePolicy": policy.effective_policy(row.effect_type),
                    "riskScore": row.risk_score,
                    "denied": policy.denied_effects.contains(&row.effect_type),
                })
            })
            .collect();
        return super::print_json(&rows);
    }

    println!("\n{}", Theme::header("Effect Policy"));
    println!(
        "{:<22} {:<10} {:<10} {:<6}",
        "EFFECT".dimmed(),
        "DEFAULT".dimmed(),
        "EFFECTIVE".dimmed(),
        "RISK".dimmed()
    );
    println!("{}", Theme::separator());
    for row in rows {
        let effective = if policy.denied_effects.contains(&row.effect_type) {
            "denied".red().to_string()
        } else {
            let effective = policy.effective_policy(row.effect_type);
            if effective == row.default_policy {
                effective.to_string()
            } else {
                effective.to_string().yellow().to_string()
            }
        };
        println!(
            "{:<22} {:<10} {:<10} {}",
            row.effect_type.as_str(),
            row.default_policy.as_str(),
            effective,
            Theme::risk(row.risk_score)
        );
    }
    println!();
    Ok(())
}
