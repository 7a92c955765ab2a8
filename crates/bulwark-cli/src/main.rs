//! Bulwark CLI - host enforcement point for agent side effects.
//!
//! Decides effect requests against the configured policy, stages proposed
//! file changes as shadows for review, applies approved shadows atomically,
//! and inspects the audit chain.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod bridge;
mod commands;
mod host;
mod theme;

use commands::audit::{self, AuditCommands};
use commands::check::{self, VerdictArg};
use commands::config::{self, ConfigCommands};
use commands::policy::{self, PolicyCommands};
use commands::serve;
use commands::shadow::{self, ShadowCommands};
use host::Host;

/// Bulwark - effect policy gate and shadow patch pipeline
#[derive(Parser)]
#[command(name = "bulwark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true, env = "BULWARK_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one effect request (JSON) and print the response
    Check {
        /// Request file (stdin when omitted or `-`)
        request: Option<PathBuf>,

        /// Answer a confirmation without prompting
        #[arg(long, value_enum)]
        verdict: Option<VerdictArg>,
    },

    /// Serve the JSON-lines effect channel on stdin/stdout
    Serve,

    /// Stage, review and apply file changes
    Shadow {
        #[command(subcommand)]
        command: ShadowCommands,
    },

    /// View and verify the audit chain
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Inspect the policy table and grants
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().context("resolving the current directory")?,
    };
    let loaded = bulwark_config::Config::load(Some(&workspace_root));

    // Set up logging from config, with --verbose override.
    let log_config = match loaded.as_ref().map(|r| bridge::to_log_config(&r.config)) {
        Ok(Ok(mut lc)) => {
            if cli.verbose {
                "debug".clone_into(&mut lc.level);
            }
            lc
        },
        _ => {
            // Fallback so the config error itself gets reported.
            let level = if cli.verbose { "debug" } else { "info" };
            bulwark_telemetry::LogConfig::new(level)
        },
    };
    if let Err(e) = bulwark_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let resolved = loaded.context("loading configuration")?;
    let host = Host::new(resolved, workspace_root);
    let json = cli.format == "json";

    match cli.command {
        Commands::Check { request, verdict } => {
            let raw = commands::read_input(request.as_deref())?;
            check::run_check(&host, &raw, verdict, json).await?;
        },
        Commands::Serve => serve::run_serve(&host).await?,
        Commands::Shadow { command } => shadow::handle_shadow(&host, command, json).await?,
        Commands::Audit { command } => {
            let log = host.audit_log()?;
            audit::handle_audit(&log, &command, json)?;
        },
        Commands::Policy { command } => policy::handle_policy(&host, command, json)?,
        Commands::Config { command } => config::handle_config(&host, &command, json)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from([
            "bulwark",
            "--format",
            "json",
            "shadow",
            "apply",
            "abc",
            "--strategy",
            "merge",
            "--no-backup",
        ])
        .unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::Shadow {
                command:
                    ShadowCommands::Apply {
                        id,
                        strategy,
                        no_backup,
                    },
            } => {
                assert_eq!(id, "abc");
                assert_eq!(strategy, Some(shadow::StrategyArg::Merge));
                assert!(no_backup);
            },
            _ => panic!("expected shadow apply"),
        }
    }

    #[test]
    fn test_parse_check_verdict() {
        let cli =
            Cli::try_parse_from(["bulwark", "check", "req.json", "--verdict", "session"]).unwrap();
        match cli.command {
            Commands::Check { request, verdict } => {
                assert_eq!(request, Some(PathBuf::from("req.json")));
                assert_eq!(verdict, Some(VerdictArg::Session));
            },
            _ => panic!("expected check"),
        }
    }
}
