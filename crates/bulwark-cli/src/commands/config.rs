//! Config command - show the resolved configuration.

use bulwark_config::ShowFormat;
use clap::Subcommand;

use crate::host::Host;
use crate::theme::Theme;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum ConfigCommands {
    /// Print the merged configuration with the layer each value came from
    Show,
    /// Print config file locations and derived storage paths
    Paths,
}

/// Dispatch a config subcommand.
pub(crate) fn handle_config(host: &Host, command: &ConfigCommands, json: bool) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => {
            let format = if json { ShowFormat::Json } else { ShowFormat::Toml };
            let rendered = host
                .resolved()
                .show(format)
                .map_err(|_| anyhow::anyhow!("failed to render configuration"))?;
            println!("{rendered}");
            Ok(())
        },
        ConfigCommands::Paths => {
            let paths = host.paths();
            if json {
                return super::print_json(&serde_json::json!({
                    "workspace": host.workspace_root(),
                    "loadedFiles": host.resolved().loaded_files,
                    "shadowRoot": paths.shadow_root,
                    "auditLog": paths.audit_log,
                    "grants": paths.grants,
                }));
            }
            println!("\n{}", Theme::header("Configuration"));
            println!("{}", Theme::kv("Workspace", &host.workspace_root().display().to_string()));
            if host.resolved().loaded_files.is_empty() {
                println!("{}", Theme::kv("Files", "(defaults only)"));
            }
            for file in &host.resolved().loaded_files {
                println!("{}", Theme::kv("File", file));
            }
            println!("{}", Theme::kv("Shadow root", &paths.shadow_root.display().to_string()));
            println!("{}", Theme::kv("Audit log", &paths.audit_log.display().to_string()));
            println!("{}", Theme::kv("Grants", &paths.grants.display().to_string()));
            println!();
            Ok(())
        },
    }
}
