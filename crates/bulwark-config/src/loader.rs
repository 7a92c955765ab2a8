//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge `~/.bulwark/config.toml`, or `$BULWARK_HOME/config.toml` when
//!    the former is absent
//! 3. Merge `{workspace}/.bulwark/config.toml` and enforce restrictions
//! 4. Apply env var fallbacks for fields no file set
//! 5. Deserialize and validate

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{
    ConfigLayer, FieldSources, deep_merge_tracking, enforce_restrictions, record_leaves,
};
use crate::show::ResolvedConfig;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
pub(crate) const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Largest config file accepted (1 MiB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Directory name used for both user and workspace config.
pub const CONFIG_DIR: &str = ".bulwark";

/// Load the layered configuration.
///
/// `workspace_root` enables the workspace layer. `home_override` replaces
/// the user config directory (the directory holding `config.toml`), which
/// skips home discovery and `BULWARK_HOME`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable, malformed or too large,
/// or if the merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", ConfigLayer::Defaults, &mut field_sources);

    // User layer.
    let user_dir = match home_override {
        Some(dir) => Some(dir.to_path_buf()),
        None => user_config_dir(env_vars.get("BULWARK_HOME").map(String::as_str))?,
    };
    if let Some(dir) = user_dir {
        let path = dir.join("config.toml");
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(
                &mut merged,
                &overlay,
                "",
                ConfigLayer::User,
                &mut field_sources,
            );
            info!(path = %path.display(), "loaded user config");
            loaded_files.push(path.display().to_string());
        }
    }

    // Workspace layer, restricted against everything below it.
    if let Some(ws_root) = workspace_root {
        let path = ws_root.join(CONFIG_DIR).join("config.toml");
        if let Some(overlay) = try_load_file(&path)? {
            let baseline = merged.clone();
            deep_merge_tracking(
                &mut merged,
                &overlay,
                "",
                ConfigLayer::Workspace,
                &mut field_sources,
            );
            enforce_restrictions(&mut merged, &baseline, &overlay);
            info!(path = %path.display(), "loaded workspace config");
            loaded_files.push(path.display().to_string());
        }
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, &env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source: e,
        })?;
    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a single file with no layering.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is missing, unreadable, malformed,
/// too large, or invalid.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file; `None` when it does not exist.
///
/// The size is checked after a single read, so there is no window between
/// a stat and the read.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

/// `~/.bulwark`, or a validated `BULWARK_HOME` when the former has no config.
fn user_config_dir(bulwark_home: Option<&str>) -> ConfigResult<Option<PathBuf>> {
    let home = home_directory()?;
    let default_dir = home.join(CONFIG_DIR);
    if default_dir.join("config.toml").exists() {
        return Ok(Some(default_dir));
    }
    let Some(raw) = bulwark_home else {
        return Ok(Some(default_dir));
    };
    match validate_bulwark_home(raw, &home) {
        Some(dir) => Ok(Some(dir)),
        None => {
            warn!(
                path = raw,
                "BULWARK_HOME is not a directory owned by the current user; ignoring"
            );
            Ok(None)
        },
    }
}

/// Canonicalize `raw` and check it is a directory owned by the owner of
/// `home_dir`.
fn validate_bulwark_home(raw: &str, home_dir: &Path) -> Option<PathBuf> {
    let canonical = PathBuf::from(raw).canonicalize().ok()?;
    if !canonical.is_dir() {
        return None;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if canonical.metadata().ok()?.uid() != home_dir.metadata().ok()?.uid() {
            return None;
        }
    }
    #[cfg(not(unix))]
    let _ = home_dir;

    Some(canonical)
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
