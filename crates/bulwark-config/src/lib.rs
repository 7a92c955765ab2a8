#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Layered configuration for Bulwark.
//!
//! # Usage
//!
//! ```rust,no_run
//! use bulwark_config::Config;
//!
//! let resolved = Config::load(Some(std::path::Path::new("."))).unwrap();
//! println!("conflict strategy: {}", resolved.config.shadow.conflict_strategy);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Workspace** (`{workspace}/.bulwark/config.toml`), which may only
//!    tighten: deny lists grow, allow lists shrink, confirmation overrides
//!    get stricter and storage locations cannot be redirected
//! 2. **User** (`~/.bulwark/config.toml` or `$BULWARK_HOME/config.toml`)
//! 3. **Environment variables** (`BULWARK_LOG_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml`, including the hardened blocklist)
//!
//! Values are kept as wire strings; conversion into gate and shadow types
//! happens in the frontend.

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Layer merging and workspace restrictions.
pub mod merge;
/// Source-annotated display.
pub mod show;
/// Configuration structs.
pub mod types;
/// Post-merge validation.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load with the full precedence chain. See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the merged
    /// configuration fails validation.
    pub fn load(workspace_root: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root, None)
    }

    /// Load with `home_dir` as the user config directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a file is malformed or the merged
    /// configuration fails validation.
    pub fn load_with_home(
        workspace_root: Option<&std::path::Path>,
        home_dir: &std::path::Path,
    ) -> ConfigResult<ResolvedConfig> {
        loader::load(workspace_root, Some(home_dir))
    }
}
