//! Source-annotated display of a resolved configuration.

use std::fmt::{self, Write as _};

use crate::merge::FieldSources;
use crate::types::Config;

/// A resolved configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path to the layer that set it.
    pub field_sources: FieldSources,
    /// Config files that were loaded, in precedence order.
    pub loaded_files: Vec<String>,
}

/// Output format for [`ResolvedConfig::show`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with a trailing comment naming each value's layer.
    Toml,
    /// Plain JSON.
    Json,
}

impl ResolvedConfig {
    /// Render the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn show(&self, format: ShowFormat) -> Result<String, fmt::Error> {
        match format {
            ShowFormat::Toml => self.show_toml(),
            ShowFormat::Json => serde_json::to_string_pretty(&self.config).map_err(|_| fmt::Error),
        }
    }

    fn show_toml(&self) -> Result<String, fmt::Error> {
        let body = toml::to_string_pretty(&self.config).map_err(|_| fmt::Error)?;
        let mut output = String::from("# Resolved Bulwark configuration\n");
        for path in &self.loaded_files {
            writeln!(output, "# loaded: {path}")?;
        }
        output.push('\n');

        let mut section = String::new();
        for line in body.lines() {
            let trimmed = line.trim();
            if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
                header.clone_into(&mut section);
                writeln!(output, "{line}")?;
                continue;
            }
            let annotation = trimmed
                .split_once('=')
                .map(|(key, _)| {
                    let key = key.trim().trim_matches('"');
                    if section.is_empty() {
                        key.to_owned()
                    } else {
                        format!("{section}.{key}")
                    }
                })
                .and_then(|path| self.field_sources.get(&path));
            match annotation {
                Some(layer) => writeln!(output, "{line}  # {layer}")?,
                None => writeln!(output, "{line}")?,
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    #[test]
    fn test_toml_annotations() {
        let mut field_sources = FieldSources::new();
        field_sources.insert("logging.level".to_owned(), ConfigLayer::Environment);
        field_sources.insert("shadow.backup_suffix".to_owned(), ConfigLayer::Defaults);
        let resolved = ResolvedConfig {
            config: Config::default(),
            field_sources,
            loaded_files: vec!["/home/u/.bulwark/config.toml".to_owned()],
        };

        let out = resolved.show(ShowFormat::Toml).unwrap();
        assert!(out.contains("# loaded: /home/u/.bulwark/config.toml"));
        assert!(out.contains("level = \"info\"  # env"));
        assert!(out.contains("backup_suffix = \".bak\"  # defaults"));
    }

    #[test]
    fn test_json() {
        let resolved = ResolvedConfig {
            config: Config::default(),
            field_sources: FieldSources::new(),
            loaded_files: Vec::new(),
        };
        let out = resolved.show(ShowFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["shadow"]["conflict_strategy"], "abort");
    }
}
