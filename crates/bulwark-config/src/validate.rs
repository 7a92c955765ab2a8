//! Post-merge validation.

use std::str::FromStr;

use bulwark_core::{ConfirmationPolicy, EffectType};
use bulwark_policy::taxonomy;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, LoggingSection, PolicySection, ShadowSection};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];
const LOG_TARGETS: &[&str] = &["stdout", "stderr", "file"];
const CONFLICT_STRATEGIES: &[&str] = &["abort", "merge", "force"];

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("\"{value}\" is not one of {}", allowed.join(", ")),
        ))
    }
}

fn parse_effect(field: &str, name: &str) -> ConfigResult<EffectType> {
    EffectType::from_str(name).map_err(|e| invalid(field, e.to_string()))
}

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] for the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_policy(&config.policy)?;
    validate_shadow(&config.shadow)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_policy(policy: &PolicySection) -> ConfigResult<()> {
    for name in &policy.denied_effects {
        parse_effect("policy.denied_effects", name)?;
    }

    for (name, policy_name) in &policy.overrides {
        let field = format!("policy.overrides.{name}");
        let effect_type = parse_effect(&field, name)?;
        let chosen =
            ConfirmationPolicy::from_str(policy_name).map_err(|e| invalid(&field, e.to_string()))?;
        if !taxonomy::is_permitted(effect_type, chosen) {
            let permitted: Vec<&str> = taxonomy::permitted_policies(effect_type)
                .iter()
                .map(|p| p.as_str())
                .collect();
            return Err(invalid(
                field,
                format!(
                    "{chosen} is not permitted for {effect_type} (permitted: {})",
                    permitted.join(", ")
                ),
            ));
        }
    }

    if policy.confirmation_timeout_secs == 0 {
        return Err(invalid(
            "policy.confirmation_timeout_secs",
            "must be greater than 0",
        ));
    }
    if policy.response_cache_capacity == 0 {
        return Err(invalid(
            "policy.response_cache_capacity",
            "must be greater than 0",
        ));
    }
    if policy.rate_limit.max_requests > 0 && policy.rate_limit.window_secs == 0 {
        return Err(invalid(
            "policy.rate_limit.window_secs",
            "must be greater than 0 when max_requests is set",
        ));
    }
    if policy.workspace_roots.iter().any(|r| r.trim().is_empty()) {
        return Err(invalid("policy.workspace_roots", "roots must not be empty"));
    }
    Ok(())
}

fn validate_shadow(shadow: &ShadowSection) -> ConfigResult<()> {
    if shadow.backup_suffix.is_empty() {
        return Err(invalid("shadow.backup_suffix", "must not be empty"));
    }
    if shadow.backup_suffix.contains('/') {
        return Err(invalid("shadow.backup_suffix", "must not contain '/'"));
    }
    if shadow.apply_timeout_secs == 0 {
        return Err(invalid("shadow.apply_timeout_secs", "must be greater than 0"));
    }
    one_of(
        "shadow.conflict_strategy",
        &shadow.conflict_strategy,
        CONFLICT_STRATEGIES,
    )
}

fn validate_logging(logging: &LoggingSection) -> ConfigResult<()> {
    one_of("logging.level", &logging.level.to_lowercase(), LOG_LEVELS)?;
    one_of("logging.format", &logging.format.to_lowercase(), LOG_FORMATS)?;
    one_of("logging.target", &logging.target.to_lowercase(), LOG_TARGETS)?;
    if logging.target.eq_ignore_ascii_case("file") && logging.directory.is_none() {
        return Err(invalid(
            "logging.directory",
            "required when logging.target is \"file\"",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_unknown_effect_type() {
        let mut config = Config::default();
        config.policy.denied_effects.push("filesystem:delete".to_owned());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "policy.denied_effects"
        );
    }

    #[test]
    fn test_secrets_read_only_always() {
        let mut config = Config::default();
        config
            .policy
            .overrides
            .insert("secrets:read".to_owned(), "session".to_owned());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("not permitted for secrets:read"));

        config
            .policy
            .overrides
            .insert("secrets:read".to_owned(), "always".to_owned());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_policy_name() {
        let mut config = Config::default();
        config
            .policy
            .overrides
            .insert("shell:read".to_owned(), "sometimes".to_owned());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "policy.overrides.shell:read"
        );
    }

    #[test]
    fn test_timeouts_must_be_positive() {
        let mut config = Config::default();
        config.policy.confirmation_timeout_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.shadow.apply_timeout_secs = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "shadow.apply_timeout_secs"
        );
    }

    #[test]
    fn test_backup_suffix() {
        let mut config = Config::default();
        config.shadow.backup_suffix = String::new();
        assert!(validate(&config).is_err());
        config.shadow.backup_suffix = "/x".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rate_limit_needs_window() {
        let mut config = Config::default();
        config.policy.rate_limit.max_requests = 5;
        config.policy.rate_limit.window_secs = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "policy.rate_limit.window_secs"
        );
    }

    #[test]
    fn test_logging_values() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "logging.format");

        let mut config = Config::default();
        config.logging.level = "DEBUG".to_owned();
        assert!(validate(&config).is_ok());

        config.logging.target = "file".to_owned();
        assert_eq!(field_of(validate(&config).unwrap_err()), "logging.directory");
    }
}
