//! Configuration parsing and validation for turnstile
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - An explicit, mandatory default policy for unmatched commands
//! - Executor limits (timeout, output cap)
//! - Bootstrap admin and seed rules
//! - Validation that reports every problem at once

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<GatewayConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    let config = GatewayConfig::from_raw(raw);
    tracing::debug!(
        default_policy = %config.gateway.default_policy,
        command_cost = config.gateway.command_cost,
        extra_rules = config.rules.len(),
        "Configuration parsed"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use turnstile_api::{DefaultPolicy, RuleAction};

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [gateway]
            default_policy = "allow"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.gateway.default_policy, DefaultPolicy::Allow);
        assert_eq!(config.gateway.command_cost, DEFAULT_COMMAND_COST);
        assert_eq!(config.executor.mode, ExecutorMode::Shell);
        assert_eq!(config.executor.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn reject_missing_default_policy() {
        let result = parse_config("config_version = 1");
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [gateway]
            default_policy = "deny"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_seed_pattern() {
        let config = r#"
            config_version = 1

            [gateway]
            default_policy = "deny"

            [[rules]]
            pattern = "("
            action = "AUTO_REJECT"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(errors[0], ValidationError::RuleError { index: 0, .. }));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn example_config_is_valid() {
        let config = parse_config(include_str!("../../../config.example.toml")).unwrap();
        assert_eq!(config.gateway.default_policy, DefaultPolicy::Deny);
        assert_eq!(config.seed_rules().len(), default_seed_rules().len() + 2);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [gateway]
            default_policy = "deny"
            command_cost = 3

            [executor]
            mode = "dry_run"

            [[rules]]
            pattern = "^uptime$"
            action = "AUTO_ACCEPT"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.gateway.default_policy, DefaultPolicy::Deny);
        assert_eq!(config.gateway.command_cost, 3);
        assert_eq!(config.executor.mode, ExecutorMode::DryRun);
        assert_eq!(config.rules, vec![SeedRule::new("^uptime$", RuleAction::AutoAccept)]);
    }
}
