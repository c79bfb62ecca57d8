//! Configuration validation

use crate::schema::{RawConfig, RawRule};
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use turnstile_api::{DefaultPolicy, RuleAction};

/// Compiled-program size cap for rule patterns
pub const RULE_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("gateway.default_policy must be set to \"allow\" or \"deny\"")]
    MissingDefaultPolicy,

    #[error("Unknown default policy '{0}' (expected \"allow\" or \"deny\")")]
    InvalidDefaultPolicy(String),

    #[error("gateway.command_cost must be at least 1")]
    ZeroCommandCost,

    #[error("gateway.audit_page_size must be at least 1")]
    ZeroAuditPageSize,

    #[error("Unknown executor mode '{0}' (expected \"shell\" or \"dry_run\")")]
    InvalidExecutorMode(String),

    #[error("executor.timeout_seconds must be at least 1")]
    ZeroTimeout,

    #[error("executor.max_output_bytes must be at least 1")]
    ZeroOutputCap,

    #[error("bootstrap.admin_name cannot be empty")]
    EmptyAdminName,

    #[error("Rule #{index}: {message}")]
    RuleError { index: usize, message: String },
}

/// Compile a rule pattern with the dialect used at evaluation time.
///
/// Empty patterns are refused; a pattern that matches the empty string is not.
pub fn compile_pattern(pattern: &str) -> Result<Regex, String> {
    if pattern.is_empty() {
        return Err("pattern cannot be empty".into());
    }

    RegexBuilder::new(pattern)
        .size_limit(RULE_REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| e.to_string())
}

/// Parse a default policy name
pub fn parse_default_policy(s: &str) -> Result<DefaultPolicy, ValidationError> {
    match s.to_lowercase().as_str() {
        "allow" => Ok(DefaultPolicy::Allow),
        "deny" => Ok(DefaultPolicy::Deny),
        other => Err(ValidationError::InvalidDefaultPolicy(other.to_string())),
    }
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match config.gateway.default_policy.as_deref() {
        None => errors.push(ValidationError::MissingDefaultPolicy),
        Some(policy) => {
            if let Err(e) = parse_default_policy(policy) {
                errors.push(e);
            }
        }
    }

    if config.gateway.command_cost == Some(0) {
        errors.push(ValidationError::ZeroCommandCost);
    }

    if config.gateway.audit_page_size == Some(0) {
        errors.push(ValidationError::ZeroAuditPageSize);
    }

    if let Some(mode) = &config.executor.mode
        && !matches!(mode.as_str(), "shell" | "dry_run")
    {
        errors.push(ValidationError::InvalidExecutorMode(mode.clone()));
    }

    if config.executor.timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroTimeout);
    }

    if config.executor.max_output_bytes == Some(0) {
        errors.push(ValidationError::ZeroOutputCap);
    }

    if let Some(name) = &config.bootstrap.admin_name
        && name.trim().is_empty()
    {
        errors.push(ValidationError::EmptyAdminName);
    }

    for (index, rule) in config.rules.iter().enumerate() {
        errors.extend(validate_rule(index, rule));
    }

    errors
}

fn validate_rule(index: usize, rule: &RawRule) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(message) = compile_pattern(&rule.pattern) {
        errors.push(ValidationError::RuleError { index, message });
    }

    if let Err(e) = rule.action.parse::<RuleAction>() {
        errors.push(ValidationError::RuleError {
            index,
            message: e.to_string(),
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawGatewayConfig;

    fn base_config() -> RawConfig {
        RawConfig {
            config_version: 1,
            gateway: RawGatewayConfig {
                default_policy: Some("allow".into()),
                ..Default::default()
            },
            executor: Default::default(),
            bootstrap: Default::default(),
            rules: vec![],
        }
    }

    #[test]
    fn test_compile_pattern() {
        assert!(compile_pattern("^rm -rf").is_ok());
        assert!(compile_pattern("(").is_err());
        assert!(compile_pattern("").is_err());
        // Matches everything, but is a legal choice
        assert!(compile_pattern(".*").is_ok());
    }

    #[test]
    fn test_default_policy_required() {
        let mut config = base_config();
        config.gateway.default_policy = None;

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingDefaultPolicy)));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = base_config();
        config.gateway.default_policy = Some("maybe".into());
        config.gateway.command_cost = Some(0);
        config.executor.timeout_seconds = Some(0);
        config.rules = vec![
            RawRule {
                pattern: "(".into(),
                action: "AUTO_REJECT".into(),
            },
            RawRule {
                pattern: "^ls".into(),
                action: "SOMETIMES".into(),
            },
        ];

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::RuleError { index: 0, .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::RuleError { index: 1, .. })));
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        assert!(validate_config(&base_config()).is_empty());
    }
}
