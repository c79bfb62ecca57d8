//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Admission settings
    #[serde(default)]
    pub gateway: RawGatewayConfig,

    /// Command executor settings
    #[serde(default)]
    pub executor: RawExecutorConfig,

    /// First-run provisioning
    #[serde(default)]
    pub bootstrap: RawBootstrapConfig,

    /// Extra rules seeded after the stock set, in order
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

/// Admission settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGatewayConfig {
    /// "allow" or "deny" for commands no rule matches. Required.
    pub default_policy: Option<String>,

    /// Credits charged per attempted execution
    pub command_cost: Option<u64>,

    /// Credits granted to new principals when the caller gives none
    pub default_initial_credits: Option<u64>,

    /// Maximum audit entries returned per listing
    pub audit_page_size: Option<usize>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

/// Executor settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawExecutorConfig {
    /// "shell" or "dry_run"
    pub mode: Option<String>,

    /// Wall-clock limit per command
    pub timeout_seconds: Option<u64>,

    /// Captured stdout/stderr are cut at this many bytes
    pub max_output_bytes: Option<usize>,

    /// Shell used to interpret command text
    pub shell: Option<PathBuf>,
}

/// Bootstrap settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBootstrapConfig {
    pub admin_name: Option<String>,
    pub admin_credits: Option<u64>,
    pub seed_default_rules: Option<bool>,
}

/// Seed rule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRule {
    pub pattern: String,
    pub action: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_schema() {
        let toml_str = r#"
            config_version = 1

            [gateway]
            default_policy = "deny"
            command_cost = 2

            [executor]
            mode = "dry_run"
            timeout_seconds = 5

            [bootstrap]
            admin_name = "root"

            [[rules]]
            pattern = "^shutdown"
            action = "AUTO_REJECT"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.default_policy.as_deref(), Some("deny"));
        assert_eq!(config.executor.timeout_seconds, Some(5));
        assert_eq!(config.rules.len(), 1);
    }

    #[test]
    fn sections_are_optional_at_parse_time() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.gateway.default_policy.is_none());
        assert!(config.rules.is_empty());
    }
}
